// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{RegisterRw, SmiError};
use bitflags::bitflags;
use num_derive::FromPrimitive;

/// Highest VLAN ID addressable in the 4K table
pub const VID_MAX: u16 = 4095;

/// Upper bound on ports handled by the driver; port masks are `u32`.
pub const MAX_PORTS: usize = 32;

/// Upper bound on member configuration slots handled by the driver.
pub const MAX_VLAN_MC: usize = 32;

/// An entry in the 4K VLAN table, which is indexed directly by VID and is
/// the authoritative copy of each VLAN's configuration.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Vlan4kEntry {
    pub vid: u16,
    /// Bitmask of member ports
    pub member: u32,
    /// Bitmask of ports that egress this VLAN untagged
    pub untag: u32,
    /// Filter ID
    pub fid: u16,
}

/// An entry in the member configuration (MC) table.  Ports refer to these
/// by index; each one caches a VLAN's 4K entry.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct VlanMcEntry {
    pub vid: u16,
    pub priority: u8,
    pub member: u32,
    pub untag: u32,
    pub fid: u16,
}

impl VlanMcEntry {
    /// The value of an unoccupied slot
    pub const FREE: Self = Self {
        vid: 0,
        priority: 0,
        member: 0,
        untag: 0,
        fid: 0,
    };

    /// A slot is free when it names no VLAN and no members; other fields
    /// are ignored.
    pub fn is_free(&self) -> bool {
        self.vid == 0 && self.member == 0
    }

    /// Builds a slot caching `vlan`.
    pub fn from_4k(vlan: &Vlan4kEntry) -> Self {
        Self {
            vid: vlan.vid,
            priority: 0,
            member: vlan.member,
            untag: vlan.untag,
            fid: vlan.fid,
        }
    }
}

/// Describes one management information base (MIB) counter that a chip
/// makes available per port.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MibCounter {
    /// Base address of the counter block
    pub base: u16,
    /// Offset of this counter within a port's block
    pub offset: u16,
    /// Width of the counter, in 16-bit words
    pub length: u8,
    pub name: &'static str,
}

/// The two VLAN modes a switch can be toggled between.  The discriminants
/// match the attribute offsets used by the switch configuration framework.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
pub enum VlanMode {
    /// VLAN processing through the member configuration table
    Vlan = 1,
    /// VLAN processing through the full 4K table
    Vlan4k = 2,
}

bitflags! {
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct PortFlags: u8 {
        /// Frames in this VLAN leave the port tagged
        const TAGGED = 1 << 0;
    }
}

/// A port's membership in a VLAN, as seen by the switch configuration
/// framework.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VlanPort {
    pub port: u8,
    pub flags: PortFlags,
}

impl VlanPort {
    pub fn untagged(port: u8) -> Self {
        Self {
            port,
            flags: PortFlags::empty(),
        }
    }

    pub fn tagged(port: u8) -> Self {
        Self {
            port,
            flags: PortFlags::TAGGED,
        }
    }
}

/// Trait implementing the chip-specific half of the driver.
///
/// Each supported chip provides one implementation, which knows where that
/// chip keeps its VLAN tables and control bits.  Every method that touches
/// the hardware is given the register interface to use; it is only valid for
/// the duration of the call, during which the driver holds its lock.
pub trait SwitchOps {
    /// Checks that the chip on the bus is one this table supports.
    fn detect<R: RegisterRw>(&mut self, rw: &mut R) -> Result<(), SmiError>;

    /// Brings the chip into a known state after detection.
    fn setup<R: RegisterRw>(&mut self, rw: &mut R) -> Result<(), SmiError>;

    fn mii_read<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        phy: u8,
        reg: u8,
    ) -> Result<u16, SmiError>;

    fn mii_write<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        phy: u8,
        reg: u8,
        value: u16,
    ) -> Result<(), SmiError>;

    fn get_vlan_4k<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        vid: u16,
    ) -> Result<Vlan4kEntry, SmiError>;

    /// Writes `entry` to the 4K table slot for `entry.vid`.
    fn set_vlan_4k<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        entry: &Vlan4kEntry,
    ) -> Result<(), SmiError>;

    fn get_vlan_mc<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        index: u8,
    ) -> Result<VlanMcEntry, SmiError>;

    fn set_vlan_mc<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        index: u8,
        entry: &VlanMcEntry,
    ) -> Result<(), SmiError>;

    /// Returns the MC slot that `port` currently uses for untagged ingress.
    fn get_mc_index<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        port: u8,
    ) -> Result<u8, SmiError>;

    fn set_mc_index<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        port: u8,
        index: u8,
    ) -> Result<(), SmiError>;

    /// Reads counter number `counter` (an index into [`Self::mib_counters`])
    /// for `port`.
    fn get_mib_counter<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        counter: usize,
        port: u8,
    ) -> Result<u64, SmiError>;

    fn enable_vlan<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        enable: bool,
    ) -> Result<(), SmiError>;

    fn enable_vlan4k<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        enable: bool,
    ) -> Result<(), SmiError>;

    fn enable_port<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        port: u8,
        enable: bool,
    ) -> Result<(), SmiError>;

    fn is_vlan_valid(&self, vid: u16) -> bool;

    /// The MIB counters this chip provides for every port
    fn mib_counters(&self) -> &[MibCounter];

    /// Highest filter ID the chip accepts
    fn max_fid(&self) -> u16;
}
