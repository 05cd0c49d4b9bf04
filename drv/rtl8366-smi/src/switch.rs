// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-VLAN and per-port attributes, as presented to a switch configuration
//! framework.  Everything here is validated before the bus is touched.

use crate::Rtl8366Smi;
use drv_rtl8366_smi_api::{
    PortFlags, SmiError, SmiLines, SwitchOps, VlanMode, VlanPort, MAX_PORTS,
};

/// Most MIB counters reported by [`Rtl8366Smi::get_port_mib`]; any further
/// counters declared by the chip are left out.
pub const MAX_MIB_COUNTERS: usize = 64;

pub type VlanPorts = heapless::Vec<VlanPort, MAX_PORTS>;
pub type MibReport = heapless::Vec<MibValue, MAX_MIB_COUNTERS>;

/// A VLAN's 4K table entry
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VlanInfo {
    pub vid: u16,
    pub member: u32,
    pub untag: u32,
    pub fid: u16,
}

/// One MIB counter of one port.  A failed read doesn't prevent reading the
/// rest of the counters.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MibValue {
    /// Index into [`SwitchOps::mib_counters`]
    pub counter: usize,
    pub value: Result<u64, SmiError>,
}

fn check_vlan<O: SwitchOps>(ops: &O, vid: u16) -> Result<(), SmiError> {
    if ops.is_vlan_valid(vid) {
        Ok(())
    } else {
        Err(SmiError::InvalidVlan(vid))
    }
}

fn vlan_ports(num_ports: u8, member: u32, untag: u32) -> VlanPorts {
    (0..num_ports)
        .filter(|&port| member & (1 << port) != 0)
        .map(|port| {
            if untag & (1 << port) != 0 {
                VlanPort::untagged(port)
            } else {
                VlanPort::tagged(port)
            }
        })
        .collect()
}

impl<L: SmiLines, O: SwitchOps> Rtl8366Smi<L, O> {
    pub fn get_port_pvid(&self, port: u8) -> Result<u16, SmiError> {
        self.config().check_port(port)?;
        self.with_vlan(|v| v.get_pvid(port))
    }

    pub fn set_port_pvid(&self, port: u8, vid: u16) -> Result<(), SmiError> {
        self.config().check_port(port)?;
        self.with_vlan(|v| {
            check_vlan(v.ops, vid)?;
            v.set_pvid(port, vid)
        })
    }

    /// Lists the members of `vid`, flagging those that egress tagged.
    pub fn get_vlan_ports(&self, vid: u16) -> Result<VlanPorts, SmiError> {
        self.with_vlan(|v| {
            check_vlan(v.ops, vid)?;
            let entry = v.ops.get_vlan_4k(v.rw, vid)?;
            Ok(vlan_ports(v.config.num_ports, entry.member, entry.untag))
        })
    }

    /// Makes `ports` the members of `vid`, and makes `vid` the default VLAN
    /// of each of them.  Ports are untagged unless flagged otherwise.
    ///
    /// PVIDs are assigned one port at a time; if one fails, the ports before
    /// it keep their new PVID and the 4K entry is left alone.
    pub fn set_vlan_ports(
        &self,
        vid: u16,
        ports: &[VlanPort],
    ) -> Result<(), SmiError> {
        let mut member = 0;
        let mut untag = 0;
        for p in ports {
            self.config().check_port(p.port)?;
            member |= 1 << p.port;
            if !p.flags.contains(PortFlags::TAGGED) {
                untag |= 1 << p.port;
            }
        }

        self.with_vlan(|v| {
            check_vlan(v.ops, vid)?;
            for p in ports {
                v.set_pvid(p.port, vid)?;
            }
            v.set_vlan(vid, member, untag, 0)
        })
    }

    pub fn get_vlan_fid(&self, vid: u16) -> Result<u16, SmiError> {
        self.with_vlan(|v| {
            check_vlan(v.ops, vid)?;
            Ok(v.ops.get_vlan_4k(v.rw, vid)?.fid)
        })
    }

    /// Moves `vid` to filter ID `fid`, keeping its members.
    pub fn set_vlan_fid(&self, vid: u16, fid: u16) -> Result<(), SmiError> {
        self.with_vlan(|v| {
            check_vlan(v.ops, vid)?;
            if fid > v.ops.max_fid() {
                return Err(SmiError::InvalidFid(fid));
            }
            let entry = v.ops.get_vlan_4k(v.rw, vid)?;
            v.set_vlan(vid, entry.member, entry.untag, fid)
        })
    }

    pub fn get_vlan_info(&self, vid: u16) -> Result<VlanInfo, SmiError> {
        self.with_vlan(|v| {
            check_vlan(v.ops, vid)?;
            let entry = v.ops.get_vlan_4k(v.rw, vid)?;
            Ok(VlanInfo {
                vid,
                member: entry.member,
                untag: entry.untag,
                fid: entry.fid,
            })
        })
    }

    pub fn vlan_enabled(&self, mode: VlanMode) -> bool {
        let state = self.state();
        match mode {
            VlanMode::Vlan => state.vlan_enabled,
            VlanMode::Vlan4k => state.vlan4k_enabled,
        }
    }

    pub fn set_vlan_enabled(
        &self,
        mode: VlanMode,
        enable: bool,
    ) -> Result<(), SmiError> {
        match mode {
            VlanMode::Vlan => self.enable_vlan(enable),
            VlanMode::Vlan4k => self.enable_vlan4k(enable),
        }
    }

    /// Reads every MIB counter of `port`.
    pub fn get_port_mib(&self, port: u8) -> Result<MibReport, SmiError> {
        self.config().check_port(port)?;
        self.with_vlan(|v| {
            let count = v.ops.mib_counters().len().min(MAX_MIB_COUNTERS);
            Ok((0..count)
                .map(|counter| MibValue {
                    counter,
                    value: v.ops.get_mib_counter(v.rw, counter, port),
                })
                .collect())
        })
    }

    pub fn read_mib_counter(
        &self,
        counter: usize,
        port: u8,
    ) -> Result<u64, SmiError> {
        self.config().check_port(port)?;
        self.with_vlan(|v| {
            if counter >= v.ops.mib_counters().len() {
                return Err(SmiError::InvalidMibCounter(counter));
            }
            v.ops.get_mib_counter(v.rw, counter, port)
        })
    }

    pub fn mii_read(&self, phy: u8, reg: u8) -> Result<u16, SmiError> {
        self.with_vlan(|v| v.ops.mii_read(v.rw, phy, reg))
    }

    pub fn mii_write(&self, phy: u8, reg: u8, value: u16) -> Result<(), SmiError> {
        self.with_vlan(|v| v.ops.mii_write(v.rw, phy, reg, value))
    }
}
