// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! VLAN bookkeeping on top of the chip's operation table
//!
//! The chip keeps two VLAN tables: a 4K table indexed directly by VID, and a
//! small member configuration (MC) table that ports point into to pick their
//! default VLAN.  The 4K table is authoritative; an MC slot is a cache of one
//! VLAN's 4K entry, filled in on demand when some port needs that VLAN as its
//! PVID.

use crate::{SmiConfig, SwitchState, Trace, TRACE_DEPTH};
use core::ops::Range;
use drv_rtl8366_smi_api::{
    RegisterRw, SmiError, SwitchOps, Vlan4kEntry, VlanMcEntry, MAX_VLAN_MC,
    VID_MAX,
};
use ringbuf::{ringbuf_entry, Ringbuf};

/// A borrowed view of everything the VLAN operations touch.  This only
/// exists while the device lock is held.
pub(crate) struct VlanManager<'a, O, R> {
    pub ops: &'a mut O,
    pub rw: &'a mut R,
    pub config: &'a SmiConfig,
    pub state: &'a mut SwitchState,
    pub trace: &'a mut Ringbuf<Trace, TRACE_DEPTH>,
}

/// Result of one pass over the MC table
struct McScan {
    /// First slot already caching the requested VID
    resident: Option<u8>,
    /// First free slot
    free: Option<u8>,
    vids: [u16; MAX_VLAN_MC],
}

fn check_vid(vid: u16) -> Result<(), SmiError> {
    if vid <= VID_MAX {
        Ok(())
    } else {
        Err(SmiError::InvalidVlan(vid))
    }
}

impl<O: SwitchOps, R: RegisterRw> VlanManager<'_, O, R> {
    fn mc_slots(&self) -> Range<u8> {
        0..self.config.num_vlan_mc
    }

    /// Writes the 4K entry for `vid`, and refreshes the MC slot caching it
    /// (if there is one) so that ports using it see the change.
    pub fn set_vlan(
        &mut self,
        vid: u16,
        member: u32,
        untag: u32,
        fid: u16,
    ) -> Result<(), SmiError> {
        check_vid(vid)?;
        self.config.check_mask(member)?;
        self.config.check_mask(untag)?;

        let entry = Vlan4kEntry {
            vid,
            member,
            untag,
            fid,
        };
        self.ops.set_vlan_4k(self.rw, &entry)?;

        for i in self.mc_slots() {
            let mut mc = self.ops.get_vlan_mc(self.rw, i)?;
            if mc.vid == vid {
                mc.member = member;
                mc.untag = untag;
                mc.fid = fid;
                self.ops.set_vlan_mc(self.rw, i, &mc)?;
                ringbuf_entry!(self.trace, Trace::McUpdate { vid, index: i });
                break;
            }
        }
        Ok(())
    }

    pub fn get_pvid(&mut self, port: u8) -> Result<u16, SmiError> {
        self.config.check_port(port)?;
        let index = self.ops.get_mc_index(self.rw, port)?;
        let mc = self.ops.get_vlan_mc(self.rw, index)?;
        Ok(mc.vid)
    }

    /// Points `port` at an MC slot for `vid`, in order of preference:
    ///
    /// 1. a slot that already caches `vid`
    /// 2. a free slot, filled in from the 4K table
    /// 3. a slot that no port points at, overwritten from the 4K table
    ///
    /// Option 3 discards whatever VLAN the slot was caching; that VLAN's 4K
    /// entry is unaffected and will be copied back into some slot the next
    /// time a port asks for it.
    pub fn set_pvid(&mut self, port: u8, vid: u16) -> Result<(), SmiError> {
        self.config.check_port(port)?;
        check_vid(vid)?;

        let scan = self.scan_mc(vid)?;
        if let Some(index) = scan.resident {
            self.ops.set_mc_index(self.rw, port, index)?;
            ringbuf_entry!(self.trace, Trace::McReuse { port, vid, index });
            return Ok(());
        }

        if let Some(index) = scan.free {
            self.claim_mc(port, vid, index)?;
            ringbuf_entry!(self.trace, Trace::McAlloc { port, vid, index });
            return Ok(());
        }

        let used = self.used_mc()?;
        if let Some(index) = self.mc_slots().find(|&i| used & (1 << i) == 0) {
            self.claim_mc(port, vid, index)?;
            ringbuf_entry!(
                self.trace,
                Trace::McEvict {
                    port,
                    vid,
                    index,
                    evicted: scan.vids[usize::from(index)],
                }
            );
            return Ok(());
        }

        ringbuf_entry!(self.trace, Trace::McTableFull { port, vid });
        Err(SmiError::McTableFull { vid })
    }

    fn scan_mc(&mut self, vid: u16) -> Result<McScan, SmiError> {
        let mut scan = McScan {
            resident: None,
            free: None,
            vids: [0; MAX_VLAN_MC],
        };
        for i in self.mc_slots() {
            let mc = self.ops.get_vlan_mc(self.rw, i)?;
            if mc.vid == vid {
                scan.resident = Some(i);
                break;
            }
            if mc.is_free() && scan.free.is_none() {
                scan.free = Some(i);
            }
            scan.vids[usize::from(i)] = mc.vid;
        }
        Ok(scan)
    }

    /// Returns a bitmask of MC slots that at least one port points at.
    fn used_mc(&mut self) -> Result<u32, SmiError> {
        let mut used = 0;
        for port in 0..self.config.num_ports {
            let index = self.ops.get_mc_index(self.rw, port)?;
            if usize::from(index) < MAX_VLAN_MC {
                used |= 1 << index;
            }
        }
        Ok(used)
    }

    /// Copies `vid`'s 4K entry into MC slot `index` and points `port` at it.
    fn claim_mc(&mut self, port: u8, vid: u16, index: u8) -> Result<(), SmiError> {
        let vlan4k = self.ops.get_vlan_4k(self.rw, vid)?;
        let mc = VlanMcEntry {
            vid,
            ..VlanMcEntry::from_4k(&vlan4k)
        };
        self.ops.set_vlan_mc(self.rw, index, &mc)?;
        self.ops.set_mc_index(self.rw, port, index)
    }

    pub fn enable_vlan(&mut self, enable: bool) -> Result<(), SmiError> {
        self.ops.enable_vlan(self.rw, enable)?;
        self.state.vlan_enabled = enable;
        ringbuf_entry!(self.trace, Trace::VlanEnable(enable));

        if !enable {
            self.state.vlan4k_enabled = false;
            self.ops.enable_vlan4k(self.rw, false)?;
        }
        Ok(())
    }

    pub fn enable_vlan4k(&mut self, enable: bool) -> Result<(), SmiError> {
        if enable {
            self.ops.enable_vlan(self.rw, true)?;
            self.state.vlan_enabled = true;
        }

        self.ops.enable_vlan4k(self.rw, enable)?;
        self.state.vlan4k_enabled = enable;
        ringbuf_entry!(self.trace, Trace::Vlan4kEnable(enable));
        Ok(())
    }

    /// Turns VLAN processing off and frees every MC slot.
    pub fn reset_vlan(&mut self) -> Result<(), SmiError> {
        self.enable_vlan(false)?;
        self.enable_vlan4k(false)?;

        for i in self.mc_slots() {
            self.ops.set_vlan_mc(self.rw, i, &VlanMcEntry::FREE)?;
        }
        ringbuf_entry!(self.trace, Trace::VlanReset);
        Ok(())
    }

    /// Resets the VLAN tables, then isolates every port in its own VLAN
    /// (VID = port + 1) shared only with the CPU port.  The CPU port's VLAN
    /// spans every port.
    pub fn init_vlan(&mut self) -> Result<(), SmiError> {
        self.reset_vlan()?;

        let cpu = self.config.cpu_port;
        for port in 0..self.config.num_ports {
            let mask = if port == cpu {
                self.config.all_ports()
            } else {
                (1 << port) | (1 << cpu)
            };
            self.set_vlan(default_vid(port), mask, mask, 0)?;
        }

        for port in 0..self.config.num_ports {
            self.set_pvid(port, default_vid(port))?;
        }

        self.enable_vlan(true)
    }

    /// Enables or disables forwarding on every port, stopping at the first
    /// failure.  Ports already changed stay changed.
    pub fn enable_all_ports(&mut self, enable: bool) -> Result<(), SmiError> {
        for port in 0..self.config.num_ports {
            self.ops.enable_port(self.rw, port, enable)?;
        }
        Ok(())
    }
}

/// VLAN that isolates `port` after [`VlanManager::init_vlan`]
fn default_vid(port: u8) -> u16 {
    u16::from(port) + 1
}
