// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Driver for Realtek RTL8366-family Ethernet switches attached over SMI
//!
//! The switch is managed through a pair of GPIO lines running a bit-banged
//! serial management interface (see [`SmiBus`]).  On top of raw register
//! access, the driver manages the chip's VLAN tables: VLANs are configured in
//! the 4K table, and the handful of VLANs that ports actually use as their
//! default (PVID) are cached in the small member configuration (MC) table.
//!
//! Everything chip-specific (which registers hold which table) lives behind
//! [`SwitchOps`]; this crate only knows the protocol and the bookkeeping.
//!
//! All state lives in an [`Rtl8366Smi`], which serializes every register
//! transaction and every multi-register VLAN operation behind one spin lock.
//! Because bit-banging is timing-sensitive, nothing here ever sleeps.
#![cfg_attr(not(test), no_std)]

mod config;
mod smi;
mod switch;
mod vlan;

pub use config::SmiConfig;
pub use drv_rtl8366_smi_api::*;
pub use smi::{BusTrace, Phase, SmiBus, BUS_TRACE_DEPTH};
pub use switch::{MibReport, MibValue, VlanInfo, VlanPorts, MAX_MIB_COUNTERS};

use ringbuf::{ringbuf_entry, Ringbuf};
use spin::Mutex;
use vlan::VlanManager;

pub const TRACE_DEPTH: usize = 32;

/// VLAN modes as last successfully programmed into the chip
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SwitchState {
    pub vlan_enabled: bool,
    pub vlan4k_enabled: bool,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Trace {
    None,
    DetectFailed(SmiError),
    SetupFailed(SmiError),
    VlanInitFailed(SmiError),
    PortEnableFailed(SmiError),
    Initialized,
    /// `port` now uses a slot that already held `vid`
    McReuse { port: u8, vid: u16, index: u8 },
    /// `port` now uses a previously free slot
    McAlloc { port: u8, vid: u16, index: u8 },
    /// `port` took over a slot that no port was using, which was caching
    /// `evicted` until now
    McEvict { port: u8, vid: u16, index: u8, evicted: u16 },
    McTableFull { port: u8, vid: u16 },
    McUpdate { vid: u16, index: u8 },
    VlanEnable(bool),
    Vlan4kEnable(bool),
    VlanReset,
}

struct Inner<L, O> {
    bus: SmiBus<L>,
    ops: O,
    state: SwitchState,
    trace: Ringbuf<Trace, TRACE_DEPTH>,
}

/// One switch, along with the lines it hangs off of and its operation table
pub struct Rtl8366Smi<L, O> {
    config: SmiConfig,
    inner: Mutex<Inner<L, O>>,
}

impl<L: SmiLines, O: SwitchOps> Rtl8366Smi<L, O> {
    /// Builds a new device.  This does not touch the bus; call
    /// [`Rtl8366Smi::init`] to bring the switch up.
    pub fn new(lines: L, ops: O, config: SmiConfig) -> Result<Self, SmiError> {
        config.validate()?;
        Ok(Self {
            config,
            inner: Mutex::new(Inner {
                bus: SmiBus::new(lines, &config),
                ops,
                state: SwitchState::default(),
                trace: Ringbuf::new(Trace::None),
            }),
        })
    }

    pub fn config(&self) -> &SmiConfig {
        &self.config
    }

    /// Tears down the device, returning the lines and operation table.  The
    /// lines are left as inputs.
    pub fn into_parts(self) -> (L, O) {
        let inner = self.inner.into_inner();
        (inner.bus.into_lines(), inner.ops)
    }

    pub fn read_reg(&self, addr: u16) -> Result<u16, SmiError> {
        self.inner.lock().bus.read_reg(addr)
    }

    pub fn write_reg(&self, addr: u16, value: u16) -> Result<(), SmiError> {
        self.inner.lock().bus.write_reg(addr, value)
    }

    /// Replaces the bits of `addr` selected by `mask` with those of `value`.
    /// No other caller can access the switch between the read and the write.
    pub fn modify_reg(
        &self,
        addr: u16,
        mask: u16,
        value: u16,
    ) -> Result<(), SmiError> {
        self.inner.lock().bus.modify_reg(addr, mask, value)
    }

    /// Runs `f` with the lock held.
    pub(crate) fn with_vlan<T>(
        &self,
        f: impl FnOnce(&mut VlanManager<'_, O, SmiBus<L>>) -> Result<T, SmiError>,
    ) -> Result<T, SmiError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let mut vlan = VlanManager {
            ops: &mut inner.ops,
            rw: &mut inner.bus,
            config: &self.config,
            state: &mut inner.state,
            trace: &mut inner.trace,
        };
        f(&mut vlan)
    }

    /// Detects and sets up the chip, puts every port in its own VLAN, and
    /// enables forwarding.  Any failure leaves the switch half-configured;
    /// detection and setup failures mean the chip is unusable.
    pub fn init(&self) -> Result<(), SmiError> {
        self.with_vlan(|v| {
            if let Err(e) = v.ops.detect(v.rw) {
                ringbuf_entry!(v.trace, Trace::DetectFailed(e));
                return Err(e);
            }
            if let Err(e) = v.ops.setup(v.rw) {
                ringbuf_entry!(v.trace, Trace::SetupFailed(e));
                return Err(e);
            }
            if let Err(e) = v.init_vlan() {
                ringbuf_entry!(v.trace, Trace::VlanInitFailed(e));
                return Err(e);
            }
            if let Err(e) = v.enable_all_ports(true) {
                ringbuf_entry!(v.trace, Trace::PortEnableFailed(e));
                return Err(e);
            }
            ringbuf_entry!(v.trace, Trace::Initialized);
            Ok(())
        })
    }

    /// Writes `vid`'s entry in the 4K table, updating its MC slot if it has
    /// one.  `member` and `untag` are port bitmasks.
    pub fn set_vlan(
        &self,
        vid: u16,
        member: u32,
        untag: u32,
        fid: u16,
    ) -> Result<(), SmiError> {
        self.with_vlan(|v| v.set_vlan(vid, member, untag, fid))
    }

    pub fn get_pvid(&self, port: u8) -> Result<u16, SmiError> {
        self.with_vlan(|v| v.get_pvid(port))
    }

    /// Sets `port`'s default VLAN, claiming an MC slot for `vid` if it
    /// doesn't have one yet.  Fails with [`SmiError::McTableFull`] if every
    /// slot is in use by some port, in which case nothing is changed.
    pub fn set_pvid(&self, port: u8, vid: u16) -> Result<(), SmiError> {
        self.with_vlan(|v| v.set_pvid(port, vid))
    }

    /// Turning VLANs off also turns off 4K VLAN mode.
    pub fn enable_vlan(&self, enable: bool) -> Result<(), SmiError> {
        self.with_vlan(|v| v.enable_vlan(enable))
    }

    /// Turning 4K VLAN mode on also turns on VLANs.
    pub fn enable_vlan4k(&self, enable: bool) -> Result<(), SmiError> {
        self.with_vlan(|v| v.enable_vlan4k(enable))
    }

    pub fn reset_vlan(&self) -> Result<(), SmiError> {
        self.with_vlan(|v| v.reset_vlan())
    }

    pub fn init_vlan(&self) -> Result<(), SmiError> {
        self.with_vlan(|v| v.init_vlan())
    }

    pub fn enable_all_ports(&self, enable: bool) -> Result<(), SmiError> {
        self.with_vlan(|v| v.enable_all_ports(enable))
    }

    pub fn state(&self) -> SwitchState {
        self.inner.lock().state
    }

    /// Returns a snapshot of the driver's trace buffer.
    pub fn trace(&self) -> Ringbuf<Trace, TRACE_DEPTH> {
        self.inner.lock().trace
    }

    /// Returns a snapshot of the bus trace buffer.
    pub fn bus_trace(&self) -> Ringbuf<BusTrace, BUS_TRACE_DEPTH> {
        *self.inner.lock().bus.trace()
    }
}
