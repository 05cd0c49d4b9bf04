// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A simulated switch for driving the whole driver in tests
//!
//! [`Sim`] is a line-level SMI slave: it watches the clock and data lines,
//! decodes start and stop conditions and the byte framing, acknowledges
//! bytes, and serves a register file.  [`TestChip`] is an operation table
//! that lays the VLAN tables out in that register file.
#![allow(dead_code)]

use drv_rtl8366_smi::{
    Direction, Line, MibCounter, RegisterRw, Rtl8366Smi, SmiConfig, SmiError,
    SmiLines, SwitchOps, Vlan4kEntry, VlanMcEntry, VID_MAX,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const CHIP_ID_REG: u16 = 0x0509;
pub const CHIP_ID: u16 = 0x5937;

pub const VLAN_CTRL: u16 = 0x0000;
pub const VLAN_CTRL_ENABLE: u16 = 1 << 0;
pub const VLAN_CTRL_4K: u16 = 1 << 1;
pub const PORT_ENABLE: u16 = 0x0001;

const MC_BASE: u16 = 0x0100;
const MC_INDEX_BASE: u16 = 0x0200;
const VLAN_4K_BASE: u16 = 0x1000;
const MIB_BASE: u16 = 0x6000;
const MII_BASE: u16 = 0x7000;

pub fn mc_reg(index: u8) -> u16 {
    MC_BASE + u16::from(index) * 4
}

pub fn mc_index_reg(port: u8) -> u16 {
    MC_INDEX_BASE + u16::from(port)
}

pub fn vlan_4k_reg(vid: u16) -> u16 {
    VLAN_4K_BASE + vid * 4
}

pub fn mib_reg(port: u8, offset: u16) -> u16 {
    MIB_BASE + u16::from(port) * 0x10 + offset
}

pub fn mii_reg(phy: u8, reg: u8) -> u16 {
    MII_BASE + u16::from(phy) * 0x20 + u16::from(reg)
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Slave {
    /// Waiting for a start condition
    Idle,
    /// Shifting in a byte from the host
    Receive { bits: u8, value: u8 },
    /// Presenting the ack bit for the byte just received
    Ack { ack: bool },
    /// Shifting out a data byte
    Send { byte: u8, bits: u8 },
    /// Sampling the host's ack of the byte just sent
    MasterAck,
    /// Transaction complete, waiting for a stop condition
    Done,
}

struct SimState {
    sck: bool,
    sda: bool,
    sck_out: bool,
    sda_out: bool,

    slave: Slave,
    /// An output bit was sampled on the last rising edge, and the slave
    /// moves on at the next falling edge.
    sampled: bool,
    bytes: Vec<u8>,
    data: [u8; 2],
    sent: usize,

    regs: HashMap<u16, u16>,
    silent: bool,
    nack_polls: usize,

    ack_polls: usize,
    master_acks: Vec<bool>,
    collisions: usize,
    transactions: usize,
    delay_ns: u64,
}

impl SimState {
    fn new() -> Self {
        Self {
            sck: false,
            sda: true,
            sck_out: false,
            sda_out: false,
            slave: Slave::Idle,
            sampled: false,
            bytes: vec![],
            data: [0; 2],
            sent: 0,
            regs: HashMap::from([(CHIP_ID_REG, CHIP_ID)]),
            silent: false,
            nack_polls: 0,
            ack_polls: 0,
            master_acks: vec![],
            collisions: 0,
            transactions: 0,
            delay_ns: 0,
        }
    }

    fn start_condition(&mut self) {
        if !matches!(self.slave, Slave::Idle | Slave::Done) {
            self.collisions += 1;
        }
        self.slave = Slave::Receive { bits: 0, value: 0 };
        self.sampled = false;
        self.bytes.clear();
        self.sent = 0;
    }

    fn stop_condition(&mut self) {
        self.slave = Slave::Idle;
        self.sampled = false;
    }

    fn decide_ack(&mut self) -> bool {
        if self.silent {
            false
        } else if self.nack_polls > 0 {
            self.nack_polls -= 1;
            false
        } else {
            true
        }
    }

    fn is_read(&self) -> bool {
        self.bytes.first() == Some(&0xa9)
    }

    fn addr(&self) -> u16 {
        u16::from_le_bytes([self.bytes[1], self.bytes[2]])
    }

    fn byte_received(&mut self, value: u8) {
        self.bytes.push(value);
        if self.bytes.len() == 1 && value != 0xa9 && value != 0xa8 {
            // Not addressed to us: leave SDA to the pull-up.
            self.slave = Slave::Idle;
            return;
        }
        if self.bytes.len() == 5 {
            let value = u16::from_le_bytes([self.bytes[3], self.bytes[4]]);
            self.regs.insert(self.addr(), value);
            self.transactions += 1;
        }
        let ack = self.decide_ack();
        self.slave = Slave::Ack { ack };
    }

    fn after_ack(&mut self) {
        self.slave = match (self.is_read(), self.bytes.len()) {
            (true, 3) => {
                let value = self.regs.get(&self.addr()).copied().unwrap_or(0);
                self.data = value.to_le_bytes();
                self.transactions += 1;
                Slave::Send {
                    byte: self.data[0],
                    bits: 0,
                }
            }
            (false, 5) => Slave::Done,
            _ => Slave::Receive { bits: 0, value: 0 },
        };
    }

    fn rising(&mut self) {
        match self.slave {
            Slave::Receive { bits, value } => {
                let value = value << 1 | u8::from(self.sda);
                if bits == 7 {
                    self.byte_received(value);
                } else {
                    self.slave = Slave::Receive {
                        bits: bits + 1,
                        value,
                    };
                }
            }
            Slave::Ack { .. } | Slave::Send { .. } => self.sampled = true,
            Slave::MasterAck => {
                self.master_acks.push(self.sda);
                self.slave = if self.sent == 1 {
                    Slave::Send {
                        byte: self.data[1],
                        bits: 0,
                    }
                } else {
                    Slave::Done
                };
            }
            Slave::Idle | Slave::Done => (),
        }
    }

    fn falling(&mut self) {
        if !self.sampled {
            return;
        }
        self.sampled = false;
        match self.slave {
            Slave::Ack { ack: true } => {
                self.ack_polls += 1;
                self.after_ack();
            }
            Slave::Ack { ack: false } => {
                self.ack_polls += 1;
                let ack = self.decide_ack();
                self.slave = Slave::Ack { ack };
            }
            Slave::Send { byte, bits } => {
                self.slave = if bits == 7 {
                    self.sent += 1;
                    Slave::MasterAck
                } else {
                    Slave::Send {
                        byte,
                        bits: bits + 1,
                    }
                };
            }
            _ => (),
        }
    }

    fn slave_level(&self) -> bool {
        match self.slave {
            Slave::Ack { ack } => !ack,
            Slave::Send { byte, bits } => byte & (0x80 >> bits) != 0,
            _ => true,
        }
    }
}

/// The host's view of the simulated bus
pub struct SimLines(Arc<Mutex<SimState>>);

impl SmiLines for SimLines {
    fn set_direction(&mut self, line: Line, dir: Direction) {
        let mut s = self.0.lock().unwrap();
        let out = dir == Direction::Output;
        match line {
            Line::Sck => s.sck_out = out,
            Line::Sda => s.sda_out = out,
        }
    }

    fn set_level(&mut self, line: Line, high: bool) {
        let mut s = self.0.lock().unwrap();
        match line {
            Line::Sck => {
                if high && !s.sck {
                    s.sck = true;
                    s.rising();
                } else if !high && s.sck {
                    s.sck = false;
                    s.falling();
                }
            }
            Line::Sda => {
                if s.sda_out && s.sck && high != s.sda {
                    if high {
                        s.stop_condition();
                    } else {
                        s.start_condition();
                    }
                }
                s.sda = high;
            }
        }
    }

    fn get_level(&mut self, line: Line) -> bool {
        let s = self.0.lock().unwrap();
        match line {
            Line::Sck => s.sck,
            Line::Sda if s.sda_out => s.sda,
            Line::Sda => s.slave_level(),
        }
    }

    fn delay_ns(&mut self, ns: u32) {
        self.0.lock().unwrap().delay_ns += u64::from(ns);
    }
}

/// Handle for poking at the simulated switch from a test
#[derive(Clone)]
pub struct Sim(Arc<Mutex<SimState>>);

impl Sim {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(SimState::new())))
    }

    pub fn lines(&self) -> SimLines {
        SimLines(self.0.clone())
    }

    fn with<T>(&self, f: impl FnOnce(&mut SimState) -> T) -> T {
        f(&mut self.0.lock().unwrap())
    }

    pub fn reg(&self, addr: u16) -> u16 {
        self.with(|s| s.regs.get(&addr).copied().unwrap_or(0))
    }

    pub fn set_reg(&self, addr: u16, value: u16) {
        self.with(|s| s.regs.insert(addr, value));
    }

    /// Stops acknowledging anything.
    pub fn set_silent(&self, silent: bool) {
        self.with(|s| s.silent = silent);
    }

    /// Answers the next `n` ack polls with a NACK.
    pub fn nack_next(&self, n: usize) {
        self.with(|s| s.nack_polls = n);
    }

    pub fn ack_polls(&self) -> usize {
        self.with(|s| s.ack_polls)
    }

    pub fn master_acks(&self) -> Vec<bool> {
        self.with(|s| s.master_acks.clone())
    }

    /// Start conditions seen in the middle of another transaction
    pub fn collisions(&self) -> usize {
        self.with(|s| s.collisions)
    }

    /// Completed register reads and writes
    pub fn transactions(&self) -> usize {
        self.with(|s| s.transactions)
    }

    pub fn delay_ns(&self) -> u64 {
        self.with(|s| s.delay_ns)
    }

    /// True when the host has let go of both lines
    pub fn released(&self) -> bool {
        self.with(|s| !s.sck_out && !s.sda_out && s.slave == Slave::Idle)
    }
}

////////////////////////////////////////////////////////////////////////////////

pub const MIB_COUNTERS: [MibCounter; 3] = [
    MibCounter {
        base: MIB_BASE,
        offset: 0,
        length: 4,
        name: "IfInOctets",
    },
    MibCounter {
        base: MIB_BASE,
        offset: 4,
        length: 2,
        name: "IfInUcastPkts",
    },
    MibCounter {
        base: MIB_BASE,
        offset: 6,
        length: 2,
        name: "IfOutUcastPkts",
    },
];

/// Operation table for the simulated chip.  Port masks are 16 bits wide in
/// its registers.
#[derive(Default)]
pub struct TestChip {
    /// Port whose enable always fails
    pub failing_port: Option<u8>,
}

impl TestChip {
    pub fn failing_port(port: u8) -> Self {
        Self {
            failing_port: Some(port),
        }
    }
}

impl SwitchOps for TestChip {
    fn detect<R: RegisterRw>(&mut self, rw: &mut R) -> Result<(), SmiError> {
        match rw.read_reg(CHIP_ID_REG)? {
            CHIP_ID => Ok(()),
            0x0000 | 0xffff => Err(SmiError::DetectFailed),
            id => Err(SmiError::BadChipId(id)),
        }
    }

    fn setup<R: RegisterRw>(&mut self, rw: &mut R) -> Result<(), SmiError> {
        rw.write_reg(VLAN_CTRL, 0)?;
        rw.write_reg(PORT_ENABLE, 0)
    }

    fn mii_read<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        phy: u8,
        reg: u8,
    ) -> Result<u16, SmiError> {
        rw.read_reg(mii_reg(phy, reg))
    }

    fn mii_write<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        phy: u8,
        reg: u8,
        value: u16,
    ) -> Result<(), SmiError> {
        rw.write_reg(mii_reg(phy, reg), value)
    }

    fn get_vlan_4k<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        vid: u16,
    ) -> Result<Vlan4kEntry, SmiError> {
        let base = vlan_4k_reg(vid);
        Ok(Vlan4kEntry {
            vid,
            member: rw.read_reg(base)?.into(),
            untag: rw.read_reg(base + 1)?.into(),
            fid: rw.read_reg(base + 2)?,
        })
    }

    fn set_vlan_4k<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        entry: &Vlan4kEntry,
    ) -> Result<(), SmiError> {
        let base = vlan_4k_reg(entry.vid);
        rw.write_reg(base, entry.member as u16)?;
        rw.write_reg(base + 1, entry.untag as u16)?;
        rw.write_reg(base + 2, entry.fid)
    }

    fn get_vlan_mc<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        index: u8,
    ) -> Result<VlanMcEntry, SmiError> {
        let base = mc_reg(index);
        let word = rw.read_reg(base)?;
        Ok(VlanMcEntry {
            vid: word & 0xfff,
            priority: (word >> 12) as u8,
            member: rw.read_reg(base + 1)?.into(),
            untag: rw.read_reg(base + 2)?.into(),
            fid: rw.read_reg(base + 3)?,
        })
    }

    fn set_vlan_mc<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        index: u8,
        entry: &VlanMcEntry,
    ) -> Result<(), SmiError> {
        let base = mc_reg(index);
        rw.write_reg(base, entry.vid | u16::from(entry.priority) << 12)?;
        rw.write_reg(base + 1, entry.member as u16)?;
        rw.write_reg(base + 2, entry.untag as u16)?;
        rw.write_reg(base + 3, entry.fid)
    }

    fn get_mc_index<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        port: u8,
    ) -> Result<u8, SmiError> {
        Ok(rw.read_reg(mc_index_reg(port))? as u8)
    }

    fn set_mc_index<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        port: u8,
        index: u8,
    ) -> Result<(), SmiError> {
        rw.write_reg(mc_index_reg(port), index.into())
    }

    fn get_mib_counter<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        counter: usize,
        port: u8,
    ) -> Result<u64, SmiError> {
        let c = MIB_COUNTERS
            .get(counter)
            .ok_or(SmiError::InvalidMibCounter(counter))?;
        let mut value = 0;
        for i in 0..u16::from(c.length) {
            let word = rw.read_reg(c.base + u16::from(port) * 0x10 + c.offset + i)?;
            value |= u64::from(word) << (16 * i);
        }
        Ok(value)
    }

    fn enable_vlan<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        enable: bool,
    ) -> Result<(), SmiError> {
        let value = if enable { VLAN_CTRL_ENABLE } else { 0 };
        rw.modify_reg(VLAN_CTRL, VLAN_CTRL_ENABLE, value)
    }

    fn enable_vlan4k<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        enable: bool,
    ) -> Result<(), SmiError> {
        let value = if enable { VLAN_CTRL_4K } else { 0 };
        rw.modify_reg(VLAN_CTRL, VLAN_CTRL_4K, value)
    }

    fn enable_port<R: RegisterRw>(
        &mut self,
        rw: &mut R,
        port: u8,
        enable: bool,
    ) -> Result<(), SmiError> {
        if self.failing_port == Some(port) {
            return Err(SmiError::NoAck { addr: PORT_ENABLE });
        }
        let bit = 1 << port;
        rw.modify_reg(PORT_ENABLE, bit, if enable { bit } else { 0 })
    }

    fn is_vlan_valid(&self, vid: u16) -> bool {
        vid != 0 && vid <= VID_MAX
    }

    fn mib_counters(&self) -> &[MibCounter] {
        &MIB_COUNTERS
    }

    fn max_fid(&self) -> u16 {
        7
    }
}

pub type TestDevice = Rtl8366Smi<SimLines, TestChip>;

pub fn device(config: SmiConfig) -> (Sim, TestDevice) {
    device_with(config, TestChip::default())
}

pub fn device_with(config: SmiConfig, chip: TestChip) -> (Sim, TestDevice) {
    let sim = Sim::new();
    let dev = Rtl8366Smi::new(sim.lines(), chip, config).unwrap();
    (sim, dev)
}
