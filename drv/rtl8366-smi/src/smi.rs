// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bit-banged SMI transport
//!
//! SMI is a two-wire protocol that looks a lot like I2C without the device
//! address: after a start condition the host sends a command byte, a 16-bit
//! register address (low byte first), and then either sends or receives 16
//! bits of data (again low byte first).  Every byte the host sends is
//! acknowledged by the switch pulling SDA low for one clock; every byte the
//! switch sends is acknowledged by the host, which drives a 1 after the last
//! byte.
//!
//! A transaction moves through [`Phase`]s in order:
//!
//! ```text
//!   Idle --start--> Command --ack--> AddrLo --ack--> AddrHi --ack--> DataLo
//!                                                                      |
//!   Idle <--stop-- Done <--------------- DataHi <----------------------+
//! ```
//!
//! A missing acknowledgment abandons the transaction wherever it is, but the
//! stop sequence is always run so that the bus is released.

use crate::SmiConfig;
use drv_rtl8366_smi_api::{Direction, Line, RegisterRw, SmiError, SmiLines};
use ringbuf::{ringbuf_entry, Ringbuf};
use static_assertions::const_assert_eq;

/// Fixed opcode bits of the command byte; bit 0 selects read (1) or
/// write (0).
const SMI_CMD: u8 = 0x0a << 4 | 0x04 << 1;
const SMI_CMD_READ: u8 = SMI_CMD | 0x01;
const SMI_CMD_WRITE: u8 = SMI_CMD;

const_assert_eq!(SMI_CMD_READ, 0xa9);
const_assert_eq!(SMI_CMD_WRITE, 0xa8);

pub const BUS_TRACE_DEPTH: usize = 16;

/// The byte that a transaction is currently transferring.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Phase {
    Idle,
    Command,
    AddrLo,
    AddrHi,
    DataLo,
    DataHi,
    Done,
}

impl Phase {
    fn next(self) -> Self {
        match self {
            Self::Idle => Self::Idle,
            Self::Command => Self::AddrLo,
            Self::AddrLo => Self::AddrHi,
            Self::AddrHi => Self::DataLo,
            Self::DataLo => Self::DataHi,
            Self::DataHi | Self::Done => Self::Done,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum BusTrace {
    None,
    Read { addr: u16, value: u16 },
    Write { addr: u16, value: u16 },
    Nack { addr: u16, phase: Phase, attempts: u16 },
}

/// Host side of the SMI bus.
///
/// This does no locking of its own; the owning device serializes access.
pub struct SmiBus<L> {
    lines: L,
    clk_delay_ns: u32,
    ack_retries: u8,
    phase: Phase,
    trace: Ringbuf<BusTrace, BUS_TRACE_DEPTH>,
}

impl<L: SmiLines> SmiBus<L> {
    pub fn new(lines: L, config: &SmiConfig) -> Self {
        Self {
            lines,
            clk_delay_ns: config.clk_delay_ns,
            ack_retries: config.ack_retries,
            phase: Phase::Idle,
            trace: Ringbuf::new(BusTrace::None),
        }
    }

    pub fn into_lines(self) -> L {
        self.lines
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn trace(&self) -> &Ringbuf<BusTrace, BUS_TRACE_DEPTH> {
        &self.trace
    }

    fn delay(&mut self) {
        self.lines.delay_ns(self.clk_delay_ns);
    }

    fn sck(&mut self, high: bool) {
        self.lines.set_level(Line::Sck, high);
    }

    fn sda(&mut self, high: bool) {
        self.lines.set_level(Line::Sda, high);
    }

    fn start(&mut self) {
        debug_assert_eq!(self.phase, Phase::Idle);

        // Take both lines, with SCK = 0, SDA = 1
        self.lines.set_direction(Line::Sck, Direction::Output);
        self.sck(false);
        self.lines.set_direction(Line::Sda, Direction::Output);
        self.sda(true);
        self.delay();

        // CLK 1: a plain pulse with SDA held high
        self.sck(true);
        self.delay();
        self.sck(false);
        self.delay();

        // CLK 2: SDA falls while SCK is high, which is the start condition
        self.sck(true);
        self.delay();
        self.sda(false);
        self.delay();
        self.sck(false);
        self.delay();
        self.sda(true);

        self.phase = Phase::Command;
    }

    fn stop(&mut self) {
        self.delay();
        self.sda(false);
        self.sck(true);
        self.delay();
        // SDA rises while SCK is high: stop condition
        self.sda(true);
        self.delay();
        self.sck(true);
        self.delay();
        self.sck(false);
        self.delay();
        self.sck(true);

        // One more clock for good measure
        self.delay();
        self.sck(false);
        self.delay();
        self.sck(true);

        self.lines.set_direction(Line::Sda, Direction::Input);
        self.lines.set_direction(Line::Sck, Direction::Input);

        self.phase = Phase::Idle;
    }

    /// Shifts out the low `len` bits of `data`, MSB first.
    fn write_bits(&mut self, data: u32, len: u32) {
        for bit in (0..len).rev() {
            self.delay();
            self.sda(data & (1 << bit) != 0);
            self.delay();
            self.sck(true);
            self.delay();
            self.sck(false);
        }
    }

    /// Shifts in `len` bits, MSB first.  SDA is handed to the switch for the
    /// duration and taken back (driven low) afterwards.
    fn read_bits(&mut self, len: u32) -> u32 {
        self.lines.set_direction(Line::Sda, Direction::Input);

        let mut data = 0;
        for bit in (0..len).rev() {
            self.delay();
            self.sck(true);
            self.delay();
            let level = self.lines.get_level(Line::Sda);
            self.sck(false);
            data |= u32::from(level) << bit;
        }

        self.lines.set_direction(Line::Sda, Direction::Output);
        self.sda(false);
        data
    }

    fn wait_for_ack(&mut self, addr: u16) -> Result<(), SmiError> {
        let mut nacks = 0u16;
        loop {
            if self.read_bits(1) == 0 {
                return Ok(());
            }
            nacks += 1;
            if nacks > u16::from(self.ack_retries) {
                ringbuf_entry!(
                    self.trace,
                    BusTrace::Nack {
                        addr,
                        phase: self.phase,
                        attempts: nacks,
                    }
                );
                return Err(SmiError::NoAck { addr });
            }
        }
    }

    /// Sends one byte and waits for the switch to acknowledge it.  `addr` is
    /// the register being accessed, for error reporting.
    fn write_byte(&mut self, byte: u8, addr: u16) -> Result<(), SmiError> {
        self.write_bits(byte.into(), 8);
        self.wait_for_ack(addr)?;
        self.phase = self.phase.next();
        Ok(())
    }

    /// Receives one byte, then acknowledges it: a 0 asks for more data, a 1
    /// marks the end of the read.
    fn read_byte(&mut self, last: bool) -> u8 {
        let byte = self.read_bits(8) as u8;
        self.write_bits(last.into(), 1);
        self.phase = self.phase.next();
        byte
    }

    fn read_transaction(&mut self, addr: u16) -> Result<u16, SmiError> {
        let [lo, hi] = addr.to_le_bytes();
        self.write_byte(SMI_CMD_READ, addr)?;
        self.write_byte(lo, addr)?;
        self.write_byte(hi, addr)?;

        let lo = self.read_byte(false);
        let hi = self.read_byte(true);
        Ok(u16::from_le_bytes([lo, hi]))
    }

    fn write_transaction(&mut self, addr: u16, value: u16) -> Result<(), SmiError> {
        let [addr_lo, addr_hi] = addr.to_le_bytes();
        let [lo, hi] = value.to_le_bytes();
        self.write_byte(SMI_CMD_WRITE, addr)?;
        self.write_byte(addr_lo, addr)?;
        self.write_byte(addr_hi, addr)?;
        self.write_byte(lo, addr)?;
        self.write_byte(hi, addr)
    }
}

impl<L: SmiLines> RegisterRw for SmiBus<L> {
    fn read_reg(&mut self, addr: u16) -> Result<u16, SmiError> {
        self.start();
        let r = self.read_transaction(addr);
        self.stop();

        let value = r?;
        ringbuf_entry!(self.trace, BusTrace::Read { addr, value });
        Ok(value)
    }

    fn write_reg(&mut self, addr: u16, value: u16) -> Result<(), SmiError> {
        self.start();
        let r = self.write_transaction(addr, value);
        self.stop();

        r?;
        ringbuf_entry!(self.trace, BusTrace::Write { addr, value });
        Ok(())
    }
}
