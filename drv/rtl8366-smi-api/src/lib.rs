// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Contract types for the RTL8366-family SMI driver
//!
//! This crate holds everything that sits on either side of the driver in
//! `drv/rtl8366-smi`: the two-line bus the driver bit-bangs ([`SmiLines`]),
//! the register access trait it provides ([`RegisterRw`]), the per-chip
//! operation table it consumes ([`SwitchOps`]), and the error type shared by
//! all of them.  It is factored into its own crate so that chip support can
//! be written without depending on the driver itself.

#![cfg_attr(not(test), no_std)]

mod ops;

pub use ops::*;

/// One of the two SMI lines.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Line {
    /// Serial clock, always driven by the host
    Sck,
    /// Serial data, driven by whichever side is currently talking
    Sda,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    Input,
    Output,
}

/// Trait implementing control of the two SMI lines.
///
/// This is normally a thin wrapper around a pair of GPIOs.  Every method is
/// expected to complete quickly; the driver calls them with its lock held and
/// will not tolerate a method that sleeps.
pub trait SmiLines {
    fn set_direction(&mut self, line: Line, dir: Direction);

    /// Drives `line` high (`true`) or low (`false`).  The line should already
    /// be configured as an output.
    fn set_level(&mut self, line: Line, high: bool);

    /// Samples `line`.
    fn get_level(&mut self, line: Line) -> bool;

    /// Busy-waits for at least `ns` nanoseconds.
    fn delay_ns(&mut self, ns: u32);
}

/// Trait implementing 16-bit register access to the switch.
///
/// The driver's transport implements this; operation tables are handed a
/// `&mut impl RegisterRw` that is only valid while the driver's lock is held.
pub trait RegisterRw {
    fn read_reg(&mut self, addr: u16) -> Result<u16, SmiError>;

    fn write_reg(&mut self, addr: u16, value: u16) -> Result<(), SmiError>;

    /// Performs a read-modify-write, replacing the bits selected by `mask`
    /// with the corresponding bits of `value`.
    fn modify_reg(
        &mut self,
        addr: u16,
        mask: u16,
        value: u16,
    ) -> Result<(), SmiError> {
        let old = self.read_reg(addr)?;
        self.write_reg(addr, (old & !mask) | (value & mask))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SmiError {
    /// The switch did not acknowledge a byte within the retry bound during a
    /// transaction on register `addr`
    NoAck { addr: u16 },
    /// Every member configuration slot is referenced by some port, so `vid`
    /// could not be given one
    McTableFull { vid: u16 },
    InvalidVlan(u16),
    InvalidPort(u8),
    InvalidFid(u16),
    /// The mask names ports that don't exist on this switch
    InvalidPortMask(u32),
    InvalidMibCounter(usize),
    /// The driver configuration is inconsistent (see `SmiConfig::validate`)
    BadConfig,
    DetectFailed,
    BadChipId(u16),
    SetupFailed,
}

/// Broad classes of [`SmiError`], for callers that need to decide between
/// retrying, reporting a malfunction, or rejecting a request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The bus or the chip on the other end of it misbehaved
    Io,
    /// A fixed-size hardware table is full
    ResourceExhausted,
    /// The request was rejected before touching the hardware
    InvalidArgument,
    /// The chip could not be identified or brought up
    Chip,
}

impl SmiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoAck { .. } => ErrorKind::Io,
            Self::McTableFull { .. } => ErrorKind::ResourceExhausted,
            Self::InvalidVlan(_)
            | Self::InvalidPort(_)
            | Self::InvalidFid(_)
            | Self::InvalidPortMask(_)
            | Self::InvalidMibCounter(_)
            | Self::BadConfig => ErrorKind::InvalidArgument,
            Self::DetectFailed | Self::BadChipId(_) | Self::SetupFailed => {
                ErrorKind::Chip
            }
        }
    }
}
