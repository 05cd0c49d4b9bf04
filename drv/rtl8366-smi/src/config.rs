// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use drv_rtl8366_smi_api::{SmiError, MAX_PORTS, MAX_VLAN_MC};
use serde::Deserialize;

/// Board-level description of a switch attached over SMI.
///
/// This is usually built in code with [`SmiConfig::new`], but can also be
/// read from the board's TOML description, e.g.
///
/// ```toml
/// num-ports = 6
/// cpu-port = 5
/// num-vlan-mc = 16
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SmiConfig {
    /// Number of physical ports, including the CPU port
    pub num_ports: u8,
    pub cpu_port: u8,
    /// Capacity of the chip's member configuration table
    pub num_vlan_mc: u8,
    /// Settle time between transitions on the bus lines
    #[serde(default = "SmiConfig::default_clk_delay_ns")]
    pub clk_delay_ns: u32,
    /// Number of times an unacknowledged byte is re-polled before the
    /// transaction is abandoned
    #[serde(default = "SmiConfig::default_ack_retries")]
    pub ack_retries: u8,
}

impl SmiConfig {
    pub const DEFAULT_CLK_DELAY_NS: u32 = 10;
    pub const DEFAULT_ACK_RETRIES: u8 = 5;

    pub const fn new(num_ports: u8, cpu_port: u8, num_vlan_mc: u8) -> Self {
        Self {
            num_ports,
            cpu_port,
            num_vlan_mc,
            clk_delay_ns: Self::DEFAULT_CLK_DELAY_NS,
            ack_retries: Self::DEFAULT_ACK_RETRIES,
        }
    }

    fn default_clk_delay_ns() -> u32 {
        Self::DEFAULT_CLK_DELAY_NS
    }

    fn default_ack_retries() -> u8 {
        Self::DEFAULT_ACK_RETRIES
    }

    pub fn validate(&self) -> Result<(), SmiError> {
        let ports = usize::from(self.num_ports);
        let mc = usize::from(self.num_vlan_mc);
        if ports == 0
            || ports > MAX_PORTS
            || self.cpu_port >= self.num_ports
            || mc == 0
            || mc > MAX_VLAN_MC
            || self.clk_delay_ns == 0
        {
            return Err(SmiError::BadConfig);
        }
        Ok(())
    }

    /// Returns a mask with a bit set for every port on the switch.
    pub fn all_ports(&self) -> u32 {
        match self.num_ports {
            32.. => u32::MAX,
            n => (1 << n) - 1,
        }
    }

    /// Checks that `port` exists on this switch.
    pub fn check_port(&self, port: u8) -> Result<(), SmiError> {
        if port < self.num_ports {
            Ok(())
        } else {
            Err(SmiError::InvalidPort(port))
        }
    }

    /// Checks that `mask` names only ports that exist on this switch.
    pub fn check_mask(&self, mask: u32) -> Result<(), SmiError> {
        if mask & !self.all_ports() == 0 {
            Ok(())
        } else {
            Err(SmiError::InvalidPortMask(mask))
        }
    }
}
