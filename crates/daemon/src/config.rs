// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway configuration file: tuning knobs plus the full configuration
//! tree (PLCs, containers, equipment, datapoints, grants, alarm rules).

use serde::Deserialize;
use sg_core::{AlarmRule, ConfigError, ConfigTree, Container, DataPoint, Equipment, Grant, Plc};
use sg_engine::{CommandSettings, PollerSettings};
use sg_modbus::ModbusSettings;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors loading the gateway configuration
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("cannot read {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("cannot parse {path}: {source}")]
    Parse { path: PathBuf, source: Box<toml::de::Error> },
    #[error(transparent)]
    Tree(#[from] ConfigError),
}

/// `[modbus]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModbusSection {
    pub timeout_s: f64,
    pub retries: u32,
    pub backoff_s: f64,
    pub max_backoff_s: f64,
    /// REAL reads start one register past the configured address (legacy
    /// decoder quirk). Set to 0 only for deployments without it.
    pub real_extra_offset: u16,
}

impl Default for ModbusSection {
    fn default() -> Self {
        Self {
            timeout_s: 3.0,
            retries: 2,
            backoff_s: 0.2,
            max_backoff_s: 2.0,
            real_extra_offset: 1,
        }
    }
}

/// `[polling]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingSection {
    pub enabled: bool,
    pub interval_s: f64,
    pub max_block_regs: u16,
    pub max_gap_regs: u16,
}

impl Default for PollingSection {
    fn default() -> Self {
        Self { enabled: true, interval_s: 1.0, max_block_regs: 100, max_gap_regs: 2 }
    }
}

/// `[commands]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommandsSection {
    pub max_retries: u32,
    pub backoff_s: f64,
    pub rate_limit_per_minute: u32,
}

impl Default for CommandsSection {
    fn default() -> Self {
        Self { max_retries: 2, backoff_s: 0.25, rate_limit_per_minute: 30 }
    }
}

/// `[alarms]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlarmsSection {
    pub digital_bit_max: u8,
}

impl Default for AlarmsSection {
    fn default() -> Self {
        Self { digital_bit_max: 15 }
    }
}

/// The whole gateway configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default)]
    pub modbus: ModbusSection,
    #[serde(default)]
    pub polling: PollingSection,
    #[serde(default)]
    pub commands: CommandsSection,
    #[serde(default)]
    pub alarms: AlarmsSection,
    #[serde(default)]
    pub plcs: Vec<Plc>,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub equipment: Vec<Equipment>,
    #[serde(default)]
    pub datapoints: Vec<DataPoint>,
    #[serde(default)]
    pub grants: Vec<Grant>,
    #[serde(default)]
    pub rules: Vec<AlarmRule>,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}

impl GatewayConfig {
    /// Read and parse the TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigFileError::Io { path: path.to_path_buf(), source })?;
        toml::from_str(&text).map_err(|source| ConfigFileError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
    }

    /// Validate and index the configuration tree.
    ///
    /// Addresses are validated against the configured
    /// `[modbus].real_extra_offset`, so changing that knob re-validates
    /// the whole tree on the next load.
    pub fn build_tree(&self) -> Result<ConfigTree, ConfigError> {
        ConfigTree::with_real_extra_offset(
            self.plcs.clone(),
            self.containers.clone(),
            self.equipment.clone(),
            self.datapoints.clone(),
            self.grants.clone(),
            self.rules.clone(),
            self.modbus.real_extra_offset,
        )
    }

    pub fn modbus_settings(&self) -> ModbusSettings {
        ModbusSettings {
            timeout: Duration::from_secs_f64(self.modbus.timeout_s),
            retries: self.modbus.retries,
            backoff: Duration::from_secs_f64(self.modbus.backoff_s),
            max_backoff: Duration::from_secs_f64(self.modbus.max_backoff_s),
        }
    }

    pub fn poller_settings(&self) -> PollerSettings {
        PollerSettings {
            interval: Duration::from_secs_f64(self.polling.interval_s),
            max_block_regs: self.polling.max_block_regs,
            max_gap_regs: self.polling.max_gap_regs,
        }
    }

    pub fn command_settings(&self) -> CommandSettings {
        CommandSettings {
            max_retries: self.commands.max_retries,
            backoff: Duration::from_secs_f64(self.commands.backoff_s),
            rate_limit_per_minute: self.commands.rate_limit_per_minute,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
