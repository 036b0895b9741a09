//! Declarative boot configuration
//!
//! Fixed at build time for embedded images, optionally loaded from TOML:
//!
//! ```toml
//! [[device]]
//! block_size = 512
//! block_num = 98304
//!
//! [program]
//! name = "dbtoaster"
//! log_count = 1
//! iterations = 1000
//! async_mode = false
//! ```

use crate::device::{DeviceTable, RamDiskConfig};
use crate::error::StorageError;
use crate::harness::ASYNC_FLAG;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid device table: {0}")]
    Device(#[from] StorageError),

    #[error("Invalid program arguments: {0}")]
    Program(String),
}

/// Arguments handed to the harness after boot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgramArgs {
    /// argv[0]
    pub name: String,

    /// `--iterations=N`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u64>,

    /// `--log-count=N`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_count: Option<u64>,

    /// `--async`
    pub async_mode: bool,
}

impl Default for ProgramArgs {
    fn default() -> Self {
        ProgramArgs {
            name: "dbtoaster".to_string(),
            iterations: Some(1000),
            log_count: Some(1),
            async_mode: false,
        }
    }
}

impl ProgramArgs {
    /// Render the argument vector, program name first
    pub fn to_argv(&self) -> Vec<String> {
        let mut argv = vec![self.name.clone()];

        if let Some(log_count) = self.log_count {
            argv.push(format!("--log-count={}", log_count));
        }
        if let Some(iterations) = self.iterations {
            argv.push(format!("--iterations={}", iterations));
        }
        if self.async_mode {
            argv.push(ASYNC_FLAG.to_string());
        }

        argv
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Program("program name cannot be empty".to_string()));
        }
        if self.iterations == Some(0) {
            return Err(ConfigError::Program("iterations must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Complete boot configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootConfig {
    /// Device table, in declaration order
    #[serde(rename = "device", default = "default_devices")]
    pub devices: Vec<RamDiskConfig>,

    #[serde(default)]
    pub program: ProgramArgs,
}

fn default_devices() -> Vec<RamDiskConfig> {
    vec![RamDiskConfig::default()]
}

impl Default for BootConfig {
    fn default() -> Self {
        BootConfig {
            devices: default_devices(),
            program: ProgramArgs::default(),
        }
    }
}

impl BootConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: BootConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path)?;
        Self::from_toml_str(&input)
    }

    pub fn device_table(&self) -> DeviceTable {
        DeviceTable::from_records(self.devices.clone())
    }

    /// Exactly one valid device and sane program arguments
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.device_table().sole()?;
        self.program.validate()
    }
}
