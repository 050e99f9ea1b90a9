//! Receiver connection settings loaded from TOML.
//!
//! ```toml
//! host = "192.168.1.40"
//! port = 60128
//! zone = "1"
//! connect_timeout_ms = 5000
//! command_timeout_ms = 3000
//! volume_resolution = 80
//! ```
//!
//! Only `host` is required. Where the file lives and when it is written is
//! up to the caller.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use eiscp_core::types::Zone;

use crate::builder::EiscpBuilder;
use crate::commands::MAX_VOLUME_STEP;
use crate::models::{
    DEFAULT_COMMAND_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT, DEFAULT_VOLUME_RESOLUTION,
};

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Settings for one receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    pub host: String,
    /// TCP port (default: 60128).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Default zone, a single character (default: "1").
    #[serde(default = "default_zone")]
    pub zone: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Volume steps from silence to maximum (default: 80).
    #[serde(default = "default_volume_resolution")]
    pub volume_resolution: u16,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_zone() -> String {
    Zone::MAIN.to_string()
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_millis() as u64
}

fn default_command_timeout_ms() -> u64 {
    DEFAULT_COMMAND_TIMEOUT.as_millis() as u64
}

fn default_volume_resolution() -> u16 {
    DEFAULT_VOLUME_RESOLUTION
}

impl ReceiverConfig {
    /// Settings for `host` with every other field at its default.
    pub fn new(host: &str) -> Self {
        ReceiverConfig {
            host: host.to_string(),
            port: default_port(),
            zone: default_zone(),
            connect_timeout_ms: default_connect_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            volume_resolution: default_volume_resolution(),
        }
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ReceiverConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Render the settings as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Validation("Host cannot be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Validation(
                "Port must be greater than 0".to_string(),
            ));
        }
        self.zone_id()?;
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "Connect timeout must be greater than 0".to_string(),
            ));
        }
        if self.command_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "Command timeout must be greater than 0".to_string(),
            ));
        }
        if self.volume_resolution == 0 {
            return Err(ConfigError::Validation(
                "Volume resolution must be greater than 0".to_string(),
            ));
        }
        if self.volume_resolution > u16::from(MAX_VOLUME_STEP) {
            return Err(ConfigError::Validation(format!(
                "Volume resolution must be at most {MAX_VOLUME_STEP}"
            )));
        }
        Ok(())
    }

    /// The configured zone.
    pub fn zone_id(&self) -> Result<Zone, ConfigError> {
        self.zone
            .parse::<Zone>()
            .map_err(|e| ConfigError::Validation(format!("Invalid zone: {e}")))
    }

    /// A builder pre-loaded with these settings.
    pub fn builder(&self) -> Result<EiscpBuilder, ConfigError> {
        self.validate()?;
        Ok(EiscpBuilder::new(self.host.trim())
            .port(self.port)
            .zone(self.zone_id()?)
            .connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .command_timeout(Duration::from_millis(self.command_timeout_ms))
            .volume_resolution(self.volume_resolution))
    }
}
