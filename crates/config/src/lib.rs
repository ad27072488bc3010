//! Shipper Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! An empty file is a valid configuration - only specify what you need to change.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use shipper_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[sdk]\ngroup_ids = [\"g1\"]").unwrap();
//! assert_eq!(config.sdk.group_ids, vec!["g1"]);
//! ```
//!
//! # Example Config
//!
//! ```toml
//! [log]
//! level = "info"
//!
//! [sdk]
//! group_ids = ["g1"]
//! pack_size = 409600
//! pack_timeout = "3s"
//! channels_per_destination = 2
//!
//! [discovery]
//! refresh_interval = "5m"
//!
//! [discovery.static.g1]
//! cluster_id = "c1"
//! endpoints = ["10.0.0.1:46801"]
//! ```

mod discovery;
mod error;
mod logging;
mod sdk;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use discovery::{DiscoveryConfig, StaticGroupConfig};
pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use sdk::{NumericIds, SdkConfig};

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults. The loaded value is a
/// read-only snapshot; components receive it (or a section of it) by
/// reference at construction.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,

    /// Buffering, packing and channel-pool settings
    pub sdk: SdkConfig,

    /// Resolution cache refresh and static endpoints
    pub discovery: DiscoveryConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, contains invalid TOML, or fails
    /// validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    ///
    /// Prefer using the `FromStr` trait implementation.
    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Callers that build a `Config` in code should call this before use.
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
