//! Configuration validation
//!
//! Validates config consistency:
//! - Size thresholds and pool sizes are non-zero
//! - Background intervals are non-zero
//! - Static endpoints are well-formed `host:port` pairs

use std::time::Duration;

use crate::Config;
use crate::error::{ConfigError, Result};

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_sdk(config)?;
    validate_discovery(config)?;
    Ok(())
}

/// Validate buffering, packing and pool settings
fn validate_sdk(config: &Config) -> Result<()> {
    let sdk = &config.sdk;

    require_positive("max_buffer_bytes", sdk.max_buffer_bytes)?;
    require_positive("pack_size", sdk.pack_size)?;
    require_positive("max_message_size", sdk.max_message_size)?;
    require_positive("channels_per_destination", sdk.channels_per_destination)?;
    require_nonzero_interval("sdk", "dispatch_interval", sdk.dispatch_interval)?;

    if sdk.group_ids.iter().any(|g| g.is_empty()) {
        return Err(ConfigError::invalid_value(
            "sdk",
            "sdk",
            "group_ids",
            "group ids must not be empty",
        ));
    }

    Ok(())
}

/// Validate refresh cadence and static endpoint lists
fn validate_discovery(config: &Config) -> Result<()> {
    let discovery = &config.discovery;

    require_nonzero_interval("discovery", "refresh_interval", discovery.refresh_interval)?;

    for (group, entry) in &discovery.static_groups {
        if entry.endpoints.is_empty() {
            return Err(ConfigError::missing_field("discovery", group, "endpoints"));
        }

        if let Some(bad) = entry.endpoints.iter().find(|e| !is_host_port(e)) {
            return Err(ConfigError::invalid_value(
                "discovery",
                group,
                "endpoints",
                format!("'{bad}' is not a host:port pair"),
            ));
        }
    }

    Ok(())
}

fn require_positive(field: &'static str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(ConfigError::invalid_value(
            "sdk",
            "sdk",
            field,
            "must be greater than 0",
        ));
    }
    Ok(())
}

fn require_nonzero_interval(section: &'static str, field: &'static str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Err(ConfigError::invalid_value(
            section,
            section,
            field,
            "interval must be non-zero",
        ));
    }
    Ok(())
}

/// Check that an endpoint looks like `host:port`
fn is_host_port(endpoint: &str) -> bool {
    match endpoint.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
