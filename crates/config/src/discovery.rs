//! Destination discovery settings
//!
//! The refresh cadence of the resolution cache, plus optional static
//! endpoint lists used instead of a remote metadata service.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

/// Static endpoint list for one group
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StaticGroupConfig {
    /// Cluster the group belongs to; groups sharing a cluster share channels
    pub cluster_id: Option<String>,

    /// Endpoints as `host:port`
    pub endpoints: Vec<String>,
}

/// Discovery configuration
///
/// # Example
///
/// ```toml
/// [discovery]
/// refresh_interval = "5m"
///
/// [discovery.static.g1]
/// cluster_id = "c1"
/// endpoints = ["10.0.0.1:46801", "10.0.0.2:46801"]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// How often the resolution cache is refreshed
    /// Default: 5m
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,

    /// Static endpoint lists keyed by group id
    #[serde(rename = "static")]
    pub static_groups: BTreeMap<String, StaticGroupConfig>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(5 * 60),
            static_groups: BTreeMap::new(),
        }
    }
}
