//! Discovery seam
//!
//! `Discovery` is the remote metadata source the resolver refreshes from.
//! `StaticDiscovery` serves fixed endpoint lists from configuration.

use std::collections::HashMap;

use async_trait::async_trait;
use shipper_config::DiscoveryConfig;

use crate::endpoint::{Endpoint, EndpointSet};
use crate::error::DiscoveryError;

/// Source of group → cluster/endpoint mappings
///
/// Implementations enforce their own timeouts and always return a definitive
/// answer.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Fetch the endpoint set for a group
    async fn fetch(&self, group_id: &str) -> Result<EndpointSet, DiscoveryError>;

    /// Source name for logging
    fn name(&self) -> &'static str;
}

/// Discovery backed by static endpoint lists
///
/// # Example
///
/// ```
/// use shipper_config::Config;
/// use shipper_routing::StaticDiscovery;
/// use std::str::FromStr;
///
/// let config = Config::from_str(r#"
/// [discovery.static.g1]
/// cluster_id = "c1"
/// endpoints = ["10.0.0.1:46801"]
/// "#).unwrap();
///
/// let discovery = StaticDiscovery::from_config(&config.discovery).unwrap();
/// assert_eq!(discovery.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    groups: HashMap<String, EndpointSet>,
}

impl StaticDiscovery {
    /// Create an empty source
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `[discovery.static.*]` tables
    ///
    /// # Errors
    ///
    /// Returns `InvalidEndpoint` if any endpoint is not `host:port`.
    pub fn from_config(config: &DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let mut groups = HashMap::with_capacity(config.static_groups.len());
        for (group_id, group) in &config.static_groups {
            let endpoints = group
                .endpoints
                .iter()
                .map(|s| s.parse::<Endpoint>())
                .collect::<Result<Vec<_>, _>>()?;

            let mut set = EndpointSet::new(endpoints);
            if let Some(cluster_id) = &group.cluster_id {
                set = set.with_cluster(cluster_id.clone());
            }
            groups.insert(group_id.clone(), set);
        }
        Ok(Self { groups })
    }

    /// Add or replace a group's endpoint set
    #[inline]
    #[must_use]
    pub fn with_group(mut self, group_id: impl Into<String>, set: EndpointSet) -> Self {
        self.groups.insert(group_id.into(), set);
        self
    }

    /// Number of configured groups
    #[inline]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// True if no groups are configured
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Configured group ids
    pub fn group_ids(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn fetch(&self, group_id: &str) -> Result<EndpointSet, DiscoveryError> {
        self.groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| DiscoveryError::not_found(group_id))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
