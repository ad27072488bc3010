//! Endpoint types returned by discovery
//!
//! An `EndpointSet` is what one discovery fetch yields for a group: the
//! cluster it belongs to (if any) and the proxy endpoints serving it.

use std::fmt;
use std::str::FromStr;

use crate::error::DiscoveryError;

/// One proxy endpoint (`host:port`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint
    #[inline]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or address
    #[inline]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port
    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| DiscoveryError::invalid_endpoint(s, "missing port"))?;
        if host.is_empty() {
            return Err(DiscoveryError::invalid_endpoint(s, "empty host"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| DiscoveryError::invalid_endpoint(s, e.to_string()))?;
        Ok(Self::new(host, port))
    }
}

/// Endpoints serving one group, plus the cluster they belong to
///
/// # Example
///
/// ```
/// use shipper_routing::{Endpoint, EndpointSet};
///
/// let set = EndpointSet::new(vec![Endpoint::new("10.0.0.1", 46801)])
///     .with_cluster("c1");
/// assert_eq!(set.cluster_id(), Some("c1"));
/// assert_eq!(set.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSet {
    cluster_id: Option<String>,
    endpoints: Vec<Endpoint>,
}

impl EndpointSet {
    /// Create a set without a cluster id
    #[inline]
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            cluster_id: None,
            endpoints,
        }
    }

    /// Attach the cluster id
    #[inline]
    #[must_use]
    pub fn with_cluster(mut self, cluster_id: impl Into<String>) -> Self {
        self.cluster_id = Some(cluster_id.into());
        self
    }

    /// Cluster the group resolved to
    #[inline]
    pub fn cluster_id(&self) -> Option<&str> {
        self.cluster_id.as_deref()
    }

    /// Endpoints in discovery order
    #[inline]
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Number of endpoints
    #[inline]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// True if there are no endpoints
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Iterate over endpoints
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Endpoint> {
        self.endpoints.iter()
    }
}

impl<'a> IntoIterator for &'a EndpointSet {
    type Item = &'a Endpoint;
    type IntoIter = std::slice::Iter<'a, Endpoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.endpoints.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        let ep: Endpoint = "10.0.0.1:46801".parse().unwrap();
        assert_eq!(ep.host(), "10.0.0.1");
        assert_eq!(ep.port(), 46801);
        assert_eq!(ep.to_string(), "10.0.0.1:46801");
    }

    #[test]
    fn test_parse_endpoint_errors() {
        assert!("10.0.0.1".parse::<Endpoint>().is_err());
        assert!(":80".parse::<Endpoint>().is_err());
        assert!("host:99999".parse::<Endpoint>().is_err());
        assert!("host:abc".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_endpoint_set() {
        let set = EndpointSet::new(vec![Endpoint::new("a", 1), Endpoint::new("b", 2)]);
        assert_eq!(set.cluster_id(), None);
        assert_eq!(set.len(), 2);
        assert!(!set.is_empty());

        let hosts: Vec<&str> = set.iter().map(Endpoint::host).collect();
        assert_eq!(hosts, vec!["a", "b"]);
        assert!(EndpointSet::default().is_empty());
    }
}
