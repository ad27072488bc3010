//! Destination resolution cache
//!
//! Maps a group id to the cluster serving it and caches the endpoint sets per
//! group and per cluster. Each of the three maps sits behind its own
//! `RwLock` and is replaced wholesale on refresh, so a reader always sees one
//! complete snapshot of a map.
//!
//! # Refresh
//!
//! A refresh fetches every watched group from the discovery source, builds
//! new maps off-lock, then commits them in the order cluster → endpoints,
//! group → endpoints, group → cluster. A group whose fetch fails keeps its
//! previous entries.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use shipper_config::DiscoveryConfig;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discovery::Discovery;
use crate::endpoint::EndpointSet;

/// Outcome of one refresh pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Groups fetched successfully
    pub resolved: usize,
    /// Groups whose fetch failed (previous entries kept)
    pub failed: usize,
}

/// Cached group → cluster → endpoints resolution
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use shipper_routing::{DestinationResolver, Endpoint, EndpointSet, StaticDiscovery};
///
/// # tokio_test_block_on(async {
/// let discovery = StaticDiscovery::new().with_group(
///     "g1",
///     EndpointSet::new(vec![Endpoint::new("10.0.0.1", 46801)]).with_cluster("c1"),
/// );
/// let resolver = DestinationResolver::new(Arc::new(discovery), Duration::from_secs(300));
/// resolver.watch("g1");
/// resolver.refresh().await;
///
/// assert_eq!(resolver.group_key("g1"), "c1");
/// assert_eq!(resolver.group_key("unknown"), "unknown");
/// assert!(resolver.exists("c1"));
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
pub struct DestinationResolver {
    discovery: Arc<dyn Discovery>,
    refresh_interval: Duration,
    watched: RwLock<BTreeSet<String>>,
    group_to_cluster: RwLock<HashMap<String, String>>,
    group_endpoints: RwLock<HashMap<String, Arc<EndpointSet>>>,
    cluster_endpoints: RwLock<HashMap<String, Arc<EndpointSet>>>,
}

impl DestinationResolver {
    /// Create an empty resolver
    pub fn new(discovery: Arc<dyn Discovery>, refresh_interval: Duration) -> Self {
        Self {
            discovery,
            refresh_interval,
            watched: RwLock::new(BTreeSet::new()),
            group_to_cluster: RwLock::new(HashMap::new()),
            group_endpoints: RwLock::new(HashMap::new()),
            cluster_endpoints: RwLock::new(HashMap::new()),
        }
    }

    /// Create a resolver using the configured refresh interval
    pub fn from_config(discovery: Arc<dyn Discovery>, config: &DiscoveryConfig) -> Self {
        Self::new(discovery, config.refresh_interval)
    }

    /// Refresh interval
    #[inline]
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    // =========================================================================
    // Watched groups
    // =========================================================================

    /// Add a group to the refresh set
    ///
    /// Returns `true` if the group was not watched before. It is resolved on
    /// the next refresh.
    pub fn watch(&self, group_id: &str) -> bool {
        if self.watched.read().contains(group_id) {
            return false;
        }
        self.watched.write().insert(group_id.to_string())
    }

    /// Groups refreshed on every pass, sorted
    pub fn watched_groups(&self) -> Vec<String> {
        self.watched.read().iter().cloned().collect()
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Canonical destination key for a group
    ///
    /// The cluster id the group last resolved to, or the group id itself if
    /// it has not been resolved to a cluster.
    pub fn group_key(&self, group_id: &str) -> String {
        self.group_to_cluster
            .read()
            .get(group_id)
            .cloned()
            .unwrap_or_else(|| group_id.to_string())
    }

    /// True if `key` (cluster id or group id) has a non-empty endpoint set
    pub fn exists(&self, key: &str) -> bool {
        self.endpoints_for_key(key).is_some_and(|set| !set.is_empty())
    }

    /// Endpoints cached for a group
    pub fn endpoints_for_group(&self, group_id: &str) -> Option<Arc<EndpointSet>> {
        self.group_endpoints.read().get(group_id).cloned()
    }

    /// Endpoints cached for a cluster
    pub fn endpoints_for_cluster(&self, cluster_id: &str) -> Option<Arc<EndpointSet>> {
        self.cluster_endpoints.read().get(cluster_id).cloned()
    }

    /// Endpoints for a destination key, trying the cluster map first
    pub fn endpoints_for_key(&self, key: &str) -> Option<Arc<EndpointSet>> {
        self.endpoints_for_cluster(key)
            .or_else(|| self.endpoints_for_group(key))
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Re-fetch every watched group and swap in the new maps
    ///
    /// The maps are rebuilt from this pass's answers. A group whose fetch
    /// fails keeps its previous entries, including its cluster's endpoints
    /// unless a successful fetch this pass replaced them. Clusters no group
    /// maps to any more are dropped.
    pub async fn refresh(&self) -> RefreshReport {
        let groups = self.watched_groups();
        let mut report = RefreshReport::default();

        let mut group_to_cluster = HashMap::with_capacity(groups.len());
        let mut group_endpoints = HashMap::with_capacity(groups.len());
        let mut cluster_endpoints = HashMap::new();
        let mut failed = Vec::new();

        for group_id in &groups {
            match self.discovery.fetch(group_id).await {
                Ok(set) => {
                    report.resolved += 1;
                    let set = Arc::new(set);
                    if let Some(cluster_id) = set.cluster_id() {
                        cluster_endpoints.insert(cluster_id.to_string(), Arc::clone(&set));
                        group_to_cluster.insert(group_id.clone(), cluster_id.to_string());
                    }
                    debug!(
                        group_id = %group_id,
                        cluster_id = set.cluster_id().unwrap_or("-"),
                        endpoints = set.len(),
                        "group resolved"
                    );
                    group_endpoints.insert(group_id.clone(), set);
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        group_id = %group_id,
                        source = self.discovery.name(),
                        error = %e,
                        "group resolution failed, keeping previous entries"
                    );
                    failed.push(group_id);
                }
            }
        }

        if !failed.is_empty() {
            let prev_clusters = self.group_to_cluster.read();
            let prev_groups = self.group_endpoints.read();
            let prev_cluster_sets = self.cluster_endpoints.read();
            for group_id in failed {
                if let Some(set) = prev_groups.get(group_id) {
                    group_endpoints.insert(group_id.clone(), Arc::clone(set));
                }
                let Some(cluster_id) = prev_clusters.get(group_id) else {
                    continue;
                };
                group_to_cluster.insert(group_id.clone(), cluster_id.clone());
                if let Some(set) = prev_cluster_sets.get(cluster_id) {
                    cluster_endpoints
                        .entry(cluster_id.clone())
                        .or_insert_with(|| Arc::clone(set));
                }
            }
        }

        *self.cluster_endpoints.write() = cluster_endpoints;
        *self.group_endpoints.write() = group_endpoints;
        *self.group_to_cluster.write() = group_to_cluster;

        report
    }

    /// Run the periodic refresh until cancelled
    ///
    /// The first refresh happens one interval after start; call
    /// [`refresh`](Self::refresh) once before spawning this.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.refresh_interval, self.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.refresh_interval.as_secs(),
            source = self.discovery.name(),
            "destination resolver started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("destination resolver shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.refresh().await;
                    debug!(
                        resolved = report.resolved,
                        failed = report.failed,
                        "destination resolver refreshed"
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for DestinationResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationResolver")
            .field("source", &self.discovery.name())
            .field("refresh_interval", &self.refresh_interval)
            .field("watched", &self.watched.read().len())
            .field("clusters", &self.cluster_endpoints.read().len())
            .finish()
    }
}
