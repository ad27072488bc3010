//! Channel router
//!
//! Owns one `DestinationPool` per destination key and picks a channel from
//! it for every send.
//!
//! # Design
//!
//! - Pool lookups take the read lock; creation takes the write lock
//! - A pool is only created if the resolver knows the destination
//! - Pools are created once and never resized
//! - Channels are opened before the write lock is taken; if two callers race
//!   to create the same pool, the first insert wins and the loser's channels
//!   are dropped

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use shipper_protocol::WirePacket;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelFactory};
use crate::error::{Result, RoutingError};
use crate::pool::DestinationPool;
use crate::resolver::DestinationResolver;

/// Maps destination keys to load-balanced channel pools
///
/// # Example
///
/// ```ignore
/// let router = ChannelRouter::new(resolver, factory, 2);
/// router.warm_up(["cluster-a"]);
///
/// let channel = router.select("cluster-a").expect("pool exists");
/// channel.push(packet)?;
/// ```
pub struct ChannelRouter {
    resolver: Arc<DestinationResolver>,
    factory: Arc<dyn ChannelFactory>,
    channels_per_destination: usize,
    pools: RwLock<HashMap<String, Arc<DestinationPool>>>,
}

impl ChannelRouter {
    /// Create a router opening `channels_per_destination` channels per pool
    ///
    /// A count of zero is treated as one.
    pub fn new(
        resolver: Arc<DestinationResolver>,
        factory: Arc<dyn ChannelFactory>,
        channels_per_destination: usize,
    ) -> Self {
        Self {
            resolver,
            factory,
            channels_per_destination: channels_per_destination.max(1),
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// Resolver consulted for existence checks
    #[inline]
    pub fn resolver(&self) -> &Arc<DestinationResolver> {
        &self.resolver
    }

    /// Configured pool size
    #[inline]
    pub fn channels_per_destination(&self) -> usize {
        self.channels_per_destination
    }

    /// Existing pool for `key`, without creating one
    pub fn pool(&self, key: &str) -> Option<Arc<DestinationPool>> {
        self.pools.read().get(key).cloned()
    }

    /// Existing or newly created pool for `key`
    ///
    /// Returns `None` if the destination is unknown to the resolver or its
    /// channels could not be opened.
    pub fn get_or_create(&self, key: &str) -> Option<Arc<DestinationPool>> {
        match self.try_get_or_create(key) {
            Ok(pool) => Some(pool),
            Err(RoutingError::NoPool { .. }) => None,
            Err(e) => {
                warn!(destination = %key, error = %e, "failed to create channel pool");
                None
            }
        }
    }

    /// Like [`get_or_create`](Self::get_or_create) but reports why no pool exists
    pub fn try_get_or_create(&self, key: &str) -> Result<Arc<DestinationPool>> {
        if let Some(pool) = self.pool(key) {
            return Ok(pool);
        }

        let endpoints = match self.resolver.endpoints_for_key(key) {
            Some(set) if !set.is_empty() => set,
            _ => {
                debug!(destination = %key, "destination not resolved, no pool created");
                return Err(RoutingError::no_pool(key));
            }
        };

        let mut channels = Vec::with_capacity(self.channels_per_destination);
        for index in 0..self.channels_per_destination {
            let channel = self
                .factory
                .open(key, index, &endpoints)
                .map_err(|source| RoutingError::OpenFailed {
                    key: key.to_string(),
                    index,
                    source,
                })?;
            channels.push(channel);
        }
        let pool = DestinationPool::new(key, channels).ok_or_else(|| RoutingError::no_pool(key))?;

        let mut pools = self.pools.write();
        let pool = pools
            .entry(key.to_string())
            .or_insert_with(|| {
                info!(
                    destination = %key,
                    channels = pool.len(),
                    endpoints = endpoints.len(),
                    "channel pool created"
                );
                Arc::new(pool)
            })
            .clone();
        Ok(pool)
    }

    /// Next channel for `key` in round-robin order
    pub fn select(&self, key: &str) -> Option<Arc<dyn Channel>> {
        self.get_or_create(key).map(|pool| pool.select())
    }

    /// Push `packet` to the next channel for `key`
    ///
    /// The channel's result is returned unchanged.
    pub fn send(&self, key: &str, packet: Arc<WirePacket>) -> Result<()> {
        let channel = self.select(key).ok_or_else(|| RoutingError::no_pool(key))?;
        channel.push(packet)?;
        Ok(())
    }

    /// Create pools for `keys` ahead of the first send
    ///
    /// Returns the number of keys that now have a pool.
    pub fn warm_up<I, K>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        keys.into_iter()
            .filter(|key| {
                let key = key.as_ref();
                let ok = self.get_or_create(key).is_some();
                if !ok {
                    warn!(destination = %key, "destination does not exist, pool not created");
                }
                ok
            })
            .count()
    }

    /// Number of pools
    pub fn pool_count(&self) -> usize {
        self.pools.read().len()
    }

    /// True if a pool exists for `key`
    pub fn contains(&self, key: &str) -> bool {
        self.pools.read().contains_key(key)
    }

    /// Keys with a pool
    pub fn keys(&self) -> Vec<String> {
        self.pools.read().keys().cloned().collect()
    }
}

impl std::fmt::Debug for ChannelRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRouter")
            .field("channels_per_destination", &self.channels_per_destination)
            .field("pools", &self.pool_count())
            .finish()
    }
}
