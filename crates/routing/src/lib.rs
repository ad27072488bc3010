//! Shipper Routing - destination resolution and channel pools
//!
//! Decides where a packet goes:
//! - `DestinationResolver` caches group → cluster → endpoint mappings and
//!   refreshes them in the background
//! - `ChannelRouter` owns one fixed-size `DestinationPool` of channels per
//!   destination key and round-robins across it
//!
//! # Design
//!
//! The destination key for a group is its cluster id once resolved, so
//! groups served by the same cluster share one channel pool. Transport and
//! discovery are external: they plug in through the `Channel`,
//! `ChannelFactory` and `Discovery` traits.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use shipper_routing::{
//!     Channel, ChannelError, ChannelRouter, DestinationResolver, Endpoint, EndpointSet,
//!     MpscChannel, StaticDiscovery,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let discovery = StaticDiscovery::new().with_group(
//!     "g1",
//!     EndpointSet::new(vec![Endpoint::new("10.0.0.1", 46801)]).with_cluster("c1"),
//! );
//! let resolver = Arc::new(DestinationResolver::new(Arc::new(discovery), Duration::from_secs(60)));
//! resolver.watch("g1");
//! resolver.refresh().await;
//!
//! let factory = |key: &str, index: usize, _: &EndpointSet| {
//!     let (channel, _rx) = MpscChannel::pair(format!("{key}-{index}"), 64);
//!     Ok::<Arc<dyn Channel>, ChannelError>(Arc::new(channel))
//! };
//! let router = ChannelRouter::new(resolver.clone(), Arc::new(factory), 2);
//!
//! let key = resolver.group_key("g1");
//! assert_eq!(router.select(&key).unwrap().name(), "c1-0");
//! assert_eq!(router.select(&key).unwrap().name(), "c1-1");
//! # });
//! ```

mod channel;
mod discovery;
mod endpoint;
mod error;
mod mpsc_channel;
mod pool;
mod resolver;
mod router;

#[cfg(test)]
mod router_test;

pub use channel::{Channel, ChannelFactory};
pub use discovery::{Discovery, StaticDiscovery};
pub use endpoint::{Endpoint, EndpointSet};
pub use error::{ChannelError, DiscoveryError, Result, RoutingError};
pub use mpsc_channel::MpscChannel;
pub use pool::DestinationPool;
pub use resolver::{DestinationResolver, RefreshReport};
pub use router::ChannelRouter;
