//! Tests for ChannelRouter and DestinationPool

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use shipper_protocol::{Bytes, Record, WirePacket};

use crate::{
    Channel, ChannelError, ChannelRouter, DestinationPool, DestinationResolver, Endpoint,
    EndpointSet, RoutingError, StaticDiscovery,
};

// =============================================================================
// Test helpers
// =============================================================================

/// Channel that records how many packets it accepted
struct CountingChannel {
    name: String,
    pushed: AtomicUsize,
    available: AtomicBool,
    full: AtomicBool,
}

impl CountingChannel {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pushed: AtomicUsize::new(0),
            available: AtomicBool::new(true),
            full: AtomicBool::new(false),
        }
    }
}

impl Channel for CountingChannel {
    fn push(&self, _packet: Arc<WirePacket>) -> Result<(), ChannelError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(ChannelError::unavailable(&self.name));
        }
        if self.full.load(Ordering::SeqCst) {
            return Err(ChannelError::full(&self.name));
        }
        self.pushed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn is_full(&self) -> bool {
        self.full.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Factory keeping every channel it opened so tests can inspect them
#[derive(Default)]
struct Opened {
    channels: Mutex<HashMap<String, Arc<CountingChannel>>>,
    opens: AtomicUsize,
}

fn router_with(groups: &[(&str, Option<&str>)], per_destination: usize) -> (ChannelRouter, Arc<Opened>) {
    let mut discovery = StaticDiscovery::new();
    for (group, cluster) in groups {
        let mut set = EndpointSet::new(vec![Endpoint::new("10.0.0.1", 46801)]);
        if let Some(c) = cluster {
            set = set.with_cluster(*c);
        }
        discovery = discovery.with_group(*group, set);
    }

    let resolver = Arc::new(DestinationResolver::new(Arc::new(discovery), Duration::from_secs(60)));
    for (group, _) in groups {
        resolver.watch(group);
    }
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(resolver.refresh());

    let opened = Arc::new(Opened::default());
    let factory = {
        let opened = opened.clone();
        move |key: &str, index: usize, _: &EndpointSet| -> Result<Arc<dyn Channel>, ChannelError> {
            opened.opens.fetch_add(1, Ordering::SeqCst);
            let channel = Arc::new(CountingChannel::new(format!("{key}-{index}")));
            opened
                .channels
                .lock()
                .insert(channel.name.clone(), channel.clone());
            Ok(channel as Arc<dyn Channel>)
        }
    };

    (ChannelRouter::new(resolver, Arc::new(factory), per_destination), opened)
}

fn packet() -> Arc<WirePacket> {
    let record = Record::builder(&b"x"[..], "g1", "s1").build();
    Arc::new(WirePacket::new(Bytes::from_static(b"pkt"), 1, vec![record]))
}

// =============================================================================
// Pool creation
// =============================================================================

#[test]
fn test_pool_created_lazily_for_known_destination() {
    let (router, opened) = router_with(&[("g1", Some("c1"))], 3);
    assert_eq!(router.pool_count(), 0);

    let pool = router.get_or_create("c1").unwrap();
    assert_eq!(pool.len(), 3);
    assert_eq!(pool.key(), "c1");
    assert!(router.contains("c1"));
    assert_eq!(opened.opens.load(Ordering::SeqCst), 3);

    // Second lookup reuses the pool
    let again = router.get_or_create("c1").unwrap();
    assert!(Arc::ptr_eq(&pool, &again));
    assert_eq!(opened.opens.load(Ordering::SeqCst), 3);
}

#[test]
fn test_unknown_destination_has_no_pool() {
    let (router, opened) = router_with(&[("g1", Some("c1"))], 2);

    assert!(router.get_or_create("nope").is_none());
    assert!(router.select("nope").is_none());
    assert!(matches!(
        router.try_get_or_create("nope"),
        Err(RoutingError::NoPool { .. })
    ));
    assert_eq!(router.pool_count(), 0);
    assert_eq!(opened.opens.load(Ordering::SeqCst), 0);
}

#[test]
fn test_group_without_cluster_uses_group_key() {
    let (router, _) = router_with(&[("g1", None)], 1);
    let key = router.resolver().group_key("g1");
    assert_eq!(key, "g1");
    assert!(router.get_or_create(&key).is_some());
}

#[test]
fn test_zero_channels_treated_as_one() {
    let (router, _) = router_with(&[("g1", Some("c1"))], 0);
    assert_eq!(router.channels_per_destination(), 1);
    assert_eq!(router.get_or_create("c1").unwrap().len(), 1);
}

#[test]
fn test_factory_failure_creates_no_pool() {
    let discovery = StaticDiscovery::new().with_group(
        "g1",
        EndpointSet::new(vec![Endpoint::new("h", 1)]).with_cluster("c1"),
    );
    let resolver = Arc::new(DestinationResolver::new(Arc::new(discovery), Duration::from_secs(60)));
    resolver.watch("g1");
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(resolver.refresh());

    let factory = |_: &str, index: usize, _: &EndpointSet| -> Result<Arc<dyn Channel>, ChannelError> {
        if index == 1 {
            return Err(ChannelError::transport("connection refused"));
        }
        Ok(Arc::new(CountingChannel::new("ok")))
    };
    let router = ChannelRouter::new(resolver, Arc::new(factory), 2);

    assert!(matches!(
        router.try_get_or_create("c1"),
        Err(RoutingError::OpenFailed { index: 1, .. })
    ));
    assert!(router.get_or_create("c1").is_none());
    assert!(!router.contains("c1"));
}

#[test]
fn test_warm_up_counts_created_pools() {
    let (router, _) = router_with(&[("g1", Some("c1")), ("g2", Some("c2"))], 2);
    let created = router.warm_up(["c1", "c2", "missing"]);
    assert_eq!(created, 2);
    assert_eq!(router.pool_count(), 2);

    let mut keys = router.keys();
    keys.sort();
    assert_eq!(keys, vec!["c1", "c2"]);
}

// =============================================================================
// Selection
// =============================================================================

#[test]
fn test_select_cycles_through_all_channels() {
    let (router, _) = router_with(&[("g1", Some("c1"))], 4);

    let names: Vec<String> = (0..8)
        .map(|_| router.select("c1").unwrap().name().to_string())
        .collect();
    assert_eq!(
        names,
        vec!["c1-0", "c1-1", "c1-2", "c1-3", "c1-0", "c1-1", "c1-2", "c1-3"]
    );
}

#[test]
fn test_concurrent_select_spreads_evenly() {
    let (router, opened) = router_with(&[("g1", Some("c1"))], 4);
    let router = Arc::new(router);
    router.warm_up(["c1"]);

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let router = router.clone();
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    router.send("c1", packet()).unwrap();
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    let channels = opened.channels.lock();
    assert_eq!(channels.len(), 4);
    for channel in channels.values() {
        assert_eq!(channel.pushed.load(Ordering::SeqCst), 2000);
    }
}

#[test]
fn test_send_surfaces_channel_error() {
    let (router, opened) = router_with(&[("g1", Some("c1"))], 1);
    router.send("c1", packet()).unwrap();

    opened.channels.lock()["c1-0"].full.store(true, Ordering::SeqCst);
    let err = router.send("c1", packet()).unwrap_err();
    assert!(matches!(err, RoutingError::Channel(ChannelError::Full { .. })));

    assert!(matches!(
        router.send("unknown", packet()),
        Err(RoutingError::NoPool { .. })
    ));
}

#[test]
fn test_pool_availability() {
    let a = Arc::new(CountingChannel::new("a"));
    let b = Arc::new(CountingChannel::new("b"));
    let channels: Vec<Arc<dyn Channel>> = vec![a.clone() as Arc<dyn Channel>, b.clone()];
    let pool = DestinationPool::new("k", channels).unwrap();

    assert!(pool.is_available());
    assert!(!pool.is_full());

    a.available.store(false, Ordering::SeqCst);
    assert!(pool.is_available());
    b.available.store(false, Ordering::SeqCst);
    assert!(!pool.is_available());

    a.full.store(true, Ordering::SeqCst);
    assert!(!pool.is_full());
    b.full.store(true, Ordering::SeqCst);
    assert!(pool.is_full());

    assert!(DestinationPool::new("k", Vec::new()).is_none());
}
