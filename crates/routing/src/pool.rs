//! Fixed-size channel pool for one destination

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::channel::Channel;

/// Channels serving one destination key
///
/// The pool size is fixed at creation. Selection is round-robin over an
/// atomic cursor, so concurrent callers never lose an increment and the
/// index always stays in range.
pub struct DestinationPool {
    key: String,
    channels: Vec<Arc<dyn Channel>>,
    cursor: AtomicUsize,
}

impl DestinationPool {
    /// Create a pool; returns `None` if `channels` is empty
    pub fn new(key: impl Into<String>, channels: Vec<Arc<dyn Channel>>) -> Option<Self> {
        if channels.is_empty() {
            return None;
        }
        Some(Self {
            key: key.into(),
            channels,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Destination key
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Number of channels (never zero)
    #[inline]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Always false; a pool holds at least one channel
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Next channel in round-robin order
    #[inline]
    pub fn select(&self) -> Arc<dyn Channel> {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.channels.len();
        Arc::clone(&self.channels[idx])
    }

    /// All channels in pool order
    #[inline]
    pub fn channels(&self) -> &[Arc<dyn Channel>] {
        &self.channels
    }

    /// True if at least one channel is available
    pub fn is_available(&self) -> bool {
        self.channels.iter().any(|c| c.is_available())
    }

    /// True if every channel is full
    pub fn is_full(&self) -> bool {
        self.channels.iter().all(|c| c.is_full())
    }
}

impl std::fmt::Debug for DestinationPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.channels.iter().map(|c| c.name()).collect();
        f.debug_struct("DestinationPool")
            .field("key", &self.key)
            .field("channels", &names)
            .finish()
    }
}
