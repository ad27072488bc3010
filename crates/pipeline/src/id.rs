//! Batch and unique id generation

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::time::now_ms;

/// Custom epoch for unique ids (2020-01-01T00:00:00Z)
const ID_EPOCH_MS: u64 = 1_577_836_800_000;

const WORKER_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;

/// Generates the ids stamped into packet headers
///
/// - batch ids are a wrapping `u32` counter (`mid` / `batch_id`)
/// - unique ids are snowflake-style `u64`s (`sid`): milliseconds since a
///   custom epoch, a worker id and a sequence, strictly increasing per
///   generator
#[derive(Debug)]
pub struct IdGenerator {
    worker_id: u64,
    next_batch: AtomicU32,
    last_unique: AtomicU64,
}

impl IdGenerator {
    /// Create a generator; only the low 10 bits of `worker_id` are used
    pub fn new(worker_id: u16) -> Self {
        Self {
            worker_id: u64::from(worker_id) & ((1 << WORKER_BITS) - 1),
            next_batch: AtomicU32::new(1),
            last_unique: AtomicU64::new(0),
        }
    }

    /// Worker id derived from the last octet of an IPv4 address, 0 otherwise
    pub fn worker_id_for(ip: &str) -> u16 {
        ip.parse::<std::net::Ipv4Addr>()
            .map(|addr| u16::from(addr.octets()[3]))
            .unwrap_or(0)
    }

    /// Next batch id
    #[inline]
    pub fn next_batch_id(&self) -> u32 {
        self.next_batch.fetch_add(1, Ordering::Relaxed)
    }

    /// Next unique id
    pub fn next_unique_id(&self) -> u64 {
        let candidate = (now_ms().saturating_sub(ID_EPOCH_MS) << (WORKER_BITS + SEQUENCE_BITS))
            | (self.worker_id << SEQUENCE_BITS);
        let prev = match self
            .last_unique
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| {
                Some(candidate.max(last.wrapping_add(1)))
            }) {
            Ok(prev) | Err(prev) => prev,
        };
        candidate.max(prev.wrapping_add(1))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(0)
    }
}
