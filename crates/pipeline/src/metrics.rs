//! Receive buffer metrics
//!
//! Atomic counters for tracking buffer throughput and delivery failures.
//! All operations use relaxed ordering.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Metrics for one receive buffer
///
/// Counters are eventually consistent, not real-time.
#[derive(Debug, Default)]
pub struct BufferMetrics {
    /// Records accepted by `submit`
    records_submitted: AtomicU64,

    /// Payload bytes accepted by `submit`
    bytes_submitted: AtomicU64,

    /// Records rejected because the buffer was full
    records_rejected: AtomicU64,

    /// Flushes that drained at least one record
    flushes: AtomicU64,

    /// Records moved from the queue into sub-batches
    records_drained: AtomicU64,

    /// Packets accepted by a channel
    packets_sent: AtomicU64,

    /// Wire bytes accepted by a channel
    bytes_sent: AtomicU64,

    /// Packets that failed to pack or were rejected by a channel
    packets_failed: AtomicU64,

    /// Records whose failure callback was invoked
    records_failed: AtomicU64,

    /// Flushes skipped because no usable channel was available
    routing_failures: AtomicU64,
}

impl BufferMetrics {
    /// Create new metrics with all counters at zero
    #[inline]
    pub const fn new() -> Self {
        Self {
            records_submitted: AtomicU64::new(0),
            bytes_submitted: AtomicU64::new(0),
            records_rejected: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            records_drained: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            packets_failed: AtomicU64::new(0),
            records_failed: AtomicU64::new(0),
            routing_failures: AtomicU64::new(0),
        }
    }

    /// Record an accepted submission
    #[inline]
    pub fn record_submitted(&self, bytes: u64) {
        self.records_submitted.fetch_add(1, Ordering::Relaxed);
        self.bytes_submitted.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a submission rejected with `BufferFull`
    #[inline]
    pub fn record_rejected(&self) {
        self.records_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a flush that drained `records` records
    #[inline]
    pub fn record_flush(&self, records: u64) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.records_drained.fetch_add(records, Ordering::Relaxed);
    }

    /// Record a packet accepted by a channel
    #[inline]
    pub fn record_packet_sent(&self, bytes: u64) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a packet that was dropped, and how many callbacks it fired
    #[inline]
    pub fn record_packet_failed(&self, records: u64) {
        self.packets_failed.fetch_add(1, Ordering::Relaxed);
        self.records_failed.fetch_add(records, Ordering::Relaxed);
    }

    /// Record callbacks fired for records discarded without a packet
    #[inline]
    pub fn record_discarded(&self, records: u64) {
        self.records_failed.fetch_add(records, Ordering::Relaxed);
    }

    /// Record a flush aborted by a routing error
    #[inline]
    pub fn record_routing_failure(&self) {
        self.routing_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_submitted: self.records_submitted.load(Ordering::Relaxed),
            bytes_submitted: self.bytes_submitted.load(Ordering::Relaxed),
            records_rejected: self.records_rejected.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            records_drained: self.records_drained.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            packets_failed: self.packets_failed.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
            routing_failures: self.routing_failures.load(Ordering::Relaxed),
        }
    }

    /// Packets accepted by a channel
    #[inline]
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }

    /// Records rejected with `BufferFull`
    #[inline]
    pub fn records_rejected(&self) -> u64 {
        self.records_rejected.load(Ordering::Relaxed)
    }
}

/// Point-in-time snapshot of buffer metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub records_submitted: u64,
    pub bytes_submitted: u64,
    pub records_rejected: u64,
    pub flushes: u64,
    pub records_drained: u64,
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub packets_failed: u64,
    pub records_failed: u64,
    pub routing_failures: u64,
}

impl MetricsSnapshot {
    /// Fraction of packets accepted by a channel (0.0 - 1.0)
    ///
    /// Returns None if no packet has been produced.
    #[inline]
    pub fn send_success_rate(&self) -> Option<f64> {
        let total = self.packets_sent + self.packets_failed;
        if total == 0 {
            None
        } else {
            Some(self.packets_sent as f64 / total as f64)
        }
    }

    /// Sum of two snapshots, for aggregating across buffers
    #[must_use]
    pub fn merge(&self, other: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            records_submitted: self.records_submitted + other.records_submitted,
            bytes_submitted: self.bytes_submitted + other.bytes_submitted,
            records_rejected: self.records_rejected + other.records_rejected,
            flushes: self.flushes + other.flushes,
            records_drained: self.records_drained + other.records_drained,
            packets_sent: self.packets_sent + other.packets_sent,
            bytes_sent: self.bytes_sent + other.bytes_sent,
            packets_failed: self.packets_failed + other.packets_failed,
            records_failed: self.records_failed + other.records_failed,
            routing_failures: self.routing_failures + other.routing_failures,
        }
    }

    /// Difference from an earlier snapshot
    #[must_use]
    pub fn diff(&self, previous: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            records_submitted: self
                .records_submitted
                .saturating_sub(previous.records_submitted),
            bytes_submitted: self.bytes_submitted.saturating_sub(previous.bytes_submitted),
            records_rejected: self
                .records_rejected
                .saturating_sub(previous.records_rejected),
            flushes: self.flushes.saturating_sub(previous.flushes),
            records_drained: self.records_drained.saturating_sub(previous.records_drained),
            packets_sent: self.packets_sent.saturating_sub(previous.packets_sent),
            bytes_sent: self.bytes_sent.saturating_sub(previous.bytes_sent),
            packets_failed: self.packets_failed.saturating_sub(previous.packets_failed),
            records_failed: self.records_failed.saturating_sub(previous.records_failed),
            routing_failures: self
                .routing_failures
                .saturating_sub(previous.routing_failures),
        }
    }
}

// ============================================================================
// Rejection Tracker - rate-limited logging for BufferFull
// ============================================================================

/// Rate-limited logging of `BufferFull` rejections
///
/// Aggregates rejections and logs a summary at most once per second instead
/// of one line per rejected record.
///
/// - >0 rejections/sec: WARN level
/// - >1000 rejections/sec: ERROR level
pub struct RejectionTracker {
    /// Rejections in current interval
    interval_rejections: AtomicU64,
    /// Payload bytes rejected in current interval
    interval_bytes: AtomicU64,
    /// Last log time (epoch milliseconds)
    last_log_ms: AtomicU64,
}

/// Log interval in milliseconds
const LOG_INTERVAL_MS: u64 = 1000;
/// Rejections/sec that triggers ERROR level
const CRITICAL_REJECT_THRESHOLD: u64 = 1000;

impl RejectionTracker {
    /// Create a new tracker
    pub fn new() -> Self {
        Self {
            interval_rejections: AtomicU64::new(0),
            interval_bytes: AtomicU64::new(0),
            last_log_ms: AtomicU64::new(Self::now_ms()),
        }
    }

    /// Record a rejection; returns true if a summary was logged
    pub fn record(&self, destination: &str, bytes: u64) -> bool {
        self.interval_rejections.fetch_add(1, Ordering::Relaxed);
        self.interval_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.maybe_log(destination)
    }

    fn maybe_log(&self, destination: &str) -> bool {
        let now = Self::now_ms();
        let last = self.last_log_ms.load(Ordering::Relaxed);

        if now.saturating_sub(last) < LOG_INTERVAL_MS {
            return false;
        }

        // Claim the log slot so concurrent callers do not log twice
        if self
            .last_log_ms
            .compare_exchange(last, now, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }

        let rejections = self.interval_rejections.swap(0, Ordering::Relaxed);
        let bytes = self.interval_bytes.swap(0, Ordering::Relaxed);
        if rejections == 0 {
            return false;
        }

        if rejections > CRITICAL_REJECT_THRESHOLD {
            tracing::error!(
                destination = %destination,
                rejected_records = rejections,
                rejected_bytes = bytes,
                threshold = CRITICAL_REJECT_THRESHOLD,
                "receive buffer saturated, channels cannot keep up"
            );
        } else {
            tracing::warn!(
                destination = %destination,
                rejected_records = rejections,
                rejected_bytes = bytes,
                "receive buffer full, records rejected in last second"
            );
        }
        true
    }

    #[inline]
    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Rejections counted since the last summary
    #[cfg(test)]
    pub fn pending(&self) -> u64 {
        self.interval_rejections.load(Ordering::Relaxed)
    }
}

impl Default for RejectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RejectionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RejectionTracker")
            .field(
                "interval_rejections",
                &self.interval_rejections.load(Ordering::Relaxed),
            )
            .finish()
    }
}
