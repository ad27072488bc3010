//! Receive buffer - per-destination queue, batch cut and pack
//!
//! # Design
//!
//! - One `parking_lot::Mutex` guards the queue, byte accounting, last-flush
//!   instant and the packer (with its scratch buffer), so `submit` and
//!   `flush` on one destination are serialized while destinations are
//!   independent
//! - `submit` never blocks on I/O and fails fast with `BufferFull`
//! - `flush` picks one channel, checks it, then drains greedily into
//!   (group, stream) sub-batches and pushes one packet per sub-batch
//! - Failure callbacks run after the lock is released

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};
use shipper_protocol::{
    ATTR_LENGTH, LOOPBACK_IP, MessageType, PacketHeader, Packer, Record, StreamKey, WirePacket,
};
use shipper_routing::{Channel, ChannelRouter};
use tracing::{debug, trace, warn};

use crate::context::SdkContext;
use crate::error::{BufferError, Result};
use crate::metrics::{BufferMetrics, MetricsSnapshot, RejectionTracker};
use crate::request::SendRequest;
use crate::time;

/// Outcome of one flush
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Records moved out of the queue
    pub drained: usize,
    /// Packets accepted by the channel
    pub packets_sent: usize,
    /// Packets dropped after a pack or push failure
    pub packets_failed: usize,
    /// Records still queued after the flush
    pub remaining: usize,
    /// One error per failed packet
    pub errors: Vec<BufferError>,
}

impl FlushReport {
    /// True if every packet reached the channel
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.packets_failed == 0
    }
}

/// Records of one (group, stream) key drained in one flush
#[derive(Debug)]
pub(crate) struct SubBatch {
    pub records: Vec<Record>,
    /// Accounted bytes: payloads plus `ATTR_LENGTH` per record
    pub bytes: usize,
}

/// Result of draining the queue
#[derive(Debug, Default)]
pub(crate) struct Drained {
    /// Sub-batches in first-seen key order
    pub batches: Vec<SubBatch>,
    pub records: usize,
    pub bytes: usize,
}

/// Drain `queue` into sub-batches until admitting the next record would push
/// the largest per-key running size above `pack_size`, or its key's
/// sub-batch already holds `max_records`
///
/// The first record is always admitted, so every call makes progress on a
/// non-empty queue.
pub(crate) fn drain(queue: &mut VecDeque<Record>, pack_size: usize, max_records: usize) -> Drained {
    let mut drained = Drained::default();
    let mut index: HashMap<StreamKey, usize> = HashMap::new();
    let mut max_running = 0usize;

    while let Some(front) = queue.front() {
        let size = front.size();
        if size + max_running + ATTR_LENGTH > pack_size && !drained.batches.is_empty() {
            break;
        }
        let key_full = index
            .get(front.key())
            .is_some_and(|&slot| drained.batches[slot].records.len() >= max_records);
        if key_full {
            break;
        }
        let Some(record) = queue.pop_front() else {
            break;
        };

        let slot = *index.entry(record.key().clone()).or_insert_with(|| {
            drained.batches.push(SubBatch {
                records: Vec::new(),
                bytes: 0,
            });
            drained.batches.len() - 1
        });
        let batch = &mut drained.batches[slot];
        batch.bytes += size + ATTR_LENGTH;
        batch.records.push(record);
        max_running = max_running.max(batch.bytes);

        drained.records += 1;
        drained.bytes += size + ATTR_LENGTH;
    }
    drained
}

struct BufferState {
    queue: VecDeque<Record>,
    buffered_bytes: usize,
    last_flush: Instant,
    packer: Packer,
}

/// A sub-batch that did not reach a channel
enum Undelivered {
    /// Packing failed; the records never became a packet
    Unpacked(Vec<Record>),
    /// The channel rejected the packet
    Rejected(Arc<WirePacket>),
}

impl Undelivered {
    /// Invoke every record's failure callback; returns how many fired
    fn report(&self) -> usize {
        match self {
            Self::Unpacked(records) => records.iter().filter(|r| r.report_failure()).count(),
            Self::Rejected(packet) => packet.report_failure(),
        }
    }

    fn record_count(&self) -> usize {
        match self {
            Self::Unpacked(records) => records.len(),
            Self::Rejected(packet) => packet.record_count(),
        }
    }
}

/// Per-destination receive buffer
///
/// # Example
///
/// ```ignore
/// let buffer = ReceiveBuffer::new("cluster-a", context, router);
/// buffer.submit(SendRequest::new(&b"payload"[..], "g1", "s1"))?;
///
/// // Called periodically by the dispatch task
/// if let Some(report) = buffer.maybe_flush(Instant::now())? {
///     println!("sent {} packets", report.packets_sent);
/// }
/// ```
pub struct ReceiveBuffer {
    key: String,
    context: Arc<SdkContext>,
    router: Arc<ChannelRouter>,
    state: Mutex<BufferState>,
    metrics: BufferMetrics,
    rejections: RejectionTracker,
}

impl ReceiveBuffer {
    /// Create a buffer for destination `key`
    ///
    /// The pack scratch buffer is sized once here to
    /// `max(max_message_size, pack_size) + PACK_MARGIN`.
    pub fn new(
        key: impl Into<String>,
        context: Arc<SdkContext>,
        router: Arc<ChannelRouter>,
    ) -> Self {
        let packer = Packer::new(context.pack_settings(), context.scratch_capacity());
        Self {
            key: key.into(),
            context,
            router,
            state: Mutex::new(BufferState {
                queue: VecDeque::new(),
                buffered_bytes: 0,
                last_flush: Instant::now(),
                packer,
            }),
            metrics: BufferMetrics::new(),
            rejections: RejectionTracker::new(),
        }
    }

    /// Destination key
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Bytes currently counted against capacity
    pub fn buffered_bytes(&self) -> usize {
        self.state.lock().buffered_bytes
    }

    /// Records currently queued
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// True if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    /// Metrics snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // =========================================================================
    // Submit
    // =========================================================================

    /// Queue a record
    ///
    /// Fails with `BufferFull`, leaving the buffer unchanged, if the payload
    /// would take buffered bytes past `max_buffer_bytes`. The callback is not
    /// invoked on this path.
    pub fn submit(&self, request: SendRequest) -> Result<()> {
        let capacity = self.context.config().sdk.max_buffer_bytes;
        let size = request.payload.len();
        let record = self.build_record(request);

        let mut state = self.state.lock();
        if state.buffered_bytes + size > capacity {
            let buffered = state.buffered_bytes;
            drop(state);
            self.metrics.record_rejected();
            self.rejections.record(&self.key, size as u64);
            return Err(BufferError::BufferFull {
                key: self.key.clone(),
                buffered,
                size,
                capacity,
            });
        }
        state.buffered_bytes += size + ATTR_LENGTH;
        state.queue.push_back(record);
        drop(state);

        self.metrics.record_submitted(size as u64);
        Ok(())
    }

    fn build_record(&self, request: SendRequest) -> Record {
        let data_time_ms = time::normalize_report_time(request.report_time_ms, time::now_ms());
        let client_ip = if request.client_ip.is_empty() {
            LOOPBACK_IP
        } else {
            request.client_ip.as_str()
        };
        let pack_attr = time::pack_attr(data_time_ms, client_ip);
        let client_ip = client_ip.to_string();

        Record::builder(request.payload, request.group_id, request.stream_id)
            .client_ip(client_ip)
            .data_time_ms(data_time_ms)
            .pack_attr(pack_attr)
            .user_client_ip(request.client_ip)
            .user_report_time_ms(request.report_time_ms)
            .maybe_callback(request.callback)
            .build()
    }

    // =========================================================================
    // Flush
    // =========================================================================

    /// Flush if the buffer is over the pack-size threshold or the pack
    /// timeout has elapsed since the last flush
    ///
    /// Returns `Ok(None)` when nothing is due.
    pub fn maybe_flush(&self, now: Instant) -> Result<Option<FlushReport>> {
        let sdk = &self.context.config().sdk;
        let state = self.state.lock();
        if state.queue.is_empty() || state.buffered_bytes <= ATTR_LENGTH {
            return Ok(None);
        }

        let over_size = state.buffered_bytes > sdk.pack_size;
        let timed_out = now.saturating_duration_since(state.last_flush) > sdk.pack_timeout;
        if !over_size && !timed_out {
            return Ok(None);
        }

        trace!(
            destination = %self.key,
            buffered_bytes = state.buffered_bytes,
            over_size,
            timed_out,
            "flush due"
        );
        self.flush_locked(state).map(Some)
    }

    /// Drain, pack and send queued records
    ///
    /// Routing errors are returned before anything is drained. Once records
    /// are drained they are never requeued: packets that fail to pack or
    /// push are counted in the report and their records' callbacks fire.
    pub fn flush(&self) -> Result<FlushReport> {
        let state = self.state.lock();
        self.flush_locked(state)
    }

    fn flush_locked(&self, mut state: MutexGuard<'_, BufferState>) -> Result<FlushReport> {
        state.last_flush = Instant::now();

        if self.key.is_empty() {
            return Err(BufferError::InvalidDestination);
        }
        if state.queue.is_empty() {
            return Err(BufferError::NothingToSend {
                key: self.key.clone(),
            });
        }

        let channel = match self.acquire_channel() {
            Ok(channel) => channel,
            Err(e) => {
                drop(state);
                self.metrics.record_routing_failure();
                debug!(destination = %self.key, error = %e, "flush deferred");
                return Err(e);
            }
        };

        let pack_size = self.context.config().sdk.pack_size;
        let max_records = MessageType::new(self.context.config().sdk.msg_type).max_records();
        let inner = &mut *state;
        let drained = drain(&mut inner.queue, pack_size, max_records);
        inner.buffered_bytes = inner.buffered_bytes.saturating_sub(drained.bytes);

        let mut report = FlushReport {
            drained: drained.records,
            ..FlushReport::default()
        };
        let mut undelivered = Vec::new();

        for batch in drained.batches {
            match self.pack(&mut inner.packer, batch.records) {
                Ok(packet) => {
                    let packet = Arc::new(packet);
                    let bytes = packet.len() as u64;
                    match channel.push(Arc::clone(&packet)) {
                        Ok(()) => {
                            report.packets_sent += 1;
                            self.metrics.record_packet_sent(bytes);
                        }
                        Err(e) => {
                            report
                                .errors
                                .push(BufferError::from_channel(self.key.as_str(), e));
                            undelivered.push(Undelivered::Rejected(packet));
                        }
                    }
                }
                Err((records, e)) => {
                    report.errors.push(e);
                    undelivered.push(Undelivered::Unpacked(records));
                }
            }
        }
        report.remaining = inner.queue.len();
        report.packets_failed = undelivered.len();

        // Callbacks may call back into this buffer
        drop(state);

        self.metrics.record_flush(report.drained as u64);
        for (failed, error) in undelivered.iter().zip(&report.errors) {
            warn!(
                destination = %self.key,
                records = failed.record_count(),
                error = %error,
                "packet dropped"
            );
            let fired = failed.report();
            self.metrics.record_packet_failed(fired as u64);
        }

        debug!(
            destination = %self.key,
            channel = channel.name(),
            drained = report.drained,
            packets_sent = report.packets_sent,
            packets_failed = report.packets_failed,
            remaining = report.remaining,
            "flush complete"
        );
        Ok(report)
    }

    /// One channel for the whole flush, checked before anything is drained
    fn acquire_channel(&self) -> Result<Arc<dyn Channel>> {
        let channel = self
            .router
            .select(&self.key)
            .ok_or_else(|| BufferError::NoChannel {
                key: self.key.clone(),
            })?;
        if !channel.is_available() {
            return Err(BufferError::ChannelUnavailable {
                key: self.key.clone(),
            });
        }
        if channel.is_full() {
            return Err(BufferError::ChannelFull {
                key: self.key.clone(),
            });
        }
        Ok(channel)
    }

    /// Pack one sub-batch; on failure the records are handed back
    ///
    /// Header time and numeric ids come from the newest record.
    fn pack(
        &self,
        packer: &mut Packer,
        records: Vec<Record>,
    ) -> std::result::Result<WirePacket, (Vec<Record>, BufferError)> {
        let sdk = &self.context.config().sdk;
        let ids = self.context.ids();
        let newest = records.last();
        let header = PacketHeader {
            numeric_ids: newest.and_then(|r| sdk.numeric_ids_for(r.group_id(), r.stream_id())),
            data_time_ms: newest.map_or(0, Record::data_time_ms),
            batch_id: ids.next_batch_id(),
            unique_id: ids.next_unique_id().to_string(),
            now_ms: time::now_ms(),
        };

        match packer.pack(&records, &header) {
            Ok(bytes) => Ok(WirePacket::new(bytes, header.batch_id, records)),
            Err(source) => Err((
                records,
                BufferError::SerializationFailed {
                    key: self.key.clone(),
                    source,
                },
            )),
        }
    }

    /// Flush until the queue is empty, a flush fails, or `max_rounds` is hit
    ///
    /// Used at shutdown. Returns the number of records drained.
    pub fn drain_all(&self, max_rounds: usize) -> usize {
        let mut drained = 0;
        for _ in 0..max_rounds {
            match self.flush() {
                Ok(report) => {
                    drained += report.drained;
                    if report.remaining == 0 {
                        break;
                    }
                }
                Err(BufferError::NothingToSend { .. }) => break,
                Err(e) => {
                    warn!(destination = %self.key, error = %e, "final drain stopped");
                    break;
                }
            }
        }
        drained
    }

    /// Remove every queued record and invoke its failure callback
    ///
    /// Used at shutdown for records that could not be flushed. Returns the
    /// number of records discarded.
    pub fn abandon(&self) -> usize {
        let records: Vec<Record> = {
            let mut state = self.state.lock();
            state.buffered_bytes = 0;
            state.queue.drain(..).collect()
        };
        let fired = records.iter().filter(|r| r.report_failure()).count();
        if !records.is_empty() {
            warn!(
                destination = %self.key,
                records = records.len(),
                callbacks = fired,
                "discarded undeliverable records"
            );
            self.metrics.record_discarded(fired as u64);
        }
        records.len()
    }
}

impl std::fmt::Debug for ReceiveBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ReceiveBuffer")
            .field("key", &self.key)
            .field("queued", &state.queue.len())
            .field("buffered_bytes", &state.buffered_bytes)
            .finish()
    }
}
