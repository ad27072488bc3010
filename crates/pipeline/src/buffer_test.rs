//! Receive buffer tests
//!
//! Accounting, flush triggers, the greedy drain, routing failures and
//! failure callbacks.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use shipper_config::Config;
use shipper_protocol::{ATTR_LENGTH, FailedRecord, Record, RecordCallback, WirePacket, decode_packet};
use shipper_routing::{
    Channel, ChannelError, ChannelRouter, DestinationResolver, Endpoint, EndpointSet,
    StaticDiscovery,
};

use crate::buffer::drain;
use crate::{BufferError, ReceiveBuffer, SdkContext, SendRequest};

// =============================================================================
// Test helpers
// =============================================================================

/// Channel that keeps every packet it accepts
#[derive(Default)]
struct RecordingChannel {
    packets: Mutex<Vec<Arc<WirePacket>>>,
    unavailable: AtomicBool,
    full: AtomicBool,
    reject: AtomicBool,
}

impl RecordingChannel {
    fn packets(&self) -> Vec<Arc<WirePacket>> {
        self.packets.lock().clone()
    }
}

impl Channel for RecordingChannel {
    fn push(&self, packet: Arc<WirePacket>) -> Result<(), ChannelError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(ChannelError::transport("connection reset"));
        }
        self.packets.lock().push(packet);
        Ok(())
    }

    fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }

    fn is_full(&self) -> bool {
        self.full.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Buffer for destination "c1" (group "g1" resolves to it) and its channel
fn setup(config: Config) -> (ReceiveBuffer, Arc<RecordingChannel>) {
    setup_with_key("c1", config)
}

fn setup_with_key(key: &str, config: Config) -> (ReceiveBuffer, Arc<RecordingChannel>) {
    let discovery = StaticDiscovery::new().with_group(
        "g1",
        EndpointSet::new(vec![Endpoint::new("10.0.0.1", 46801)]).with_cluster("c1"),
    );
    let resolver = Arc::new(DestinationResolver::new(
        Arc::new(discovery),
        Duration::from_secs(60),
    ));
    resolver.watch("g1");
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(resolver.refresh());

    let channel = Arc::new(RecordingChannel::default());
    let factory = {
        let channel = channel.clone();
        move |_: &str, _: usize, _: &EndpointSet| -> Result<Arc<dyn Channel>, ChannelError> {
            Ok(channel.clone() as Arc<dyn Channel>)
        }
    };
    let router = Arc::new(ChannelRouter::new(resolver, Arc::new(factory), 1));
    let context = Arc::new(SdkContext::new(Arc::new(config)));
    (ReceiveBuffer::new(key, context, router), channel)
}

fn config(pack_size: usize) -> Config {
    let mut config = Config::default();
    config.sdk.pack_size = pack_size;
    config.sdk.max_buffer_bytes = 1024 * 1024;
    config.sdk.pack_timeout = Duration::from_secs(3600);
    config
}

fn request(payload: &[u8], group: &str, stream: &str) -> SendRequest {
    SendRequest::new(payload.to_vec(), group, stream)
}

/// Callback that records what it was told
fn capture() -> (RecordCallback, Arc<Mutex<Vec<(String, Vec<u8>, u64, String)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback: RecordCallback = Arc::new(move |failed: &FailedRecord<'_>| {
        sink.lock().push((
            failed.group_id.to_string(),
            failed.payload.to_vec(),
            failed.report_time_ms,
            failed.client_ip.to_string(),
        ));
    });
    (callback, seen)
}

fn payloads(packets: &[Arc<WirePacket>]) -> Vec<Vec<u8>> {
    packets
        .iter()
        .flat_map(|p| p.records().iter().map(|r| r.payload().to_vec()))
        .collect()
}

// =============================================================================
// Submit and accounting
// =============================================================================

#[test]
fn test_accounting_sums_payload_plus_overhead() {
    let (buffer, _) = setup(config(1 << 20));
    for size in [5usize, 10, 15] {
        buffer.submit(request(&vec![b'x'; size], "g1", "s1")).unwrap();
    }
    assert_eq!(buffer.buffered_bytes(), 30 + 3 * ATTR_LENGTH);
    assert_eq!(buffer.len(), 3);
    assert_eq!(buffer.metrics().records_submitted, 3);
}

#[test]
fn test_buffer_full_rejects_without_mutation() {
    let mut cfg = config(1 << 20);
    cfg.sdk.max_buffer_bytes = 100;
    let (buffer, _) = setup(cfg);

    buffer.submit(request(&[b'a'; 50], "g1", "s1")).unwrap();
    assert_eq!(buffer.buffered_bytes(), 50 + ATTR_LENGTH);

    // 60 + 40 == 100 is still accepted: only the payload is checked
    buffer.submit(request(&[b'b'; 40], "g1", "s1")).unwrap();
    assert_eq!(buffer.buffered_bytes(), 90 + 2 * ATTR_LENGTH);

    let err = buffer.submit(request(&[b'c'; 1], "g1", "s1")).unwrap_err();
    assert!(matches!(err, BufferError::BufferFull { capacity: 100, .. }));
    assert!(err.is_retryable());
    assert_eq!(buffer.buffered_bytes(), 90 + 2 * ATTR_LENGTH);
    assert_eq!(buffer.len(), 2);
    assert_eq!(buffer.metrics().records_rejected, 1);
}

#[test]
fn test_buffer_full_does_not_invoke_callback() {
    let mut cfg = config(1 << 20);
    cfg.sdk.max_buffer_bytes = 4;
    let (buffer, _) = setup(cfg);
    let (callback, seen) = capture();

    let result = buffer.submit(request(b"too big", "g1", "s1").with_callback(callback));
    assert!(result.is_err());
    assert!(seen.lock().is_empty());
}

#[test]
fn test_submit_defaults_ip_and_time() {
    let (buffer, channel) = setup(config(1 << 20));
    buffer.submit(request(b"a", "g1", "s1")).unwrap();
    buffer
        .submit(
            request(b"b", "g1", "s1")
                .with_client_ip("10.9.8.7")
                .with_report_time_ms(1_600_000_000_000),
        )
        .unwrap();
    buffer.flush().unwrap();

    let packets = channel.packets();
    let records = packets[0].records();
    assert_eq!(records[0].client_ip(), "127.0.0.1");
    assert_eq!(records[0].user_client_ip(), "");
    assert_eq!(records[0].user_report_time_ms(), 0);
    assert!(records[0].data_time_ms() > 1_600_000_000_000);
    assert!(records[0].pack_attr().ends_with("&__addcol2__ip=127.0.0.1"));

    assert_eq!(records[1].client_ip(), "10.9.8.7");
    assert_eq!(records[1].data_time_ms(), 1_600_000_000_000);
    assert!(records[1].pack_attr().starts_with("__addcol1__reptime=2020"));
}

// =============================================================================
// Flush triggers
// =============================================================================

#[test]
fn test_maybe_flush_noop_when_empty_or_not_due() {
    let (buffer, channel) = setup(config(1 << 20));
    assert!(buffer.maybe_flush(Instant::now()).unwrap().is_none());

    buffer.submit(request(b"small", "g1", "s1")).unwrap();
    assert!(buffer.maybe_flush(Instant::now()).unwrap().is_none());
    assert!(channel.packets().is_empty());
    assert_eq!(buffer.len(), 1);
}

#[test]
fn test_maybe_flush_on_pack_size() {
    let (buffer, channel) = setup(config(64));
    buffer.submit(request(&[b'x'; 40], "g1", "s1")).unwrap();
    assert!(buffer.maybe_flush(Instant::now()).unwrap().is_none());

    buffer.submit(request(&[b'y'; 40], "g1", "s1")).unwrap();
    let report = buffer.maybe_flush(Instant::now()).unwrap().unwrap();
    assert!(report.drained >= 1);
    assert!(!channel.packets().is_empty());
}

#[test]
fn test_maybe_flush_on_timeout() {
    let mut cfg = config(1 << 20);
    cfg.sdk.pack_timeout = Duration::from_millis(100);
    let (buffer, channel) = setup(cfg);
    buffer.submit(request(b"late", "g1", "s1")).unwrap();

    let later = Instant::now() + Duration::from_millis(500);
    let report = buffer.maybe_flush(later).unwrap().unwrap();
    assert_eq!(report.drained, 1);
    assert_eq!(channel.packets().len(), 1);
}

#[test]
fn test_flush_errors_on_empty_queue_and_empty_key() {
    let (buffer, _) = setup(config(1 << 20));
    assert!(matches!(
        buffer.flush(),
        Err(BufferError::NothingToSend { .. })
    ));

    let (buffer, _) = setup_with_key("", config(1 << 20));
    buffer.submit(request(b"x", "g1", "s1")).unwrap();
    assert!(matches!(buffer.flush(), Err(BufferError::InvalidDestination)));
    assert_eq!(buffer.len(), 1);
}

// =============================================================================
// Greedy drain
// =============================================================================

fn queue_of(sizes: &[(usize, &str)]) -> VecDeque<Record> {
    sizes
        .iter()
        .map(|(size, group)| Record::builder(vec![b'x'; *size], *group, "s1").build())
        .collect()
}

#[test]
fn test_drain_stops_before_exceeding_pack_size() {
    let mut queue = queue_of(&[(10, "A"), (10, "A"), (10, "A")]);
    let drained = drain(&mut queue, 25, usize::MAX);

    // First record always goes; the second would take A to 10 + 20 + 10 > 25
    assert_eq!(drained.records, 1);
    assert_eq!(drained.bytes, 10 + ATTR_LENGTH);
    assert_eq!(drained.batches.len(), 1);
    assert_eq!(queue.len(), 2);
}

#[test]
fn test_drain_takes_everything_under_large_threshold() {
    let mut queue = queue_of(&[(10, "A"), (10, "A"), (10, "A")]);
    let drained = drain(&mut queue, 10_000, usize::MAX);
    assert_eq!(drained.records, 3);
    assert_eq!(drained.batches[0].records.len(), 3);
    assert_eq!(drained.bytes, 3 * (10 + ATTR_LENGTH));
    assert!(queue.is_empty());
}

#[test]
fn test_drain_admits_oversized_first_record() {
    let mut queue = queue_of(&[(500, "A"), (1, "A")]);
    let drained = drain(&mut queue, 100, usize::MAX);
    assert_eq!(drained.records, 1);
    assert_eq!(queue.len(), 1);
}

#[test]
fn test_drain_uses_largest_key_running_size() {
    // A reaches 50; a new key B is still measured against A's running size
    let mut queue = queue_of(&[(40, "A"), (5, "B"), (30, "B")]);
    let drained = drain(&mut queue, 70, usize::MAX);

    // B(5): 5 + 50 + 10 = 65 <= 70, admitted. B(30): 30 + 50 + 10 > 70, stop.
    assert_eq!(drained.records, 2);
    assert_eq!(drained.batches.len(), 2);
    assert_eq!(queue.len(), 1);
}

#[test]
fn test_drain_groups_in_first_seen_order() {
    let mut queue = queue_of(&[(1, "B"), (1, "A"), (1, "B"), (1, "C")]);
    let drained = drain(&mut queue, 10_000, usize::MAX);
    let groups: Vec<&str> = drained
        .batches
        .iter()
        .map(|b| b.records[0].group_id())
        .collect();
    assert_eq!(groups, vec!["B", "A", "C"]);
    assert_eq!(drained.batches[0].records.len(), 2);
}

#[test]
fn test_drain_stops_at_per_key_record_limit() {
    let mut queue = queue_of(&[(1, "A"), (1, "B"), (1, "A"), (1, "A"), (1, "B")]);
    let drained = drain(&mut queue, 10_000, 2);

    // The third A would exceed the limit; the B after it stays queued too
    assert_eq!(drained.records, 3);
    assert_eq!(drained.batches[0].records.len(), 2);
    assert_eq!(drained.batches[1].records.len(), 1);
    assert_eq!(queue.len(), 2);
}

#[test]
fn test_flush_early_stop_leaves_remainder_queued() {
    let (buffer, channel) = setup(config(25));
    for _ in 0..3 {
        buffer.submit(request(&[b'x'; 10], "g1", "s1")).unwrap();
    }

    let report = buffer.flush().unwrap();
    assert_eq!(report.drained, 1);
    assert_eq!(report.remaining, 2);
    assert_eq!(buffer.buffered_bytes(), 2 * (10 + ATTR_LENGTH));
    assert_eq!(channel.packets().len(), 1);
}

#[test]
fn test_flush_never_loses_or_duplicates() {
    let (buffer, channel) = setup(config(200));
    let mut submitted = Vec::new();
    for i in 0..100u32 {
        let group = if i % 3 == 0 { "g1" } else { "g2" };
        let payload = format!("record-{i:03}").into_bytes();
        submitted.push(payload.clone());
        buffer.submit(SendRequest::new(payload, group, "s1")).unwrap();
    }

    let mut rounds = 0;
    while !buffer.is_empty() {
        let report = buffer.flush().unwrap();
        assert!(report.is_complete());
        assert!(report.drained > 0);
        rounds += 1;
    }
    assert!(rounds > 1);
    assert_eq!(buffer.buffered_bytes(), 0);

    let mut delivered = payloads(&channel.packets());
    delivered.sort();
    assert_eq!(delivered, submitted);
}

#[test]
fn test_binary_layout_splits_batches_over_record_count_limit() {
    let mut config = config(4 * 1024 * 1024);
    config.sdk.max_buffer_bytes = 4 * 1024 * 1024;
    config.sdk.compress = false;
    let (buffer, channel) = setup(config);

    let total = u16::MAX as usize + 4_465;
    for _ in 0..total {
        buffer.submit(request(b"x", "g1", "s1")).unwrap();
    }

    let first = buffer.flush().unwrap();
    assert!(first.is_complete());
    assert_eq!(first.drained, u16::MAX as usize);
    assert_eq!(first.remaining, 4_465);

    let second = buffer.flush().unwrap();
    assert!(second.is_complete());
    assert_eq!(second.remaining, 0);

    let packets = channel.packets();
    let counts: Vec<usize> = packets.iter().map(|p| p.record_count()).collect();
    assert_eq!(counts, vec![u16::MAX as usize, 4_465]);
    let decoded = decode_packet(packets[0].bytes().clone()).unwrap();
    assert_eq!(decoded.record_count(), u16::MAX as usize);
}

// =============================================================================
// Packets
// =============================================================================

#[test]
fn test_end_to_end_three_records_one_packet() {
    let mut cfg = config(1 << 20);
    cfg.sdk.pack_timeout = Duration::from_millis(10);
    let (buffer, channel) = setup(cfg);
    for payload in [&b"one"[..], b"two", b"three"] {
        buffer.submit(request(payload, "g1", "s1")).unwrap();
    }

    let later = Instant::now() + Duration::from_millis(50);
    let report = buffer.maybe_flush(later).unwrap().unwrap();
    assert_eq!(report.packets_sent, 1);

    let packets = channel.packets();
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].record_count(), 3);
    assert_eq!(packets[0].group_id(), "g1");
    assert!(packets[0].is_packed());

    let decoded = decode_packet(packets[0].bytes().clone()).unwrap();
    assert_eq!(decoded.record_count(), 3);
    assert_eq!(decoded.group_id(), Some("g1"));
    assert_eq!(decoded.stream_id(), Some("s1"));
    let bodies: Vec<_> = decoded
        .split_records(false)
        .unwrap()
        .into_iter()
        .map(|r| r.payload)
        .collect();
    assert_eq!(bodies, vec!["one", "two", "three"]);
}

#[test]
fn test_one_packet_per_stream_key() {
    let (buffer, channel) = setup(config(1 << 20));
    buffer.submit(request(b"a1", "g1", "s1")).unwrap();
    buffer.submit(request(b"b1", "g1", "s2")).unwrap();
    buffer.submit(request(b"a2", "g1", "s1")).unwrap();

    let report = buffer.flush().unwrap();
    assert_eq!(report.packets_sent, 2);

    let packets = channel.packets();
    assert_eq!(packets[0].stream_id(), "s1");
    assert_eq!(packets[0].record_count(), 2);
    assert_eq!(packets[1].stream_id(), "s2");
    assert_ne!(packets[0].batch_id(), packets[1].batch_id());
}

#[test]
fn test_numeric_ids_from_config() {
    let mut cfg = config(1 << 20);
    cfg.sdk.numeric_ids.groups.insert("g1".into(), 5);
    cfg.sdk.numeric_ids.streams.insert("s1".into(), 6);
    let (buffer, channel) = setup(cfg);
    buffer
        .submit(request(b"x", "g1", "s1").with_report_time_ms(1_600_000_000_000))
        .unwrap();
    buffer.flush().unwrap();

    let decoded = decode_packet(channel.packets()[0].bytes().clone()).unwrap();
    assert_eq!(decoded.numeric_ids(), Some((5, 6)));
    assert_eq!(decoded.data_time_ms(), 1_600_000_000_000);
}

#[test]
fn test_legacy_layout_from_config() {
    let mut cfg = config(1 << 20);
    cfg.sdk.msg_type = 5;
    let (buffer, channel) = setup(cfg);
    buffer.submit(request(b"x", "g1", "s1")).unwrap();
    buffer.submit(request(b"y", "g1", "s1")).unwrap();
    buffer.flush().unwrap();

    let decoded = decode_packet(channel.packets()[0].bytes().clone()).unwrap();
    assert_eq!(decoded.attr("cnt"), Some("2"));
    assert!(decoded.attr("sid").is_some_and(|sid| !sid.is_empty()));
}

// =============================================================================
// Routing failures
// =============================================================================

#[test]
fn test_unknown_destination_leaves_queue() {
    let (buffer, _) = setup_with_key("nowhere", config(1 << 20));
    buffer.submit(request(b"x", "g9", "s1")).unwrap();

    assert!(matches!(buffer.flush(), Err(BufferError::NoChannel { .. })));
    assert_eq!(buffer.len(), 1);
    assert_eq!(buffer.buffered_bytes(), 1 + ATTR_LENGTH);
    assert_eq!(buffer.metrics().routing_failures, 1);
}

#[test]
fn test_unavailable_and_full_channel_leave_queue() {
    let (buffer, channel) = setup(config(1 << 20));
    let (callback, seen) = capture();
    buffer
        .submit(request(b"x", "g1", "s1").with_callback(callback))
        .unwrap();

    channel.unavailable.store(true, Ordering::SeqCst);
    let err = buffer.flush().unwrap_err();
    assert!(matches!(err, BufferError::ChannelUnavailable { .. }));
    assert!(err.is_retryable());

    channel.unavailable.store(false, Ordering::SeqCst);
    channel.full.store(true, Ordering::SeqCst);
    assert!(matches!(buffer.flush(), Err(BufferError::ChannelFull { .. })));

    assert_eq!(buffer.len(), 1);
    assert!(seen.lock().is_empty());

    // Next trigger succeeds
    channel.full.store(false, Ordering::SeqCst);
    assert_eq!(buffer.flush().unwrap().packets_sent, 1);
}

// =============================================================================
// Failure callbacks
// =============================================================================

#[test]
fn test_rejected_packet_fires_callbacks_with_original_values() {
    let (buffer, channel) = setup(config(1 << 20));
    let (callback, seen) = capture();
    channel.reject.store(true, Ordering::SeqCst);

    buffer
        .submit(request(b"first", "g1", "s1").with_callback(callback.clone()))
        .unwrap();
    buffer
        .submit(
            request(b"second", "g1", "s1")
                .with_client_ip("10.0.0.5")
                .with_report_time_ms(7)
                .with_callback(callback),
        )
        .unwrap();

    let report = buffer.flush().unwrap();
    assert_eq!(report.packets_failed, 1);
    assert!(matches!(report.errors[0], BufferError::SendFailed { .. }));
    // Not requeued
    assert!(buffer.is_empty());

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], ("g1".to_string(), b"first".to_vec(), 0, String::new()));
    // Out-of-window time and caller ip are reported as given
    assert_eq!(seen[1], ("g1".to_string(), b"second".to_vec(), 7, "10.0.0.5".to_string()));

    let metrics = buffer.metrics();
    assert_eq!(metrics.packets_failed, 1);
    assert_eq!(metrics.records_failed, 2);
}

#[test]
fn test_serialization_failure_fires_callbacks() {
    let (buffer, channel) = setup(config(1 << 20));
    let (callback, seen) = capture();
    // Binary attributes carry the group id and must fit a u16 length
    let huge_group = "g".repeat(70_000);

    buffer
        .submit(request(b"x", &huge_group, "s1").with_callback(callback.clone()))
        .unwrap();
    buffer
        .submit(request(b"y", "g1", "s1").with_callback(callback))
        .unwrap();

    let report = buffer.flush().unwrap();
    assert_eq!(report.drained, 2);
    assert_eq!(report.packets_sent, 1);
    assert_eq!(report.packets_failed, 1);
    assert!(matches!(
        report.errors[0],
        BufferError::SerializationFailed { .. }
    ));
    assert!(!report.errors[0].is_retryable());

    assert_eq!(seen.lock().len(), 1);
    assert_eq!(channel.packets().len(), 1);
}

#[test]
fn test_callback_may_resubmit() {
    let (buffer, channel) = setup(config(1 << 20));
    let buffer = Arc::new(buffer);
    channel.reject.store(true, Ordering::SeqCst);

    let weak = Arc::downgrade(&buffer);
    let callback: RecordCallback = Arc::new(move |failed: &FailedRecord<'_>| {
        if let Some(buffer) = weak.upgrade() {
            buffer
                .submit(SendRequest::new(failed.payload.to_vec(), "g1", "retry"))
                .unwrap();
        }
    });
    buffer
        .submit(request(b"x", "g1", "s1").with_callback(callback))
        .unwrap();

    buffer.flush().unwrap();
    assert_eq!(buffer.len(), 1);
}

// =============================================================================
// Shutdown helpers
// =============================================================================

#[test]
fn test_drain_all_empties_queue() {
    let (buffer, channel) = setup(config(25));
    for _ in 0..5 {
        buffer.submit(request(&[b'x'; 10], "g1", "s1")).unwrap();
    }
    assert_eq!(buffer.drain_all(16), 5);
    assert!(buffer.is_empty());
    assert_eq!(channel.packets().len(), 5);
}

#[test]
fn test_drain_all_respects_round_limit() {
    let (buffer, _) = setup(config(25));
    for _ in 0..5 {
        buffer.submit(request(&[b'x'; 10], "g1", "s1")).unwrap();
    }
    assert_eq!(buffer.drain_all(2), 2);
    assert_eq!(buffer.len(), 3);
}

#[test]
fn test_abandon_reports_every_record() {
    let (buffer, _) = setup(config(1 << 20));
    let (callback, seen) = capture();
    for _ in 0..3 {
        buffer
            .submit(request(b"x", "g1", "s1").with_callback(callback.clone()))
            .unwrap();
    }

    assert_eq!(buffer.abandon(), 3);
    assert!(buffer.is_empty());
    assert_eq!(buffer.buffered_bytes(), 0);
    assert_eq!(seen.lock().len(), 3);
}
