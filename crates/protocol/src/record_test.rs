//! Tests for Record and WirePacket

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::{FailedRecord, LOOPBACK_IP, Record, RecordCallback, WirePacket};

fn recording_callback(log: Arc<Mutex<Vec<(String, String, Vec<u8>, u64, String)>>>) -> RecordCallback {
    Arc::new(move |failed: &FailedRecord<'_>| {
        log.lock().push((
            failed.group_id.to_string(),
            failed.stream_id.to_string(),
            failed.payload.to_vec(),
            failed.report_time_ms,
            failed.client_ip.to_string(),
        ));
    })
}

#[test]
fn test_builder_defaults() {
    let record = Record::builder(&b"hello"[..], "g1", "s1").build();

    assert_eq!(record.size(), 5);
    assert_eq!(record.group_id(), "g1");
    assert_eq!(record.stream_id(), "s1");
    assert_eq!(record.client_ip(), LOOPBACK_IP);
    assert_eq!(record.user_client_ip(), LOOPBACK_IP);
    assert_eq!(record.data_time_ms(), 0);
    assert_eq!(record.pack_attr(), "");
    assert!(!record.has_callback());
}

#[test]
fn test_empty_client_ip_defaults_to_loopback() {
    let record = Record::builder(&b"x"[..], "g", "s")
        .client_ip("")
        .user_client_ip("")
        .build();

    assert_eq!(record.client_ip(), LOOPBACK_IP);
    assert_eq!(record.user_client_ip(), "");
}

#[test]
fn test_report_failure_uses_original_values() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let record = Record::builder(&b"payload"[..], "g1", "s1")
        .client_ip("127.0.0.1")
        .data_time_ms(1_700_000_000_000)
        .user_client_ip("")
        .user_report_time_ms(0)
        .callback(recording_callback(log.clone()))
        .build();

    assert!(record.report_failure());

    let calls = log.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0],
        (
            "g1".to_string(),
            "s1".to_string(),
            b"payload".to_vec(),
            0,
            String::new()
        )
    );
}

#[test]
fn test_report_failure_without_callback() {
    let record = Record::builder(&b"x"[..], "g", "s").build();
    assert!(!record.report_failure());
}

#[test]
fn test_packet_reports_every_record() {
    let count = Arc::new(AtomicUsize::new(0));
    let cb: RecordCallback = {
        let count = count.clone();
        Arc::new(move |_: &FailedRecord<'_>| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    };

    let records = vec![
        Record::builder(&b"a"[..], "g", "s").callback(cb.clone()).build(),
        Record::builder(&b"b"[..], "g", "s").build(),
        Record::builder(&b"c"[..], "g", "s").callback(cb).build(),
    ];
    let packet = WirePacket::new(Bytes::from_static(b"packed"), 7, records);

    assert_eq!(packet.group_id(), "g");
    assert_eq!(packet.stream_id(), "s");
    assert_eq!(packet.record_count(), 3);
    assert_eq!(packet.batch_id(), 7);
    assert!(packet.is_packed());
    assert_eq!(packet.len(), 6);

    assert_eq!(packet.report_failure(), 2);
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
fn test_record_clone_shares_payload() {
    let record = Record::builder(vec![1u8; 1024], "g", "s").build();
    let cloned = record.clone();
    assert_eq!(record.payload().as_ptr(), cloned.payload().as_ptr());
}

#[test]
fn test_record_debug_omits_payload() {
    let record = Record::builder(&b"secret"[..], "g", "s").build();
    let debug = format!("{record:?}");
    assert!(debug.contains("size: 6"));
    assert!(!debug.contains("secret"));
}
