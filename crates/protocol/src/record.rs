//! Record - one user submission waiting to be packed
//!
//! A `Record` is immutable once built. It keeps the caller's original client
//! ip and report time next to the normalized values, because failure
//! callbacks must report what the caller passed in.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::LOOPBACK_IP;
use crate::key::StreamKey;

/// Completion callback invoked once per record when its batch cannot be delivered
pub type RecordCallback = Arc<dyn Fn(&FailedRecord<'_>) + Send + Sync>;

/// Failure context handed to a [`RecordCallback`]
///
/// `report_time_ms` and `client_ip` are the values the caller supplied, not
/// the normalized ones used for packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedRecord<'a> {
    pub group_id: &'a str,
    pub stream_id: &'a str,
    pub payload: &'a [u8],
    pub report_time_ms: u64,
    pub client_ip: &'a str,
}

impl FailedRecord<'_> {
    /// Payload length in bytes
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// A buffered user record
#[derive(Clone)]
pub struct Record {
    payload: Bytes,
    key: StreamKey,
    client_ip: String,
    data_time_ms: u64,
    pack_attr: String,
    user_client_ip: String,
    user_report_time_ms: u64,
    callback: Option<RecordCallback>,
}

impl Record {
    /// Start building a record
    #[inline]
    pub fn builder(
        payload: impl Into<Bytes>,
        group_id: impl Into<String>,
        stream_id: impl Into<String>,
    ) -> RecordBuilder {
        RecordBuilder::new(payload, group_id, stream_id)
    }

    /// User payload
    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload size in bytes (the size counted against buffer capacity)
    #[inline]
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// (group, stream) key
    #[inline]
    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    /// Group id
    #[inline]
    pub fn group_id(&self) -> &str {
        self.key.group_id()
    }

    /// Stream id
    #[inline]
    pub fn stream_id(&self) -> &str {
        self.key.stream_id()
    }

    /// Normalized client ip (never empty)
    #[inline]
    pub fn client_ip(&self) -> &str {
        &self.client_ip
    }

    /// Normalized data time in milliseconds
    #[inline]
    pub fn data_time_ms(&self) -> u64 {
        self.data_time_ms
    }

    /// Per-record attribute string appended in attribute-pack mode
    #[inline]
    pub fn pack_attr(&self) -> &str {
        &self.pack_attr
    }

    /// Client ip as supplied by the caller (may be empty)
    #[inline]
    pub fn user_client_ip(&self) -> &str {
        &self.user_client_ip
    }

    /// Report time as supplied by the caller (may be 0 or out of range)
    #[inline]
    pub fn user_report_time_ms(&self) -> u64 {
        self.user_report_time_ms
    }

    /// True if a completion callback is attached
    #[inline]
    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Invoke the completion callback with failure context
    ///
    /// Returns `true` if a callback was attached.
    pub fn report_failure(&self) -> bool {
        let Some(callback) = &self.callback else {
            return false;
        };
        callback(&FailedRecord {
            group_id: self.group_id(),
            stream_id: self.stream_id(),
            payload: &self.payload,
            report_time_ms: self.user_report_time_ms,
            client_ip: &self.user_client_ip,
        });
        true
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("key", &self.key)
            .field("size", &self.payload.len())
            .field("client_ip", &self.client_ip)
            .field("data_time_ms", &self.data_time_ms)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// Builder for [`Record`]
///
/// Unset fields default to: client ip `127.0.0.1`, data time 0, empty
/// attribute string, no callback. The caller's original ip/time default to
/// the normalized ones unless set explicitly.
pub struct RecordBuilder {
    payload: Bytes,
    key: StreamKey,
    client_ip: Option<String>,
    data_time_ms: u64,
    pack_attr: String,
    user_client_ip: Option<String>,
    user_report_time_ms: Option<u64>,
    callback: Option<RecordCallback>,
}

impl RecordBuilder {
    /// Create a builder for the given payload and identity
    #[inline]
    pub fn new(
        payload: impl Into<Bytes>,
        group_id: impl Into<String>,
        stream_id: impl Into<String>,
    ) -> Self {
        Self {
            payload: payload.into(),
            key: StreamKey::new(group_id, stream_id),
            client_ip: None,
            data_time_ms: 0,
            pack_attr: String::new(),
            user_client_ip: None,
            user_report_time_ms: None,
            callback: None,
        }
    }

    /// Normalized client ip; empty means loopback
    #[inline]
    #[must_use]
    pub fn client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    /// Normalized data time in milliseconds
    #[inline]
    #[must_use]
    pub fn data_time_ms(mut self, ms: u64) -> Self {
        self.data_time_ms = ms;
        self
    }

    /// Per-record attribute string
    #[inline]
    #[must_use]
    pub fn pack_attr(mut self, attr: impl Into<String>) -> Self {
        self.pack_attr = attr.into();
        self
    }

    /// Caller-supplied client ip, reported back on failure
    #[inline]
    #[must_use]
    pub fn user_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.user_client_ip = Some(ip.into());
        self
    }

    /// Caller-supplied report time, reported back on failure
    #[inline]
    #[must_use]
    pub fn user_report_time_ms(mut self, ms: u64) -> Self {
        self.user_report_time_ms = Some(ms);
        self
    }

    /// Completion callback
    #[inline]
    #[must_use]
    pub fn callback(mut self, callback: RecordCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Optional completion callback
    #[inline]
    #[must_use]
    pub fn maybe_callback(mut self, callback: Option<RecordCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// Finish the record
    pub fn build(self) -> Record {
        let client_ip = match self.client_ip {
            Some(ip) if !ip.is_empty() => ip,
            _ => LOOPBACK_IP.to_string(),
        };
        let user_client_ip = self.user_client_ip.unwrap_or_else(|| client_ip.clone());
        let user_report_time_ms = self.user_report_time_ms.unwrap_or(self.data_time_ms);

        Record {
            payload: self.payload,
            key: self.key,
            client_ip,
            data_time_ms: self.data_time_ms,
            pack_attr: self.pack_attr,
            user_client_ip,
            user_report_time_ms,
            callback: self.callback,
        }
    }
}
