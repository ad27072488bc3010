//! Ingress request

use std::fmt;

use shipper_protocol::{Bytes, RecordCallback};

/// One record as submitted by the caller
///
/// `client_ip` may be empty and `report_time_ms` may be 0 or out of range;
/// the receive buffer normalizes both and keeps the originals for failure
/// callbacks.
///
/// # Example
///
/// ```
/// use shipper_pipeline::SendRequest;
///
/// let request = SendRequest::new(&b"level=info msg=ok"[..], "g1", "s1")
///     .with_client_ip("10.0.0.7")
///     .with_report_time_ms(1_700_000_000_000);
/// assert_eq!(request.group_id, "g1");
/// ```
#[derive(Clone)]
pub struct SendRequest {
    pub payload: Bytes,
    pub group_id: String,
    pub stream_id: String,
    pub client_ip: String,
    pub report_time_ms: u64,
    pub callback: Option<RecordCallback>,
}

impl SendRequest {
    /// Request with no client ip, no report time and no callback
    pub fn new(
        payload: impl Into<Bytes>,
        group_id: impl Into<String>,
        stream_id: impl Into<String>,
    ) -> Self {
        Self {
            payload: payload.into(),
            group_id: group_id.into(),
            stream_id: stream_id.into(),
            client_ip: String::new(),
            report_time_ms: 0,
            callback: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = ip.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_report_time_ms(mut self, ms: u64) -> Self {
        self.report_time_ms = ms;
        self
    }

    /// Callback invoked once if the record cannot be delivered
    #[inline]
    #[must_use]
    pub fn with_callback(mut self, callback: RecordCallback) -> Self {
        self.callback = Some(callback);
        self
    }
}

impl fmt::Debug for SendRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendRequest")
            .field("group_id", &self.group_id)
            .field("stream_id", &self.stream_id)
            .field("size", &self.payload.len())
            .field("client_ip", &self.client_ip)
            .field("report_time_ms", &self.report_time_ms)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
