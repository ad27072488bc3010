//! SDK settings
//!
//! Buffering, packing and channel-pool settings shared by every destination.
//! All fields have defaults - you only need to specify what you want to change.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

/// Settings for the receive buffers, the packer and the channel pools
///
/// # Example
///
/// ```toml
/// [sdk]
/// group_ids = ["g1", "g2"]
/// pack_size = 409600
/// pack_timeout = "3s"
/// msg_type = 7
/// compress = true
///
/// [sdk.numeric_ids.groups]
/// g1 = 11
///
/// [sdk.numeric_ids.streams]
/// s1 = 21
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// Groups resolved at startup; channel pools are pre-created for these
    /// Default: empty (groups are picked up on first send)
    pub group_ids: Vec<String>,

    /// Per-destination receive capacity (bytes)
    /// Default: 10485760 (10MB)
    pub max_buffer_bytes: usize,

    /// Pack-size threshold (bytes) that triggers a flush and bounds a sub-batch
    /// Default: 409600 (400KB)
    pub pack_size: usize,

    /// Maximum time between flushes of a non-empty buffer
    /// Default: 3s
    #[serde(with = "humantime_serde")]
    pub pack_timeout: Duration,

    /// Largest single payload accepted by `send`
    /// Default: 500000
    pub max_message_size: usize,

    /// Wire message type code (selects framing and header layout)
    /// Default: 7 (binary header)
    pub msg_type: u8,

    /// Compress packed bodies with snappy
    /// Default: true
    pub compress: bool,

    /// Bodies at or below this size are sent uncompressed
    /// Default: 120
    pub min_compress_size: usize,

    /// Outbound channels opened per destination
    /// Default: 1
    pub channels_per_destination: usize,

    /// Append a per-record `__addcol` attribute block to every payload
    /// Default: false
    pub attr_pack_format: bool,

    /// Add `node1ip`/`rtime1` trace fields to the binary header attributes
    /// Default: false
    pub trace_ip: bool,

    /// Local address reported in trace fields
    /// Default: "127.0.0.1"
    pub local_ip: String,

    /// Always carry group/stream ids as strings in the binary header
    /// Default: false
    pub force_char_ids: bool,

    /// Extension bits OR'd into the binary header `ext_field`
    /// Default: 0
    pub extend_field: u16,

    /// How often the dispatch task polls buffers for due flushes
    /// Default: 10ms
    #[serde(with = "humantime_serde")]
    pub dispatch_interval: Duration,

    /// Numeric ids for groups and streams, keyed by their string id
    /// Default: empty
    pub numeric_ids: NumericIds,
}

/// Numeric wire ids, one table for groups and one for streams
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NumericIds {
    pub groups: HashMap<String, u16>,
    pub streams: HashMap<String, u16>,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            group_ids: Vec::new(),
            max_buffer_bytes: 10 * 1024 * 1024,
            pack_size: 400 * 1024,
            pack_timeout: Duration::from_secs(3),
            max_message_size: 500_000,
            msg_type: 7,
            compress: true,
            min_compress_size: 120,
            channels_per_destination: 1,
            attr_pack_format: false,
            trace_ip: false,
            local_ip: "127.0.0.1".into(),
            force_char_ids: false,
            extend_field: 0,
            dispatch_interval: Duration::from_millis(10),
            numeric_ids: NumericIds::default(),
        }
    }
}

impl SdkConfig {
    /// Numeric (group, stream) ids, if both are configured
    #[inline]
    pub fn numeric_ids_for(&self, group_id: &str, stream_id: &str) -> Option<(u16, u16)> {
        let group = self.numeric_ids.groups.get(group_id).copied()?;
        let stream = self.numeric_ids.streams.get(stream_id).copied()?;
        Some((group, stream))
    }
}
