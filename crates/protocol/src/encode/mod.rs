//! Packet encoding
//!
//! `Packer` turns one sub-batch of records into a single wire packet. Packing
//! is compositional: the record body is built first into an owned scratch
//! buffer, the compression gate runs over it, and then one of the two header
//! layouts wraps the result.
//!
//! # Module Structure
//!
//! - `legacy` - `[total][type][u32 body][u32 attr]` layout for types below 7
//! - `binary` - fixed binary header with numeric ids and trailing magic
//!
//! # Record Body
//!
//! Each record contributes, in queue order:
//!
//! ```text
//! [u32 payload_len]?   message type >= 5
//! [payload]
//! [u32 attr_len][attr]? attribute pack format enabled
//! ['\n']?              message type 2 or 3 (last one dropped on legacy layout)
//! ```

mod binary;
mod legacy;

use bytes::Bytes;

use crate::Result;
use crate::compress::CompressionGate;
use crate::error::ProtocolError;
use crate::message_type::MessageType;
use crate::record::Record;
use crate::writer::extend_u32_prefixed;
use crate::{BIN_PACK_METHOD, LOOPBACK_IP};

// =============================================================================
// Settings
// =============================================================================

/// Process-wide packing options, fixed for the lifetime of a packer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackSettings {
    pub msg_type: MessageType,
    pub compress: bool,
    pub min_compress_size: usize,
    /// Append each record's `__addcol` attribute string to the body
    pub attr_pack_format: bool,
    /// Add `node1ip`/`rtime1` trace fields to binary attributes
    pub trace_ip: bool,
    pub local_ip: String,
    /// Always carry group/stream ids as strings on the binary layout
    pub force_char_ids: bool,
    /// Extension bits OR'd into the binary `ext_field`
    pub extend_field: u16,
}

impl Default for PackSettings {
    fn default() -> Self {
        Self {
            msg_type: MessageType::new(BIN_PACK_METHOD),
            compress: true,
            min_compress_size: 120,
            attr_pack_format: false,
            trace_ip: false,
            local_ip: LOOPBACK_IP.to_string(),
            force_char_ids: false,
            extend_field: 0,
        }
    }
}

/// Per-packet header values supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    /// Numeric (group, stream) ids for the binary layout, if known
    pub numeric_ids: Option<(u16, u16)>,
    /// Data time of the batch in milliseconds
    pub data_time_ms: u64,
    /// Monotonic batch id (`mid` on legacy, `batch_id` on binary)
    pub batch_id: u32,
    /// Opaque unique id (`sid` on legacy)
    pub unique_id: String,
    /// Wall-clock time used for the `rtime1` trace field
    pub now_ms: u64,
}

// =============================================================================
// Packer
// =============================================================================

/// Serializes sub-batches into wire packets
///
/// The scratch buffer holding the uncompressed body is allocated once and
/// reused for every packet.
///
/// # Example
///
/// ```
/// use shipper_protocol::{PackSettings, PacketHeader, Packer, Record};
///
/// let mut packer = Packer::new(PackSettings::default(), 1024);
/// let records = vec![Record::builder(&b"hello"[..], "g1", "s1").build()];
/// let header = PacketHeader {
///     numeric_ids: None,
///     data_time_ms: 1_700_000_000_000,
///     batch_id: 1,
///     unique_id: "42".into(),
///     now_ms: 1_700_000_000_000,
/// };
///
/// let bytes = packer.pack(&records, &header).unwrap();
/// let packet = shipper_protocol::decode_packet(bytes).unwrap();
/// assert_eq!(packet.group_id(), Some("g1"));
/// assert_eq!(packet.record_count(), 1);
/// ```
#[derive(Debug)]
pub struct Packer {
    settings: PackSettings,
    gate: CompressionGate,
    scratch: Vec<u8>,
}

impl Packer {
    /// Create a packer with a body scratch buffer of `scratch_capacity` bytes
    pub fn new(settings: PackSettings, scratch_capacity: usize) -> Self {
        let gate = CompressionGate::new(settings.compress, settings.min_compress_size);
        Self {
            settings,
            gate,
            scratch: Vec::with_capacity(scratch_capacity),
        }
    }

    /// Packing options
    #[inline]
    pub fn settings(&self) -> &PackSettings {
        &self.settings
    }

    /// Current scratch buffer capacity
    #[inline]
    pub fn scratch_capacity(&self) -> usize {
        self.scratch.capacity()
    }

    /// Pack `records` (all sharing one group/stream) into a wire packet
    ///
    /// Group and stream ids are taken from the first record.
    pub fn pack(&mut self, records: &[Record], header: &PacketHeader) -> Result<Bytes> {
        let first = records.first().ok_or(ProtocolError::EmptyBatch)?;
        let msg_type = self.settings.msg_type;

        self.build_body(records)?;
        if !msg_type.is_binary() && msg_type.is_newline_delimited() {
            self.scratch.pop();
        }

        let (body, compressed) = self.gate.maybe_compress(&self.scratch)?;
        let ctx = PackContext {
            settings: &self.settings,
            header,
            group_id: first.group_id(),
            stream_id: first.stream_id(),
            record_count: records.len(),
            body: &body,
            compressed,
        };

        if msg_type.is_binary() {
            binary::write(&ctx)
        } else {
            legacy::write(&ctx)
        }
    }

    fn build_body(&mut self, records: &[Record]) -> Result<()> {
        let msg_type = self.settings.msg_type;
        self.scratch.clear();

        for record in records {
            if msg_type.has_length_prefix() {
                extend_u32_prefixed(&mut self.scratch, record.payload())?;
            } else {
                self.scratch.extend_from_slice(record.payload());
            }

            if self.settings.attr_pack_format {
                extend_u32_prefixed(&mut self.scratch, record.pack_attr().as_bytes())?;
            }

            if msg_type.is_newline_delimited() {
                self.scratch.push(b'\n');
            }
        }
        Ok(())
    }
}

/// Everything a layout writer needs for one packet
pub(crate) struct PackContext<'a> {
    pub settings: &'a PackSettings,
    pub header: &'a PacketHeader,
    pub group_id: &'a str,
    pub stream_id: &'a str,
    pub record_count: usize,
    pub body: &'a [u8],
    pub compressed: bool,
}

impl PackContext<'_> {
    /// `groupId=<g>&streamId=<s>`
    pub fn id_attr(&self) -> String {
        format!("groupId={}&streamId={}", self.group_id, self.stream_id)
    }
}

/// Total packet size for a header whose `total_len` field covers `total_len` bytes
#[inline]
pub(crate) fn packet_len(total_len: usize) -> Result<(u32, usize)> {
    let declared = u32::try_from(total_len)
        .map_err(|_| ProtocolError::field_too_long("packet", total_len, u32::MAX as usize))?;
    Ok((declared, total_len + 4))
}
