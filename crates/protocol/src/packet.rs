//! WirePacket - a serialized sub-batch ready for transport
//!
//! The packet keeps its source records so that a failed send can be reported
//! back to every caller whose data it contained.

use bytes::Bytes;

use crate::record::Record;

/// Serialized packet plus the metadata and records it was built from
///
/// Channels receive packets as `Arc<WirePacket>`; the bytes are reference
/// counted, so handing the same packet to several owners never copies data.
#[derive(Debug, Clone)]
pub struct WirePacket {
    bytes: Bytes,
    group_id: String,
    stream_id: String,
    batch_id: u32,
    packed: bool,
    records: Vec<Record>,
}

impl WirePacket {
    /// Wrap packed bytes together with their source records
    ///
    /// Group and stream ids are taken from the first record; all records of
    /// a sub-batch share them.
    pub fn new(bytes: Bytes, batch_id: u32, records: Vec<Record>) -> Self {
        let (group_id, stream_id) = records
            .first()
            .map(|r| (r.group_id().to_string(), r.stream_id().to_string()))
            .unwrap_or_default();

        Self {
            bytes,
            group_id,
            stream_id,
            batch_id,
            packed: true,
            records,
        }
    }

    /// Serialized packet bytes
    #[inline]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Packet length on the wire
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True if the packet has no bytes
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Group id shared by all records
    #[inline]
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Stream id shared by all records
    #[inline]
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Number of records packed
    #[inline]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Batch id written into the header
    #[inline]
    pub fn batch_id(&self) -> u32 {
        self.batch_id
    }

    /// True once the bytes have been produced by the packer
    #[inline]
    pub fn is_packed(&self) -> bool {
        self.packed
    }

    /// Records this packet was built from, in queue order
    #[inline]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Invoke every record's failure callback
    ///
    /// Returns the number of callbacks invoked.
    pub fn report_failure(&self) -> usize {
        self.records.iter().filter(|r| r.report_failure()).count()
    }
}
