//! Shipper Protocol - records, wire packets and packet framing
//!
//! This crate provides the types that flow from the receive buffer to the
//! transport channels:
//! - `Record` - one buffered user submission with its completion callback
//! - `StreamKey` - (group, stream) identity used to split batches
//! - `WirePacket` - serialized sub-batch plus the records it came from
//! - `Packer` - builds legacy or binary packets from a sub-batch
//! - `decode_packet` - parses both layouts back (receivers and tests)
//!
//! # Design Principles
//!
//! - **Bounded writes**: all framing goes through `WireWriter`, which checks
//!   every write against a limit instead of walking raw offsets
//! - **Network byte order**: every multi-byte integer is big-endian
//! - **Shared bytes**: packets use `bytes::Bytes` so channels can hold them
//!   without copying

mod compress;
mod decode;
mod encode;
mod error;
mod key;
mod message_type;
mod packet;
mod record;
mod writer;

pub use compress::{CompressionGate, decompress};
pub use decode::{DecodedPacket, DecodedRecord, Layout, decode_packet, parse_attrs};
pub use encode::{PackSettings, PacketHeader, Packer};
pub use error::ProtocolError;
pub use key::StreamKey;
pub use message_type::MessageType;
pub use packet::WirePacket;
pub use record::{FailedRecord, Record, RecordBuilder, RecordCallback};
pub use writer::WireWriter;

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Fixed per-record attribute overhead counted in buffer accounting
pub const ATTR_LENGTH: usize = 10;

/// Header margin added to the pack scratch buffer
pub const PACK_MARGIN: usize = 400;

/// Message types at or above this use the binary header layout
pub const BIN_PACK_METHOD: u8 = 7;

/// Message types at or above this prefix every payload with its length
pub const LENGTH_PREFIX_MIN_TYPE: u8 = 5;

/// Bit OR'd into a binary packet's message type when the body is compressed
pub const BIN_SNAPPY_FLAG: u8 = 0x20;

/// Trailing magic of the binary layout
pub const BINARY_MAGIC: u16 = 0xEE01;

/// `ext_field` bit: group/stream ids are carried as strings in the attributes
pub const CHAR_ID_FLAG: u16 = 0x0004;

/// Binary header bytes covered by `total_len` besides body and attributes
pub const BINARY_FIXED_OVERHEAD: usize = 25;

/// Client ip used when the caller supplies none
pub const LOOPBACK_IP: &str = "127.0.0.1";

#[cfg(test)]
mod record_test;
