//! Protocol error types
//!
//! Errors that can occur when packing or decoding wire packets.

use thiserror::Error;

/// Errors that can occur during protocol operations
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Write would exceed the writer's size limit
    #[error("buffer overflow: message size {size} exceeds maximum {max}")]
    BufferOverflow { size: usize, max: usize },

    /// A length-prefixed field does not fit its prefix
    #[error("{field} too long: {len} bytes exceeds maximum {max} bytes")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// Record count does not fit the header field
    #[error("record count {count} exceeds header maximum {max}")]
    CountOverflow { count: usize, max: usize },

    /// Packing was asked to serialize zero records
    #[error("cannot pack an empty batch")]
    EmptyBatch,

    /// Packet is too short to contain required fields
    #[error("message too short: expected at least {expected} bytes, got {actual}")]
    MessageTooShort { expected: usize, actual: usize },

    /// Declared total length disagrees with the packet size
    #[error("length mismatch: header declares {declared} bytes, packet has {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Binary packet does not end with the expected magic
    #[error("bad magic: expected 0xEE01, got {0:#06x}")]
    BadMagic(u16),

    /// Attribute string is not a valid `k=v&k=v` list
    #[error("invalid attributes: {0}")]
    InvalidAttr(String),

    /// Required attribute missing from a legacy packet
    #[error("missing attribute: {0}")]
    MissingAttr(&'static str),

    /// Snappy compression or decompression failed
    #[error("compression failed: {0}")]
    Compression(String),

    /// Body cannot be split into records for this message type
    #[error("message type {0} body cannot be split into records")]
    Unsplittable(u8),
}

impl ProtocolError {
    /// Create a message too short error
    #[inline]
    pub fn too_short(expected: usize, actual: usize) -> Self {
        Self::MessageTooShort { expected, actual }
    }

    /// Create a field too long error
    #[inline]
    pub fn field_too_long(field: &'static str, len: usize, max: usize) -> Self {
        Self::FieldTooLong { field, len, max }
    }

    /// Create an invalid attributes error
    #[inline]
    pub fn invalid_attr(msg: impl Into<String>) -> Self {
        Self::InvalidAttr(msg.into())
    }

    /// True for errors raised while building a packet (as opposed to decoding one)
    pub fn is_pack_error(&self) -> bool {
        matches!(
            self,
            Self::BufferOverflow { .. }
                | Self::FieldTooLong { .. }
                | Self::CountOverflow { .. }
                | Self::EmptyBatch
                | Self::Compression(_)
        )
    }
}
