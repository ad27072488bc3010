//! Wire message type code
//!
//! The message type byte selects how records are framed inside a packet body
//! and which header layout wraps it. Only the documented thresholds are
//! interpreted; every other value is carried through opaquely.

use crate::{BIN_PACK_METHOD, BIN_SNAPPY_FLAG, LENGTH_PREFIX_MIN_TYPE};

/// Wire message type (opaque protocol code with layout predicates)
///
/// # Example
///
/// ```
/// use shipper_protocol::MessageType;
///
/// let binary = MessageType::new(7);
/// assert!(binary.is_binary());
/// assert!(binary.has_length_prefix());
///
/// let text = MessageType::new(3);
/// assert!(text.is_newline_delimited());
/// assert!(!text.is_binary());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageType(u8);

impl MessageType {
    /// Wrap a raw message type code
    #[inline]
    pub const fn new(code: u8) -> Self {
        Self(code)
    }

    /// Raw code as written on the wire (without compression flag)
    #[inline]
    pub const fn code(self) -> u8 {
        self.0
    }

    /// Each payload in the body carries a 4-byte length prefix
    #[inline]
    pub const fn has_length_prefix(self) -> bool {
        self.0 >= LENGTH_PREFIX_MIN_TYPE
    }

    /// Each record in the body is followed by `\n`
    #[inline]
    pub const fn is_newline_delimited(self) -> bool {
        matches!(self.0, 2 | 3)
    }

    /// Packets use the binary header layout instead of the legacy one
    #[inline]
    pub const fn is_binary(self) -> bool {
        self.0 >= BIN_PACK_METHOD
    }

    /// Most records one packet of this type can carry
    ///
    /// The binary header stores the count as `u16`; the legacy attribute
    /// string has no limit.
    #[inline]
    pub const fn max_records(self) -> usize {
        if self.is_binary() {
            u16::MAX as usize
        } else {
            usize::MAX
        }
    }

    /// Message type byte for a binary packet, with the compression flag when set
    #[inline]
    pub const fn wire_byte(self, compressed: bool) -> u8 {
        if compressed && self.is_binary() {
            self.0 | BIN_SNAPPY_FLAG
        } else {
            self.0
        }
    }

    /// Recover the message type and compression flag from a header byte
    #[inline]
    pub const fn from_wire_byte(byte: u8) -> (Self, bool) {
        let stripped = byte & !BIN_SNAPPY_FLAG;
        if stripped >= BIN_PACK_METHOD {
            (Self(stripped), byte & BIN_SNAPPY_FLAG != 0)
        } else {
            (Self(byte), false)
        }
    }
}

impl From<u8> for MessageType {
    fn from(code: u8) -> Self {
        Self::new(code)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
