//! Bounded big-endian byte builder
//!
//! `WireWriter` replaces manual offset arithmetic: every write is checked
//! against a fixed limit and all multi-byte integers go out in network byte
//! order.

use bytes::{BufMut, Bytes, BytesMut};

use crate::Result;
use crate::error::ProtocolError;

/// Growable byte builder with a hard size limit
///
/// # Example
///
/// ```
/// use shipper_protocol::WireWriter;
///
/// let mut w = WireWriter::with_limit(16);
/// w.put_u32(0x0102_0304).unwrap();
/// w.put_u16_prefixed(b"ab").unwrap();
/// assert_eq!(&w.freeze()[..], &[1, 2, 3, 4, 0, 2, b'a', b'b']);
/// ```
#[derive(Debug)]
pub struct WireWriter {
    buf: BytesMut,
    limit: usize,
}

impl WireWriter {
    /// Create a writer that refuses to grow past `limit` bytes
    #[inline]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(limit),
            limit,
        }
    }

    /// Bytes written so far
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been written
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes that can still be written before hitting the limit
    #[inline]
    pub fn remaining(&self) -> usize {
        self.limit - self.buf.len()
    }

    #[inline]
    fn reserve(&self, additional: usize) -> Result<()> {
        let size = self.buf.len() + additional;
        if size > self.limit {
            return Err(ProtocolError::BufferOverflow {
                size,
                max: self.limit,
            });
        }
        Ok(())
    }

    /// Write a single byte
    pub fn put_u8(&mut self, value: u8) -> Result<()> {
        self.reserve(1)?;
        self.buf.put_u8(value);
        Ok(())
    }

    /// Write a big-endian u16
    pub fn put_u16(&mut self, value: u16) -> Result<()> {
        self.reserve(2)?;
        self.buf.put_u16(value);
        Ok(())
    }

    /// Write a big-endian u32
    pub fn put_u32(&mut self, value: u32) -> Result<()> {
        self.reserve(4)?;
        self.buf.put_u32(value);
        Ok(())
    }

    /// Write raw bytes
    pub fn put_slice(&mut self, data: &[u8]) -> Result<()> {
        self.reserve(data.len())?;
        self.buf.put_slice(data);
        Ok(())
    }

    /// Write `data` preceded by its length as a big-endian u16
    pub fn put_u16_prefixed(&mut self, data: &[u8]) -> Result<()> {
        let len = u16::try_from(data.len())
            .map_err(|_| ProtocolError::field_too_long("u16-prefixed field", data.len(), u16::MAX as usize))?;
        self.reserve(2 + data.len())?;
        self.buf.put_u16(len);
        self.buf.put_slice(data);
        Ok(())
    }

    /// Write `data` preceded by its length as a big-endian u32
    pub fn put_u32_prefixed(&mut self, data: &[u8]) -> Result<()> {
        let len = u32::try_from(data.len())
            .map_err(|_| ProtocolError::field_too_long("u32-prefixed field", data.len(), u32::MAX as usize))?;
        self.reserve(4 + data.len())?;
        self.buf.put_u32(len);
        self.buf.put_slice(data);
        Ok(())
    }

    /// Finish writing and hand out the bytes
    #[inline]
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Append a big-endian u32 length prefix and `data` to a scratch vector
#[inline]
pub(crate) fn extend_u32_prefixed(buf: &mut Vec<u8>, data: &[u8]) -> Result<()> {
    let len = u32::try_from(data.len())
        .map_err(|_| ProtocolError::field_too_long("record field", data.len(), u32::MAX as usize))?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(data);
    Ok(())
}
