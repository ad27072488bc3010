//! Wire packet decoding
//!
//! Parses both header layouts back into their fields. The layout is picked
//! from the message type byte at offset 4. Compressed bodies are
//! decompressed, so `DecodedPacket::body` is always the raw record body.
//!
//! # Usage
//!
//! ```ignore
//! let packet = decode_packet(bytes)?;
//! for record in packet.split_records(false)? {
//!     println!("{} bytes", record.payload.len());
//! }
//! ```

use bytes::Bytes;

use crate::compress::decompress;
use crate::error::ProtocolError;
use crate::message_type::MessageType;
use crate::{BINARY_FIXED_OVERHEAD, BINARY_MAGIC, CHAR_ID_FLAG, Result};

/// Smallest legacy packet: total + type + body_len + attr_len
const LEGACY_MIN_LEN: usize = 4 + 1 + 4 + 4;

/// Smallest binary packet: total + fixed header
const BINARY_MIN_LEN: usize = 4 + BINARY_FIXED_OVERHEAD;

// =============================================================================
// Decoded Packet
// =============================================================================

/// Which header layout a packet used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Legacy,
    Binary,
}

/// A parsed wire packet
#[derive(Debug, Clone)]
pub struct DecodedPacket {
    layout: Layout,
    msg_type: MessageType,
    compressed: bool,
    numeric_ids: Option<(u16, u16)>,
    ext_field: u16,
    record_count: usize,
    batch_id: u32,
    data_time_ms: u64,
    body: Bytes,
    attrs: Vec<(String, String)>,
}

impl DecodedPacket {
    /// Header layout
    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Message type with the compression flag stripped
    #[inline]
    pub fn msg_type(&self) -> MessageType {
        self.msg_type
    }

    /// True if the body was compressed on the wire
    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Numeric (group, stream) ids, binary layout only
    #[inline]
    pub fn numeric_ids(&self) -> Option<(u16, u16)> {
        self.numeric_ids
    }

    /// Binary extension field (0 on legacy)
    #[inline]
    pub fn ext_field(&self) -> u16 {
        self.ext_field
    }

    /// Number of records the header declares
    #[inline]
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// Batch id (`mid` on legacy)
    #[inline]
    pub fn batch_id(&self) -> u32 {
        self.batch_id
    }

    /// Data time in milliseconds (second precision on binary)
    #[inline]
    pub fn data_time_ms(&self) -> u64 {
        self.data_time_ms
    }

    /// Uncompressed record body
    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Header attributes in wire order
    #[inline]
    pub fn attrs(&self) -> &[(String, String)] {
        &self.attrs
    }

    /// Look up one attribute value
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Group id carried as a string attribute
    #[inline]
    pub fn group_id(&self) -> Option<&str> {
        self.attr("groupId")
    }

    /// Stream id carried as a string attribute
    #[inline]
    pub fn stream_id(&self) -> Option<&str> {
        self.attr("streamId")
    }

    /// Split the body back into records
    ///
    /// `attr_pack_format` must match the packing setting. Bodies whose records
    /// have neither a length prefix nor a newline delimiter cannot be split.
    pub fn split_records(&self, attr_pack_format: bool) -> Result<Vec<DecodedRecord>> {
        if self.msg_type.has_length_prefix() {
            return split_prefixed(&self.body, attr_pack_format);
        }
        if self.msg_type.is_newline_delimited() && !attr_pack_format {
            return Ok(split_lines(&self.body));
        }
        Err(ProtocolError::Unsplittable(self.msg_type.code()))
    }
}

/// One record recovered from a packet body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    pub payload: Bytes,
    pub pack_attr: Option<Bytes>,
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a packet produced by [`Packer`](crate::Packer)
pub fn decode_packet(bytes: Bytes) -> Result<DecodedPacket> {
    if bytes.len() < LEGACY_MIN_LEN {
        return Err(ProtocolError::too_short(LEGACY_MIN_LEN, bytes.len()));
    }

    let declared = read_u32(&bytes, 0)? as usize;
    if declared + 4 != bytes.len() {
        return Err(ProtocolError::LengthMismatch {
            declared: declared + 4,
            actual: bytes.len(),
        });
    }

    let (msg_type, compressed) = MessageType::from_wire_byte(bytes[4]);
    if msg_type.is_binary() {
        decode_binary(bytes, msg_type, compressed)
    } else {
        decode_legacy(bytes, msg_type)
    }
}

fn decode_legacy(bytes: Bytes, msg_type: MessageType) -> Result<DecodedPacket> {
    let mut cursor = Cursor::new(&bytes, 5);
    let body_len = cursor.u32()? as usize;
    let body = cursor.take(body_len)?;
    let attr_len = cursor.u32()? as usize;
    let attr = cursor.take(attr_len)?;
    cursor.finish()?;

    let attrs = parse_attrs(&attr)?;
    let find = |key: &'static str| {
        attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .ok_or(ProtocolError::MissingAttr(key))
    };

    let record_count = parse_number::<usize>("cnt", find("cnt")?)?;
    let batch_id = parse_number::<u32>("mid", find("mid")?)?;
    let data_time_ms = parse_number::<u64>("dt", find("dt")?)?;
    let compressed = find("cp").is_ok_and(|v| v == "snappy");
    find("groupId")?;
    find("streamId")?;

    let body = if compressed {
        Bytes::from(decompress(&body)?)
    } else {
        body
    };

    Ok(DecodedPacket {
        layout: Layout::Legacy,
        msg_type,
        compressed,
        numeric_ids: None,
        ext_field: 0,
        record_count,
        batch_id,
        data_time_ms,
        body,
        attrs,
    })
}

fn decode_binary(bytes: Bytes, msg_type: MessageType, compressed: bool) -> Result<DecodedPacket> {
    if bytes.len() < BINARY_MIN_LEN {
        return Err(ProtocolError::too_short(BINARY_MIN_LEN, bytes.len()));
    }

    let mut cursor = Cursor::new(&bytes, 5);
    let group_num = cursor.u16()?;
    let stream_num = cursor.u16()?;
    let ext_field = cursor.u16()?;
    let data_time_sec = cursor.u32()?;
    let record_count = cursor.u16()? as usize;
    let batch_id = cursor.u32()?;
    let body_len = cursor.u32()? as usize;
    let body = cursor.take(body_len)?;
    let attr_len = cursor.u16()? as usize;
    let attr = cursor.take(attr_len)?;
    let magic = cursor.u16()?;
    cursor.finish()?;

    if magic != BINARY_MAGIC {
        return Err(ProtocolError::BadMagic(magic));
    }

    let numeric_ids = if ext_field & CHAR_ID_FLAG != 0 {
        None
    } else {
        Some((group_num, stream_num))
    };

    let body = if compressed {
        Bytes::from(decompress(&body)?)
    } else {
        body
    };

    Ok(DecodedPacket {
        layout: Layout::Binary,
        msg_type,
        compressed,
        numeric_ids,
        ext_field,
        record_count,
        batch_id,
        data_time_ms: u64::from(data_time_sec) * 1000,
        body,
        attrs: parse_attrs(&attr)?,
    })
}

/// Parse a `k=v&k=v` attribute string
pub fn parse_attrs(raw: &[u8]) -> Result<Vec<(String, String)>> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| ProtocolError::invalid_attr(format!("not utf-8: {e}")))?;
    if text.is_empty() {
        return Ok(Vec::new());
    }

    text.split('&')
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| ProtocolError::invalid_attr(format!("missing '=' in {pair:?}")))
        })
        .collect()
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| ProtocolError::invalid_attr(format!("{key}={value:?} is not a number")))
}

fn split_prefixed(body: &Bytes, attr_pack_format: bool) -> Result<Vec<DecodedRecord>> {
    let mut cursor = Cursor::new(body, 0);
    let mut records = Vec::new();

    while !cursor.is_done() {
        let len = cursor.u32()? as usize;
        let payload = cursor.take(len)?;
        let pack_attr = if attr_pack_format {
            let len = cursor.u32()? as usize;
            Some(cursor.take(len)?)
        } else {
            None
        };
        records.push(DecodedRecord { payload, pack_attr });
    }
    Ok(records)
}

fn split_lines(body: &Bytes) -> Vec<DecodedRecord> {
    let trimmed = body.strip_suffix(b"\n").unwrap_or(&body[..]);
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut records = Vec::new();
    let mut start = 0;
    for (i, byte) in trimmed.iter().enumerate() {
        if *byte == b'\n' {
            records.push(DecodedRecord {
                payload: body.slice(start..i),
                pack_attr: None,
            });
            start = i + 1;
        }
    }
    records.push(DecodedRecord {
        payload: body.slice(start..trimmed.len()),
        pack_attr: None,
    });
    records
}

// =============================================================================
// Cursor
// =============================================================================

/// Big-endian reader over a packet; slices share the packet's buffer
struct Cursor<'a> {
    buf: &'a Bytes,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a Bytes, pos: usize) -> Self {
        Self { buf, pos }
    }

    fn is_done(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, len: usize) -> Result<Bytes> {
        let end = self.pos + len;
        if end > self.buf.len() {
            return Err(ProtocolError::too_short(end, self.buf.len()));
        }
        let out = self.buf.slice(self.pos..end);
        self.pos = end;
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16> {
        let v = read_u16(self.buf, self.pos)?;
        self.pos += 2;
        Ok(v)
    }

    fn u32(&mut self) -> Result<u32> {
        let v = read_u32(self.buf, self.pos)?;
        self.pos += 4;
        Ok(v)
    }

    /// Fail if bytes remain after the last field
    fn finish(&self) -> Result<()> {
        if self.pos != self.buf.len() {
            return Err(ProtocolError::LengthMismatch {
                declared: self.pos,
                actual: self.buf.len(),
            });
        }
        Ok(())
    }
}

#[inline]
fn read_u16(buf: &[u8], offset: usize) -> Result<u16> {
    if offset + 2 > buf.len() {
        return Err(ProtocolError::too_short(offset + 2, buf.len()));
    }
    Ok(u16::from_be_bytes([buf[offset], buf[offset + 1]]))
}

#[inline]
fn read_u32(buf: &[u8], offset: usize) -> Result<u32> {
    if offset + 4 > buf.len() {
        return Err(ProtocolError::too_short(offset + 4, buf.len()));
    }
    Ok(u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ]))
}
