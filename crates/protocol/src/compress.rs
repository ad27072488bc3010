//! Compression gate for packet bodies
//!
//! Bodies are compressed with raw (unframed) Snappy when compression is
//! enabled and the uncompressed body is strictly larger than the configured
//! minimum. The returned flag tells the header builders which marker to set.

use std::borrow::Cow;

use crate::Result;
use crate::error::ProtocolError;

/// Decides whether a body is compressed and performs the compression
pub struct CompressionGate {
    enabled: bool,
    min_size: usize,
    encoder: snap::raw::Encoder,
}

impl CompressionGate {
    /// Create a gate; bodies of `min_size` bytes or fewer are left alone
    pub fn new(enabled: bool, min_size: usize) -> Self {
        Self {
            enabled,
            min_size,
            encoder: snap::raw::Encoder::new(),
        }
    }

    /// A gate that never compresses
    pub fn disabled() -> Self {
        Self::new(false, 0)
    }

    /// True if compression is turned on at all
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// True if a body of `len` bytes would be compressed
    #[inline]
    pub fn applies_to(&self, len: usize) -> bool {
        self.enabled && len > self.min_size
    }

    /// Compress `body` if the gate applies
    ///
    /// Returns the bytes to put on the wire and whether they are compressed.
    pub fn maybe_compress<'a>(&mut self, body: &'a [u8]) -> Result<(Cow<'a, [u8]>, bool)> {
        if !self.applies_to(body.len()) {
            return Ok((Cow::Borrowed(body), false));
        }

        let compressed = self
            .encoder
            .compress_vec(body)
            .map_err(|e| ProtocolError::Compression(e.to_string()))?;
        Ok((Cow::Owned(compressed), true))
    }
}

impl std::fmt::Debug for CompressionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionGate")
            .field("enabled", &self.enabled)
            .field("min_size", &self.min_size)
            .finish()
    }
}

/// Decompress a raw Snappy body
pub fn decompress(body: &[u8]) -> Result<Vec<u8>> {
    snap::raw::Decoder::new()
        .decompress_vec(body)
        .map_err(|e| ProtocolError::Compression(e.to_string()))
}
