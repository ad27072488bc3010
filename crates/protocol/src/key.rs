//! Stream identification types
//!
//! `StreamKey` identifies the (group, stream) pair a record belongs to.
//! Records sharing a key are packed into the same sub-batch.

use std::fmt;

/// (group id, stream id) pair used to split a flush into sub-batches
///
/// # Example
///
/// ```
/// use shipper_protocol::StreamKey;
///
/// let key = StreamKey::new("g1", "s1");
/// assert_eq!(key.group_id(), "g1");
/// assert_eq!(key.to_string(), "g1/s1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey {
    group_id: String,
    stream_id: String,
}

impl StreamKey {
    /// Create a new stream key
    #[inline]
    pub fn new(group_id: impl Into<String>, stream_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            stream_id: stream_id.into(),
        }
    }

    /// Group id half of the key
    #[inline]
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Stream id half of the key
    #[inline]
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group_id, self.stream_id)
    }
}

impl From<(&str, &str)> for StreamKey {
    fn from((group_id, stream_id): (&str, &str)) -> Self {
        Self::new(group_id, stream_id)
    }
}
