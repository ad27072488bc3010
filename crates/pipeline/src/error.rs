//! Receive buffer error types

use thiserror::Error;

use shipper_protocol::ProtocolError;
use shipper_routing::ChannelError;

/// Receive buffer errors
///
/// Routing kinds (`NoChannel`, `ChannelUnavailable`, `ChannelFull`) leave the
/// queue untouched, so the next flush trigger retries them naturally.
#[derive(Debug, Error)]
pub enum BufferError {
    /// Accepting the record would exceed the buffer capacity
    #[error("buffer full for {key}: {buffered} bytes buffered, {size} more exceeds capacity {capacity}")]
    BufferFull {
        key: String,
        buffered: usize,
        size: usize,
        capacity: usize,
    },

    /// The buffer has no destination key
    #[error("invalid destination: empty key")]
    InvalidDestination,

    /// Flush called on an empty queue
    #[error("nothing to send for {key}")]
    NothingToSend { key: String },

    /// No channel pool exists for the destination
    #[error("no channel for {key}")]
    NoChannel { key: String },

    /// The selected channel cannot take packets
    #[error("channel unavailable for {key}")]
    ChannelUnavailable { key: String },

    /// The selected channel's queue is saturated
    #[error("channel full for {key}")]
    ChannelFull { key: String },

    /// A sub-batch could not be packed
    #[error("serialization failed for {key}: {source}")]
    SerializationFailed {
        key: String,
        #[source]
        source: ProtocolError,
    },

    /// The channel rejected a packed packet for a transport reason
    #[error("send failed for {key}: {source}")]
    SendFailed {
        key: String,
        #[source]
        source: ChannelError,
    },
}

impl BufferError {
    /// Map a channel push error onto the matching buffer error
    pub fn from_channel(key: impl Into<String>, err: ChannelError) -> Self {
        let key = key.into();
        match err {
            ChannelError::Full { .. } => Self::ChannelFull { key },
            ChannelError::Unavailable { .. } => Self::ChannelUnavailable { key },
            source @ ChannelError::Transport(_) => Self::SendFailed { key, source },
        }
    }

    /// True if retrying later can succeed without caller changes
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BufferFull { .. }
                | Self::NoChannel { .. }
                | Self::ChannelUnavailable { .. }
                | Self::ChannelFull { .. }
        )
    }
}

/// Result type for receive buffer operations
pub type Result<T> = std::result::Result<T, BufferError>;
