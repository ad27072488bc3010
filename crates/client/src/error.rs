//! Error types for the ingress API

use thiserror::Error;

use shipper_config::ConfigError;
use shipper_pipeline::BufferError;
use shipper_routing::DiscoveryError;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors returned by [`Shipper`](crate::Shipper)
#[derive(Debug, Error)]
pub enum ClientError {
    // =========================================================================
    // Request validation
    // =========================================================================
    /// Payload is empty
    #[error("payload is empty")]
    EmptyPayload,

    /// Payload exceeds the configured maximum message size
    #[error("record too large: {size} bytes exceeds maximum {max} bytes")]
    RecordTooLarge { size: usize, max: usize },

    /// Group id is empty
    #[error("group id is empty")]
    InvalidGroupId,

    // =========================================================================
    // Lifecycle
    // =========================================================================
    /// `close` has been called
    #[error("shipper is shutting down")]
    ShuttingDown,

    /// Configuration failed validation
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Static discovery entries could not be loaded
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    // =========================================================================
    // Buffering
    // =========================================================================
    /// The receive buffer rejected the record
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

impl ClientError {
    /// True if the same request may succeed later
    #[inline]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Buffer(e) => e.is_retryable(),
            _ => false,
        }
    }
}
