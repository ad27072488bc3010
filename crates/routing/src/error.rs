//! Routing error types

use thiserror::Error;

/// Result type for routing operations
pub type Result<T> = std::result::Result<T, RoutingError>;

/// Errors raised by the channel router
#[derive(Debug, Error)]
pub enum RoutingError {
    /// No pool exists and the resolver does not know the destination
    #[error("no channel pool for destination '{key}'")]
    NoPool {
        /// Destination key that was looked up
        key: String,
    },

    /// The factory could not open a channel for a new pool
    #[error("failed to open channel {index} for destination '{key}': {source}")]
    OpenFailed {
        key: String,
        index: usize,
        #[source]
        source: ChannelError,
    },

    /// The selected channel rejected the packet
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl RoutingError {
    /// Create a NoPool error
    #[inline]
    pub fn no_pool(key: impl Into<String>) -> Self {
        Self::NoPool { key: key.into() }
    }
}

/// Errors reported by a transport channel
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Channel queue is saturated
    #[error("channel '{name}' is full")]
    Full { name: String },

    /// Channel is closed or not connected
    #[error("channel '{name}' is unavailable")]
    Unavailable { name: String },

    /// Transport-level failure
    #[error("transport error: {0}")]
    Transport(String),
}

impl ChannelError {
    /// Create a Full error
    #[inline]
    pub fn full(name: impl Into<String>) -> Self {
        Self::Full { name: name.into() }
    }

    /// Create an Unavailable error
    #[inline]
    pub fn unavailable(name: impl Into<String>) -> Self {
        Self::Unavailable { name: name.into() }
    }

    /// Create a Transport error
    #[inline]
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

/// Errors reported by a discovery source
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    /// The source has no entry for the group
    #[error("group '{group_id}' not found")]
    NotFound { group_id: String },

    /// An endpoint string could not be parsed
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// The remote source could not be reached
    #[error("discovery unavailable: {0}")]
    Unavailable(String),
}

impl DiscoveryError {
    /// Create a NotFound error
    #[inline]
    pub fn not_found(group_id: impl Into<String>) -> Self {
        Self::NotFound {
            group_id: group_id.into(),
        }
    }

    /// Create an InvalidEndpoint error
    #[inline]
    pub fn invalid_endpoint(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }
}
