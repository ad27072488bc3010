//! Transport channel seam
//!
//! A `Channel` is an already-established outbound transport endpoint. The
//! router never connects anything itself: a `ChannelFactory` opens the
//! channels of a pool when the pool is first needed.

use std::sync::Arc;

use shipper_protocol::WirePacket;

use crate::endpoint::EndpointSet;
use crate::error::ChannelError;

/// Outbound transport channel
///
/// `push` must not block on I/O; implementations queue the packet and return.
pub trait Channel: Send + Sync {
    /// Hand a packet to the transport
    fn push(&self, packet: Arc<WirePacket>) -> Result<(), ChannelError>;

    /// True if the channel can currently accept packets
    fn is_available(&self) -> bool;

    /// True if the channel's queue is saturated
    fn is_full(&self) -> bool;

    /// Channel name for logging
    fn name(&self) -> &str;
}

/// Opens the channels of a destination pool
pub trait ChannelFactory: Send + Sync {
    /// Open channel `index` of the pool for `key`
    ///
    /// `endpoints` is the resolver's current endpoint set for the key.
    fn open(
        &self,
        key: &str,
        index: usize,
        endpoints: &EndpointSet,
    ) -> Result<Arc<dyn Channel>, ChannelError>;
}

impl<F> ChannelFactory for F
where
    F: Fn(&str, usize, &EndpointSet) -> Result<Arc<dyn Channel>, ChannelError> + Send + Sync,
{
    fn open(
        &self,
        key: &str,
        index: usize,
        endpoints: &EndpointSet,
    ) -> Result<Arc<dyn Channel>, ChannelError> {
        self(key, index, endpoints)
    }
}
