//! In-process channel backed by a bounded tokio queue
//!
//! `MpscChannel` wraps a `tokio::sync::mpsc::Sender` so an embedding
//! application can receive packets on its own writer task and do the actual
//! network I/O there.

use std::sync::Arc;

use shipper_protocol::WirePacket;
use tokio::sync::mpsc;

use crate::channel::Channel;
use crate::error::ChannelError;

/// Channel that forwards packets into a bounded mpsc queue
///
/// # Design
///
/// - `push` uses `try_send`, so a full queue is reported instead of waited on
/// - Packets travel as `Arc<WirePacket>`; no bytes are copied
/// - A dropped receiver makes the channel unavailable
///
/// # Example
///
/// ```
/// use shipper_routing::{Channel, MpscChannel};
///
/// let (channel, rx) = MpscChannel::pair("c1-0", 16);
/// assert!(channel.is_available());
/// assert!(!channel.is_full());
/// # drop(rx);
/// ```
pub struct MpscChannel {
    name: String,
    sender: mpsc::Sender<Arc<WirePacket>>,
}

impl MpscChannel {
    /// Wrap an existing sender
    #[inline]
    pub fn new(name: impl Into<String>, sender: mpsc::Sender<Arc<WirePacket>>) -> Self {
        Self {
            name: name.into(),
            sender,
        }
    }

    /// Create a channel and the receiver its packets arrive on
    pub fn pair(
        name: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Arc<WirePacket>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(name, tx), rx)
    }

    /// Remaining queue capacity
    #[inline]
    pub fn capacity(&self) -> usize {
        self.sender.capacity()
    }

    /// Maximum queue capacity
    #[inline]
    pub fn max_capacity(&self) -> usize {
        self.sender.max_capacity()
    }
}

impl Channel for MpscChannel {
    fn push(&self, packet: Arc<WirePacket>) -> Result<(), ChannelError> {
        self.sender.try_send(packet).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ChannelError::full(&self.name),
            mpsc::error::TrySendError::Closed(_) => ChannelError::unavailable(&self.name),
        })
    }

    #[inline]
    fn is_available(&self) -> bool {
        !self.sender.is_closed()
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.sender.capacity() == 0
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for MpscChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpscChannel")
            .field("name", &self.name)
            .field("closed", &self.sender.is_closed())
            .field("capacity", &self.sender.capacity())
            .finish()
    }
}
