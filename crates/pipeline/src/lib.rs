//! Shipper Pipeline - per-destination receive buffers
//!
//! Records submitted by callers are queued per destination key, cut into
//! (group, stream) sub-batches under size/time pressure, packed into wire
//! packets and pushed to a channel picked by the `ChannelRouter`.
//!
//! # Architecture
//!
//! ```text
//! send() ──→ ReceiveBuffer::submit ──→ [queue]
//!                                          │  maybe_flush (dispatch tick)
//!                                          ▼
//!                      drain ──→ sub-batches ──→ Packer ──→ WirePacket
//!                                                              │
//!                                    ChannelRouter::select ──→ Channel::push
//! ```
//!
//! # Key Design
//!
//! - **Fail-fast backpressure**: `submit` rejects with `BufferFull` instead of
//!   blocking
//! - **Routing before draining**: a flush that cannot get a usable channel
//!   leaves the queue untouched
//! - **No requeue**: once drained, a record is either delivered to a channel or
//!   reported through its failure callback
//! - **Shared context**: configuration and id generation live in one
//!   `SdkContext` handed to every buffer
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use shipper_config::Config;
//! use shipper_pipeline::{ReceiveBuffer, SdkContext, SendRequest};
//! use shipper_routing::{
//!     Channel, ChannelError, ChannelRouter, DestinationResolver, Endpoint, EndpointSet,
//!     MpscChannel, StaticDiscovery,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let discovery = StaticDiscovery::new().with_group(
//!     "g1",
//!     EndpointSet::new(vec![Endpoint::new("10.0.0.1", 46801)]).with_cluster("c1"),
//! );
//! let resolver = Arc::new(DestinationResolver::new(Arc::new(discovery), Duration::from_secs(60)));
//! resolver.watch("g1");
//! resolver.refresh().await;
//!
//! let (channel, mut rx) = MpscChannel::pair("c1-0", 16);
//! let channel: Arc<dyn Channel> = Arc::new(channel);
//! let factory = move |_: &str, _: usize, _: &EndpointSet| Ok::<_, ChannelError>(channel.clone());
//! let router = Arc::new(ChannelRouter::new(resolver, Arc::new(factory), 1));
//!
//! let context = Arc::new(SdkContext::new(Arc::new(Config::default())));
//! let buffer = ReceiveBuffer::new("c1", context, router);
//! buffer.submit(SendRequest::new(&b"hello"[..], "g1", "s1")).unwrap();
//!
//! let report = buffer.flush().unwrap();
//! assert_eq!(report.packets_sent, 1);
//! assert_eq!(rx.try_recv().unwrap().record_count(), 1);
//! # });
//! ```

mod buffer;
mod context;
mod error;
mod id;
mod metrics;
mod request;
pub mod time;

pub use buffer::{FlushReport, ReceiveBuffer};
pub use context::SdkContext;
pub use error::{BufferError, Result};
pub use id::IdGenerator;
pub use metrics::{BufferMetrics, MetricsSnapshot, RejectionTracker};
pub use request::SendRequest;

#[cfg(test)]
mod buffer_test;
