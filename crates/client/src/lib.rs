//! Shipper Client - the ingress API
//!
//! `Shipper` ties the pieces together: it resolves a group to its
//! destination key, queues records in that destination's receive buffer and
//! runs the background tasks that flush buffers and refresh destinations.
//!
//! # Lifecycle
//!
//! ```text
//! start ──→ validate config ──→ watch + refresh groups ──→ warm up pools
//!       └─→ spawn resolver refresh task + dispatch task
//!
//! send ──→ validate ──→ group_key ──→ ReceiveBuffer::submit
//!
//! close ──→ cancel ──→ join tasks ──→ drain_all ──→ abandon leftovers
//! ```
//!
//! Packets leave through the `Channel` implementations produced by the
//! caller's `ChannelFactory`. `shipper_routing::MpscChannel` hands them to a
//! tokio receiver for applications that do their own I/O.
//!
//! # Logging
//!
//! Every component logs through `tracing`. Call [`logging::init`] once to
//! install a subscriber from the `[log]` section, or install your own.

mod error;
pub mod logging;
mod shipper;

pub use error::{ClientError, Result};
pub use shipper::{ShutdownReport, Shipper};

pub use shipper_config::Config;
pub use shipper_pipeline::{MetricsSnapshot, SendRequest};
