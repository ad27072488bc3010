//! Shipper - the ingress facade
//!
//! Owns the shared context, the resolver, the channel router and one
//! `ReceiveBuffer` per destination key, plus the two background tasks that
//! keep them moving.
//!
//! # Design
//!
//! - `send` validates, resolves the destination key and queues into the
//!   matching buffer; it never awaits
//! - The dispatch task ticks every `dispatch_interval` and calls
//!   `maybe_flush` on every buffer
//! - The resolver task refreshes destinations every `refresh_interval`
//! - Both tasks share one `CancellationToken`; `close` cancels it, joins the
//!   tasks and then drains what is left

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use shipper_config::Config;
use shipper_pipeline::{BufferError, MetricsSnapshot, ReceiveBuffer, SdkContext, SendRequest};
use shipper_routing::{
    ChannelFactory, ChannelRouter, DestinationResolver, Discovery, StaticDiscovery,
};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{ClientError, Result};

/// How long `close` waits for each background task
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of [`Shipper::close`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Records flushed to channels during the final drain
    pub drained: usize,
    /// Records discarded because they could not be flushed
    pub abandoned: usize,
}

/// Client entry point
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use shipper_client::Shipper;
/// use shipper_config::Config;
/// use shipper_routing::{Channel, ChannelError, EndpointSet, MpscChannel};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let config: Config = r#"
///     [sdk]
///     group_ids = ["g1"]
///     [discovery.static.g1]
///     cluster_id = "c1"
///     endpoints = ["10.0.0.1:46801"]
/// "#.parse().unwrap();
///
/// let (channel, mut rx) = MpscChannel::pair("c1-0", 16);
/// let channel: Arc<dyn Channel> = Arc::new(channel);
/// let factory = move |_: &str, _: usize, _: &EndpointSet| Ok::<_, ChannelError>(channel.clone());
///
/// let shipper = Shipper::start_static(config, Arc::new(factory)).await.unwrap();
/// shipper.send(&b"hello"[..], "g1", "s1").unwrap();
///
/// let report = shipper.close().await;
/// assert_eq!(report.drained, 1);
/// assert_eq!(rx.try_recv().unwrap().record_count(), 1);
/// # });
/// ```
pub struct Shipper {
    context: Arc<SdkContext>,
    resolver: Arc<DestinationResolver>,
    router: Arc<ChannelRouter>,
    buffers: Arc<RwLock<HashMap<String, Arc<ReceiveBuffer>>>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Shipper {
    // =========================================================================
    // Startup
    // =========================================================================

    /// Validate `config`, resolve the configured groups and spawn the
    /// background tasks
    ///
    /// Must be called inside a tokio runtime. Groups that fail to resolve are
    /// logged and retried on every refresh.
    pub async fn start(
        config: Config,
        discovery: Arc<dyn Discovery>,
        factory: Arc<dyn ChannelFactory>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let sdk = &config.sdk;

        let resolver = Arc::new(DestinationResolver::from_config(discovery, &config.discovery));
        for group_id in &sdk.group_ids {
            resolver.watch(group_id);
        }
        let refreshed = resolver.refresh().await;

        let router = Arc::new(ChannelRouter::new(
            Arc::clone(&resolver),
            factory,
            sdk.channels_per_destination,
        ));
        let keys: Vec<String> = sdk.group_ids.iter().map(|g| resolver.group_key(g)).collect();
        let pools = router.warm_up(&keys);

        info!(
            groups = sdk.group_ids.len(),
            resolved = refreshed.resolved,
            failed = refreshed.failed,
            pools,
            "shipper started"
        );

        let shipper = Self {
            context: Arc::new(SdkContext::new(Arc::clone(&config))),
            resolver: Arc::clone(&resolver),
            router,
            buffers: Arc::new(RwLock::new(HashMap::new())),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::with_capacity(2)),
            closed: AtomicBool::new(false),
        };

        let resolver_task = tokio::spawn(resolver.run(shipper.cancel.clone()));
        let dispatch_task = tokio::spawn(dispatch_loop(
            Arc::clone(&shipper.buffers),
            sdk.dispatch_interval,
            shipper.cancel.clone(),
        ));
        shipper.tasks.lock().extend([resolver_task, dispatch_task]);

        Ok(shipper)
    }

    /// Start with destinations taken from `[discovery.static.*]`
    pub async fn start_static(config: Config, factory: Arc<dyn ChannelFactory>) -> Result<Self> {
        let discovery = StaticDiscovery::from_config(&config.discovery)?;
        Self::start(config, Arc::new(discovery), factory).await
    }

    // =========================================================================
    // Ingress
    // =========================================================================

    /// Queue one record for `group_id` / `stream_id`
    #[inline]
    pub fn send(
        &self,
        payload: impl Into<bytes::Bytes>,
        group_id: impl Into<String>,
        stream_id: impl Into<String>,
    ) -> Result<()> {
        self.send_with(SendRequest::new(payload, group_id, stream_id))
    }

    /// Queue one record with optional client ip, report time and callback
    ///
    /// The callback fires only if the record is accepted here and later fails
    /// to be delivered. On error the request is dropped without invoking it.
    pub fn send_with(&self, request: SendRequest) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::ShuttingDown);
        }
        let max = self.context.config().sdk.max_message_size;
        if request.payload.is_empty() {
            return Err(ClientError::EmptyPayload);
        }
        if request.payload.len() > max {
            return Err(ClientError::RecordTooLarge {
                size: request.payload.len(),
                max,
            });
        }
        if request.group_id.is_empty() {
            return Err(ClientError::InvalidGroupId);
        }

        if self.resolver.watch(&request.group_id) {
            debug!(group_id = %request.group_id, "watching new group");
        }
        let key = self.resolver.group_key(&request.group_id);
        let buffer = self.buffer(&key);
        buffer.submit(request)?;

        if buffer.buffered_bytes() > self.context.config().sdk.pack_size {
            if let Err(e) = buffer.maybe_flush(Instant::now()) {
                trace!(destination = %key, error = %e, "inline flush deferred to dispatch");
            }
        }
        Ok(())
    }

    fn buffer(&self, key: &str) -> Arc<ReceiveBuffer> {
        if let Some(buffer) = self.buffers.read().get(key) {
            return Arc::clone(buffer);
        }
        let mut buffers = self.buffers.write();
        let buffer = buffers.entry(key.to_string()).or_insert_with(|| {
            debug!(destination = %key, "receive buffer created");
            Arc::new(ReceiveBuffer::new(
                key,
                Arc::clone(&self.context),
                Arc::clone(&self.router),
            ))
        });
        Arc::clone(buffer)
    }

    /// Flush every buffer that has queued records, regardless of thresholds
    ///
    /// Returns the number of records drained. Routing errors are logged and
    /// leave the affected buffers queued.
    pub fn flush_all(&self) -> usize {
        let mut drained = 0;
        for buffer in self.snapshot_buffers() {
            if buffer.is_empty() {
                continue;
            }
            match buffer.flush() {
                Ok(report) => drained += report.drained,
                Err(e) => debug!(destination = %buffer.key(), error = %e, "flush skipped"),
            }
        }
        drained
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Metrics summed over every buffer
    pub fn metrics(&self) -> MetricsSnapshot {
        self.snapshot_buffers()
            .iter()
            .fold(MetricsSnapshot::default(), |acc, b| acc.merge(&b.metrics()))
    }

    /// Bytes queued across every buffer
    pub fn buffered_bytes(&self) -> usize {
        self.snapshot_buffers().iter().map(|b| b.buffered_bytes()).sum()
    }

    /// Destination keys that have a buffer
    pub fn destinations(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.buffers.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Shared context
    #[inline]
    pub fn context(&self) -> &Arc<SdkContext> {
        &self.context
    }

    /// Destination resolver
    #[inline]
    pub fn resolver(&self) -> &Arc<DestinationResolver> {
        &self.resolver
    }

    /// Channel router
    #[inline]
    pub fn router(&self) -> &Arc<ChannelRouter> {
        &self.router
    }

    /// True once `close` has been called
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn snapshot_buffers(&self) -> Vec<Arc<ReceiveBuffer>> {
        self.buffers.read().values().cloned().collect()
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Stop accepting records, stop the background tasks and drain
    ///
    /// Each buffer gets enough flush rounds to empty a full queue. Records
    /// still queued after that are discarded and their callbacks fire.
    /// Calling `close` again returns an empty report.
    pub async fn close(&self) -> ShutdownReport {
        if self.closed.swap(true, Ordering::AcqRel) {
            return ShutdownReport::default();
        }
        info!("shipper shutting down");
        self.cancel.cancel();

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "background task panicked"),
                Err(_) => warn!("background task did not stop in time"),
            }
        }

        let sdk = &self.context.config().sdk;
        let max_rounds = sdk.max_buffer_bytes / sdk.pack_size.max(1) + 2;

        let mut report = ShutdownReport::default();
        for buffer in self.snapshot_buffers() {
            report.drained += buffer.drain_all(max_rounds);
            report.abandoned += buffer.abandon();
        }

        info!(
            drained = report.drained,
            abandoned = report.abandoned,
            "shipper stopped"
        );
        report
    }
}

impl Drop for Shipper {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Shipper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shipper")
            .field("buffers", &self.buffers.read().len())
            .field("pools", &self.router.pool_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Tick every `interval`, flushing buffers whose size or timeout is due
async fn dispatch_loop(
    buffers: Arc<RwLock<HashMap<String, Arc<ReceiveBuffer>>>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(interval_ms = interval.as_millis() as u64, "dispatch loop started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("dispatch loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                let snapshot: Vec<Arc<ReceiveBuffer>> = buffers.read().values().cloned().collect();
                let now = Instant::now();
                for buffer in snapshot {
                    match buffer.maybe_flush(now) {
                        Ok(Some(report)) if !report.is_complete() => {
                            debug!(
                                destination = %buffer.key(),
                                failed = report.packets_failed,
                                "flush completed with failures"
                            );
                        }
                        Ok(_) => {}
                        Err(e @ BufferError::NothingToSend { .. }) => {
                            trace!(destination = %buffer.key(), error = %e, "nothing to flush");
                        }
                        Err(e) => {
                            debug!(destination = %buffer.key(), error = %e, "flush deferred");
                        }
                    }
                }
            }
        }
    }
}
