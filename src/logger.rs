use crate::buffer::BulkBuffer;
use crate::config::{LogTimeZone, SinkConfig};
use crate::dispatcher::{Dispatcher, LocalSink, RemoteSink, SinkTarget};
use crate::encoder::RecordEncoder;
use crate::error::ConfigError;
use crate::layer::{BulkLogLayer, DIAGNOSTICS_TARGET};
use crate::record::LogRecord;
use crate::scheduler::{flush_channel, FlushScheduler, Lifecycle, LifecycleState};
use crate::stats::{SinkStats, StatsSnapshot};
use crate::transport::BulkTransport;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Handle to the whole logging pipeline: local sink, optional remote
/// shipping, and the background flush task.
///
/// Construct one at startup, pass it (or its [`layer`](Self::layer)) to
/// whatever needs to log, and call [`stop`](Self::stop) during shutdown so
/// buffered documents are drained.
///
/// Construction never fails. Problems with the remote half (bad address,
/// unknown time zone, no Tokio runtime) are reported as warnings and the
/// logger continues with whatever still works, at worst local output only.
pub struct BulkLogger {
    dispatcher: Arc<Dispatcher>,
    lifecycle: Arc<Lifecycle>,
    stats: Arc<SinkStats>,
    buffer: Option<Arc<BulkBuffer>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BulkLogger {
    /// Build a logger writing to stdout and, when `config.enabled`, shipping
    /// to Elasticsearch.
    ///
    /// **Parameters**
    /// - `config`: sink settings, see [`SinkConfig`].
    /// - `cancel`: cancelling this token (or calling [`stop`](Self::stop))
    ///   makes the flush task drain the buffer once and exit.
    ///
    /// Must be called from within a Tokio runtime for remote shipping to
    /// start.
    pub fn new(config: SinkConfig, cancel: CancellationToken) -> Self {
        let local = LocalSink::stdout(config.local_level);
        Self::build(config, local, remote_transport, cancel)
    }

    /// Build a logger around a caller-supplied transport and local sink.
    pub fn with_transport(
        config: SinkConfig,
        transport: Arc<dyn BulkTransport>,
        local: LocalSink,
        cancel: CancellationToken,
    ) -> Self {
        Self::build(config, local, move |_| Ok(transport), cancel)
    }

    fn build(
        config: SinkConfig,
        local: LocalSink,
        transport: impl FnOnce(&SinkConfig) -> Result<Arc<dyn BulkTransport>, ConfigError>,
        parent: CancellationToken,
    ) -> Self {
        let time_zone = LogTimeZone::parse(&config.time_zone).unwrap_or_else(|err| {
            warn!(target: DIAGNOSTICS_TARGET, error = %err, "rendering log timestamps in UTC");
            LogTimeZone::Utc
        });
        let encoder = RecordEncoder::new(time_zone, config.service_name.clone());
        let lifecycle = Arc::new(Lifecycle::new());
        let stats = Arc::new(SinkStats::default());
        let cancel = parent.child_token();

        let mut targets = vec![SinkTarget::Local(local)];
        let mut buffer = None;
        let mut task = None;

        if config.enabled {
            match (transport(&config), Handle::try_current()) {
                (Ok(transport), Ok(_runtime)) => {
                    let bulk = Arc::new(BulkBuffer::new(&config.index));
                    let (signal, requests) = flush_channel(Arc::clone(&stats));
                    targets.push(SinkTarget::Remote(RemoteSink::new(
                        Arc::clone(&bulk),
                        signal,
                        config.flush_bytes,
                        Arc::clone(&lifecycle),
                        config.remote_level,
                    )));

                    let scheduler = FlushScheduler::new(
                        Arc::clone(&bulk),
                        transport,
                        &config,
                        Arc::clone(&lifecycle),
                        Arc::clone(&stats),
                    );
                    task = Some(scheduler.spawn(requests, cancel.clone()));
                    buffer = Some(bulk);
                }
                (Err(err), _) => {
                    warn!(
                        target: DIAGNOSTICS_TARGET,
                        error = %err,
                        "remote log shipping disabled, logging locally only"
                    );
                }
                (Ok(_), Err(err)) => {
                    warn!(
                        target: DIAGNOSTICS_TARGET,
                        error = %err,
                        "remote log shipping needs a Tokio runtime, logging locally only"
                    );
                }
            }
        }

        BulkLogger {
            dispatcher: Arc::new(Dispatcher::new(encoder, targets, Arc::clone(&stats))),
            lifecycle,
            stats,
            buffer,
            cancel,
            task: Mutex::new(task),
        }
    }

    /// Write a record to every sink that accepts its severity.
    ///
    /// Never blocks on the network and never fails.
    pub fn emit(&self, record: LogRecord) {
        self.dispatcher.emit(&record);
    }

    /// A `tracing` layer feeding this logger.
    pub fn layer(&self) -> BulkLogLayer {
        BulkLogLayer::new(Arc::clone(&self.dispatcher))
    }

    /// Whether records are being shipped to the remote backend.
    pub fn is_shipping(&self) -> bool {
        self.dispatcher.ships_remotely() && self.lifecycle.is_running()
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Bytes currently waiting for the next flush.
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.as_ref().map_or(0, |b| b.len())
    }

    /// Stop accepting remote records, flush what is buffered once, and wait
    /// for that flush attempt to finish.
    ///
    /// The wait is bounded by the request timeout. Returns immediately on
    /// later calls.
    pub async fn stop(&self) {
        self.lifecycle.advance(LifecycleState::Stopping);
        self.cancel.cancel();

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!(target: DIAGNOSTICS_TARGET, error = %err, "log flush task ended abnormally");
            }
        }
        self.lifecycle.advance(LifecycleState::Stopped);
    }
}

impl Drop for BulkLogger {
    // Lets the flush task drain in the background when `stop` was never
    // awaited. Only the child token is cancelled.
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(feature = "elasticsearch")]
fn remote_transport(config: &SinkConfig) -> Result<Arc<dyn BulkTransport>, ConfigError> {
    let transport = crate::elasticsearch::ElasticsearchTransport::from_config(config)?;
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "elasticsearch"))]
fn remote_transport(_config: &SinkConfig) -> Result<Arc<dyn BulkTransport>, ConfigError> {
    Err(ConfigError::TransportUnavailable)
}
