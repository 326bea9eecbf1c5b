use crate::buffer::{BulkBuffer, BulkSnapshot};
use crate::config::{FailurePolicy, SinkConfig};
use crate::error::TransportError;
use crate::layer::DIAGNOSTICS_TARGET;
use crate::stats::SinkStats;
use crate::transport::BulkTransport;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Lifecycle of the remote sink. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Running,
    Stopping,
    Stopped,
}

/// Shared, monotonically advancing [`LifecycleState`].
#[derive(Debug)]
pub struct Lifecycle(AtomicU8);

impl Lifecycle {
    pub fn new() -> Self {
        Lifecycle(AtomicU8::new(LifecycleState::Running as u8))
    }

    pub fn state(&self) -> LifecycleState {
        match self.0.load(Ordering::Acquire) {
            0 => LifecycleState::Running,
            1 => LifecycleState::Stopping,
            _ => LifecycleState::Stopped,
        }
    }

    /// Move to `to` unless the lifecycle is already past it.
    pub fn advance(&self, to: LifecycleState) {
        self.0.fetch_max(to as u8, Ordering::AcqRel);
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer side of the flush request channel.
///
/// Capacity is one: while a request is pending further requests are
/// dropped, so a burst of threshold crossings results in one queued flush.
#[derive(Clone)]
pub struct FlushSignal {
    tx: mpsc::Sender<()>,
    stats: Arc<SinkStats>,
}

impl FlushSignal {
    /// Ask for a flush without blocking.
    ///
    /// **Returns** `true` if the request was queued, `false` if one was
    /// already pending or the scheduler is gone.
    pub fn request(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                SinkStats::incr(&self.stats.coalesced_signals, 1);
                false
            }
            Err(TrySendError::Closed(())) => false,
        }
    }
}

/// Consumer side of the flush request channel, owned by the scheduler.
pub struct FlushRequests(mpsc::Receiver<()>);

pub fn flush_channel(stats: Arc<SinkStats>) -> (FlushSignal, FlushRequests) {
    let (tx, rx) = mpsc::channel(1);
    (FlushSignal { tx, stats }, FlushRequests(rx))
}

/// Background loop that moves the bulk buffer to the transport.
///
/// Wakes up on the periodic interval, on a [`FlushSignal`], or on
/// cancellation. Flushes run one at a time on the loop itself, so there is
/// never more than one bulk request in flight. Cancellation triggers one
/// last flush before the loop exits.
pub struct FlushScheduler {
    buffer: Arc<BulkBuffer>,
    transport: Arc<dyn BulkTransport>,
    flush_interval: Duration,
    request_timeout: Duration,
    failure_policy: FailurePolicy,
    lifecycle: Arc<Lifecycle>,
    stats: Arc<SinkStats>,
}

impl FlushScheduler {
    pub fn new(
        buffer: Arc<BulkBuffer>,
        transport: Arc<dyn BulkTransport>,
        config: &SinkConfig,
        lifecycle: Arc<Lifecycle>,
        stats: Arc<SinkStats>,
    ) -> Self {
        FlushScheduler {
            buffer,
            transport,
            flush_interval: config.flush_interval,
            request_timeout: config.request_timeout,
            failure_policy: config.failure_policy,
            lifecycle,
            stats,
        }
    }

    /// Spawn [`run`](Self::run) on the current Tokio runtime.
    pub fn spawn(self, requests: FlushRequests, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(requests, cancel))
    }

    pub async fn run(self, mut requests: FlushRequests, cancel: CancellationToken) {
        let mut ticker = (!self.flush_interval.is_zero()).then(|| {
            let mut ticker = interval_at(Instant::now() + self.flush_interval, self.flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = next_tick(&mut ticker) => self.flush("interval").await,
                Some(()) = requests.0.recv() => self.flush("threshold").await,
            }
        }

        self.lifecycle.advance(LifecycleState::Stopping);
        if let Some(snapshot) = self.buffer.snapshot_and_close() {
            self.ship(snapshot, "shutdown").await;
        }
        self.lifecycle.advance(LifecycleState::Stopped);
        debug!(target: DIAGNOSTICS_TARGET, "log shipping stopped");
    }

    /// Snapshot the buffer and send it, if anything was buffered.
    async fn flush(&self, reason: &'static str) {
        if let Some(snapshot) = self.buffer.snapshot_and_reset() {
            self.ship(snapshot, reason).await;
        }
    }

    async fn ship(&self, snapshot: BulkSnapshot, reason: &'static str) {
        let documents = snapshot.documents();
        let bytes = snapshot.len();

        let result = match timeout(self.request_timeout, self.transport.send(&snapshot)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.request_timeout)),
        };
        SinkStats::incr(&self.stats.flushes, 1);

        match result {
            Ok(()) => debug!(target: DIAGNOSTICS_TARGET, reason, documents, bytes, "flushed log documents"),
            Err(err) => {
                SinkStats::incr(&self.stats.failed_flushes, 1);
                self.handle_failure(snapshot, err);
            }
        }
    }

    fn handle_failure(&self, snapshot: BulkSnapshot, err: TransportError) {
        let documents = snapshot.documents();
        if let FailurePolicy::Requeue { max_backlog_bytes } = self.failure_policy {
            if self.lifecycle.is_running() && self.buffer.requeue(snapshot, max_backlog_bytes) {
                warn!(target: DIAGNOSTICS_TARGET, error = %err, documents, "bulk request failed, documents kept for the next flush");
                return;
            }
        }
        SinkStats::incr(&self.stats.dropped_documents, documents as u64);
        warn!(target: DIAGNOSTICS_TARGET, error = %err, documents, "bulk request failed, dropping log documents");
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogTimeZone;
    use crate::encoder::RecordEncoder;
    use crate::record::{LogRecord, Severity};
    use crate::transport::testing::RecordingTransport;
    use async_trait::async_trait;
    use tokio::time::sleep;

    struct Harness {
        buffer: Arc<BulkBuffer>,
        transport: Arc<RecordingTransport>,
        lifecycle: Arc<Lifecycle>,
        stats: Arc<SinkStats>,
        signal: FlushSignal,
        cancel: CancellationToken,
        handle: JoinHandle<()>,
    }

    fn start(config: SinkConfig, transport: RecordingTransport) -> Harness {
        let buffer = Arc::new(BulkBuffer::new(&config.index));
        let transport = Arc::new(transport);
        let lifecycle = Arc::new(Lifecycle::new());
        let stats = Arc::new(SinkStats::default());
        let (signal, requests) = flush_channel(Arc::clone(&stats));
        let cancel = CancellationToken::new();
        let handle = FlushScheduler::new(
            Arc::clone(&buffer),
            transport.clone(),
            &config,
            Arc::clone(&lifecycle),
            Arc::clone(&stats),
        )
        .spawn(requests, cancel.clone());
        Harness {
            buffer,
            transport,
            lifecycle,
            stats,
            signal,
            cancel,
            handle,
        }
    }

    fn config(flush_interval: Duration) -> SinkConfig {
        SinkConfig {
            enabled: true,
            flush_interval,
            ..SinkConfig::default()
        }
    }

    fn append(buffer: &BulkBuffer, message: &str) -> usize {
        let doc = RecordEncoder::new(LogTimeZone::Utc, None)
            .encode(&LogRecord::new(Severity::Info, message));
        buffer.append(&doc).expect("buffer is open")
    }

    #[tokio::test(start_paused = true)]
    async fn below_threshold_waits_for_the_timer() {
        let h = start(config(Duration::from_secs(5)), RecordingTransport::default());
        append(&h.buffer, "one");
        append(&h.buffer, "two");

        sleep(Duration::from_millis(4_900)).await;
        assert_eq!(h.transport.calls(), 0);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(h.transport.calls(), 1);
        assert!(h.buffer.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_ticks_make_no_calls() {
        let h = start(config(Duration::from_secs(1)), RecordingTransport::default());
        sleep(Duration::from_secs(10)).await;
        assert_eq!(h.transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_disables_the_timer() {
        let h = start(config(Duration::ZERO), RecordingTransport::default());
        append(&h.buffer, "held");
        sleep(Duration::from_secs(3600)).await;
        assert_eq!(h.transport.calls(), 0);

        assert!(h.signal.request());
        sleep(Duration::from_millis(1)).await;
        assert_eq!(h.transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn signal_flushes_before_the_timer() {
        let h = start(config(Duration::from_secs(5)), RecordingTransport::default());
        append(&h.buffer, "urgent");
        assert!(h.signal.request());

        sleep(Duration::from_millis(1)).await;
        assert_eq!(h.transport.calls(), 1);
        assert!(h.buffer.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pending_signals_are_coalesced() {
        let h = start(config(Duration::from_secs(5)), RecordingTransport::default());
        append(&h.buffer, "burst");
        // The scheduler task has not run yet, so the first request is still
        // sitting in the channel.
        assert!(h.signal.request());
        assert!(!h.signal.request());
        assert!(!h.signal.request());
        assert_eq!(h.stats.snapshot().coalesced_signals, 2);

        sleep(Duration::from_millis(1)).await;
        assert_eq!(h.transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_drains_exactly_once() {
        let h = start(config(Duration::from_secs(5)), RecordingTransport::default());
        append(&h.buffer, "a");
        let pending = append(&h.buffer, "b");
        h.signal.request();

        h.cancel.cancel();
        h.handle.await.unwrap();

        let bodies = h.transport.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0].len(), pending);
        assert_eq!(h.lifecycle.state(), LifecycleState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_with_empty_buffer_makes_no_call() {
        let h = start(config(Duration::from_secs(5)), RecordingTransport::default());
        h.cancel.cancel();
        h.handle.await.unwrap();
        assert_eq!(h.transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_flush_is_not_retried_and_does_not_block() {
        let h = start(config(Duration::from_secs(5)), RecordingTransport::failing());
        append(&h.buffer, "lost");
        h.signal.request();
        sleep(Duration::from_millis(1)).await;
        assert_eq!(h.transport.calls(), 1);
        assert!(h.buffer.is_empty());

        append(&h.buffer, "next");
        h.signal.request();
        sleep(Duration::from_millis(1)).await;

        let bodies = h.transport.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 2);
        let second = String::from_utf8(bodies[1].clone()).unwrap();
        assert!(second.contains("next"));
        assert!(!second.contains("lost"));

        let stats = h.stats.snapshot();
        assert_eq!(stats.failed_flushes, 2);
        assert_eq!(stats.dropped_documents, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn requeue_policy_carries_failed_documents_forward() {
        let mut cfg = config(Duration::from_secs(5));
        cfg.failure_policy = FailurePolicy::Requeue {
            max_backlog_bytes: 1 << 20,
        };
        let h = start(cfg, RecordingTransport::failing());
        append(&h.buffer, "first");
        h.signal.request();
        sleep(Duration::from_millis(1)).await;
        assert!(!h.buffer.is_empty());

        h.transport.fail.store(false, Ordering::SeqCst);
        append(&h.buffer, "second");
        h.signal.request();
        sleep(Duration::from_millis(1)).await;

        let bodies = h.transport.bodies.lock().unwrap();
        let last = String::from_utf8(bodies.last().unwrap().clone()).unwrap();
        let first_at = last.find("first").unwrap();
        let second_at = last.find("second").unwrap();
        assert!(first_at < second_at);
        assert_eq!(h.stats.snapshot().dropped_documents, 0);
    }

    struct StalledTransport;

    #[async_trait]
    impl BulkTransport for StalledTransport {
        async fn send(&self, _snapshot: &BulkSnapshot) -> Result<(), TransportError> {
            std::future::pending::<Result<(), TransportError>>().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_transport_is_cut_off_by_the_request_timeout() {
        let mut cfg = config(Duration::from_secs(60));
        cfg.request_timeout = Duration::from_secs(2);
        let buffer = Arc::new(BulkBuffer::new("logs"));
        let stats = Arc::new(SinkStats::default());
        let (signal, requests) = flush_channel(Arc::clone(&stats));
        let cancel = CancellationToken::new();
        let handle = FlushScheduler::new(
            Arc::clone(&buffer),
            Arc::new(StalledTransport),
            &cfg,
            Arc::new(Lifecycle::new()),
            Arc::clone(&stats),
        )
        .spawn(requests, cancel.clone());

        append(&buffer, "stuck");
        signal.request();
        sleep(Duration::from_secs(3)).await;
        assert_eq!(stats.snapshot().failed_flushes, 1);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_the_buffer() {
        let h = start(config(Duration::from_secs(5)), RecordingTransport::default());
        append(&h.buffer, "last");
        h.cancel.cancel();
        h.handle.await.unwrap();

        assert_eq!(h.transport.calls(), 1);
        assert!(h.buffer.is_closed());
        let doc = RecordEncoder::new(LogTimeZone::Utc, None)
            .encode(&LogRecord::new(Severity::Info, "too late"));
        assert_eq!(h.buffer.append(&doc), None);
    }

    #[test]
    fn lifecycle_only_moves_forward() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.is_running());
        lifecycle.advance(LifecycleState::Stopped);
        lifecycle.advance(LifecycleState::Stopping);
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }
}
