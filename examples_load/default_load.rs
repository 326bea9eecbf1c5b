use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

use tracing_bulk_sink::dispatcher::LocalSink;
use tracing_bulk_sink::noop_transport::NoopTransport;
use tracing_bulk_sink::{BulkLogger, Severity, SinkConfig};

#[tokio::main]
async fn main() {
    let config = SinkConfig {
        enabled: true,
        ..SinkConfig::default()
    };
    // Local output is muted so the numbers measure the buffering path only.
    let logger = BulkLogger::with_transport(
        config,
        Arc::new(NoopTransport),
        LocalSink::new(std::io::sink(), Severity::Fatal),
        CancellationToken::new(),
    );
    tracing::subscriber::set_global_default(Registry::default().with(logger.layer()))
        .expect("set global subscriber");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    logger.stop().await;

    let stats = logger.stats();
    println!(
        "default config: sent {} events in {:?} (~{:.0} ev/s), {} bulk requests",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64(),
        stats.flushes
    );
}
