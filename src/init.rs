use crate::config::SinkConfig;
use crate::logger::BulkLogger;
use tokio_util::sync::CancellationToken;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Build a [`BulkLogger`] from `config` and install its layer as the global
/// `tracing` subscriber.
///
/// **Parameters**
/// - `config`: [`SinkConfig`] controlling local output and remote shipping.
/// - `cancel`: token governing the background flush task; cancelling it
///   drains the buffer once.
///
/// **Returns**
///
/// The logger handle. Keep it for the lifetime of the process and call
/// [`BulkLogger::stop`] during shutdown, otherwise documents buffered at
/// exit are lost.
///
/// Fails only if a global subscriber was already installed.
pub fn init_tracing_with_config(
    config: SinkConfig,
    cancel: CancellationToken,
) -> Result<BulkLogger, SetGlobalDefaultError> {
    let logger = BulkLogger::new(config, cancel);

    // Логгер сам пишет в stdout через локальный sink, поэтому отдельный
    // `fmt`-слой здесь не нужен: иначе каждое событие печаталось бы дважды.
    let subscriber = Registry::default().with(logger.layer());
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(logger)
}

/// Initialize tracing from the environment.
///
/// Equivalent to calling [`init_tracing_with_config`] with
/// [`SinkConfig::from_env`] and a fresh cancellation token. This is the
/// recommended entrypoint for typical services.
pub fn init_tracing() -> Result<BulkLogger, SetGlobalDefaultError> {
    init_tracing_with_config(SinkConfig::from_env(), CancellationToken::new())
}
