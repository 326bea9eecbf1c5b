use std::time::Duration;

/// Error returned by a [`BulkTransport`](crate::transport::BulkTransport)
/// when a bulk request could not be delivered.
///
/// These never reach the application's logging call sites; the flush
/// scheduler reports them through `tracing` and moves on.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[cfg(feature = "elasticsearch")]
    #[error("bulk request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("bulk request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("bulk request rejected {failed} of {total} documents")]
    Rejected { failed: usize, total: usize },

    #[error("bulk request timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid bulk response: {0}")]
    Response(#[from] serde_json::Error),
}

/// Error raised while turning a [`SinkConfig`](crate::config::SinkConfig)
/// into a running remote sink.
///
/// A configuration error never fails startup: the logger degrades to
/// local-only output and reports the error as a warning.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("no backend addresses configured")]
    NoAddresses,

    #[error("invalid backend address {0:?}")]
    InvalidAddress(String),

    #[error("unknown time zone {0:?}")]
    InvalidTimeZone(String),

    #[error("remote shipping requires the `elasticsearch` feature")]
    TransportUnavailable,

    #[cfg(feature = "elasticsearch")]
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}
