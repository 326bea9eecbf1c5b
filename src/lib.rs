pub mod buffer;
pub mod config;
pub mod dispatcher;
pub mod encoder;
pub mod env;
pub mod error;
pub mod layer;
pub mod logger;
pub mod record;
pub mod scheduler;
pub mod stats;
pub mod transport;

#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;

pub mod init;
pub mod noop_transport;

pub use config::SinkConfig;
pub use logger::BulkLogger;
pub use record::{LogRecord, Severity};
