//! Environment variable names used by [`SinkConfig::from_env`].
//!
//! These are purely helpers; the core sink types remain decoupled from
//! environment access.
//!
//! [`SinkConfig::from_env`]: crate::config::SinkConfig::from_env

/// Enables remote shipping when set to a truthy value.
pub const ELASTIC_ENABLED_ENV: &str = "ELASTIC_ENABLED";

/// Comma-separated backend addresses, e.g. `http://es1:9200,http://es2:9200`.
pub const ELASTIC_ADDRESSES_ENV: &str = "ELASTIC_ADDRESSES";

/// Target index name.
pub const ELASTIC_INDEX_ENV: &str = "ELASTIC_INDEX";

/// API key; takes precedence over username/password.
pub const ELASTIC_API_KEY_ENV: &str = "ELASTIC_API_KEY";

pub const ELASTIC_USERNAME_ENV: &str = "ELASTIC_USERNAME";

pub const ELASTIC_PASSWORD_ENV: &str = "ELASTIC_PASSWORD";

/// Buffer size in bytes that forces an early flush.
pub const ELASTIC_BULK_FLUSH_BYTES_ENV: &str = "ELASTIC_BULK_FLUSH_BYTES";

/// Periodic flush cadence in milliseconds; `0` disables the timer.
pub const ELASTIC_BULK_FLUSH_INTERVAL_MS_ENV: &str = "ELASTIC_BULK_FLUSH_INTERVAL_MS";

/// Minimum level shipped to the backend.
pub const ELASTIC_LOG_LEVEL_ENV: &str = "ELASTIC_LOG_LEVEL";

/// Minimum level written to stdout.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Zone used to render timestamps: `UTC`, `Local` or an offset like `+07:00`.
pub const LOG_TZ_ENV: &str = "LOG_TZ";

/// Logical service name stamped on every document.
pub const APP_NAME_ENV: &str = "APP_NAME";

/// Read an environment variable or fall back to a provided default.
///
/// Blank values count as unset.
pub fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default.to_string(),
    }
}

pub fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

pub fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

pub fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "t" | "T" | "TRUE" | "true" | "True" | "yes" | "y" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Split a comma-separated list, dropping blank entries.
pub fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
