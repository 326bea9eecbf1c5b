use crate::env::{self, env_bool, env_or, env_u64, env_usize, split_csv};
use crate::error::ConfigError;
use crate::record::Severity;
use chrono::{DateTime, FixedOffset, Local, SecondsFormat, Utc};
use std::fmt;
use std::time::Duration;

/// Default byte threshold that forces a flush before the timer fires.
pub const DEFAULT_FLUSH_BYTES: usize = 1_000_000;
/// Default periodic flush cadence.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(5_000);
/// Default upper bound for a single bulk request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Credential used against the backend.
///
/// An API key always wins over username/password when both are supplied.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    None,
    ApiKey(String),
    Basic { username: String, password: String },
}

impl Credentials {
    /// Pick the credential the way the backend client expects: non-empty API
    /// key first, then username (with possibly empty password), else none.
    pub fn resolve(api_key: &str, username: &str, password: &str) -> Self {
        if !api_key.is_empty() {
            Credentials::ApiKey(api_key.to_string())
        } else if !username.is_empty() {
            Credentials::Basic {
                username: username.to_string(),
                password: password.to_string(),
            }
        } else {
            Credentials::None
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::None => f.write_str("None"),
            Credentials::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// What the flush scheduler does with a snapshot the transport failed to
/// deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Drop the snapshot. The logging path stays available; documents of a
    /// failed flush are lost.
    #[default]
    Discard,
    /// Put the snapshot back in front of the buffer so the next regular
    /// flush carries it again, as long as the buffer stays under
    /// `max_backlog_bytes`. Otherwise it is dropped.
    Requeue { max_backlog_bytes: usize },
}

/// Zone in which document timestamps are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTimeZone {
    Utc,
    Local,
    Fixed(FixedOffset),
}

impl LogTimeZone {
    /// Accepts `""`/`UTC`/`Z`, `Local`, or a numeric offset such as `+07:00`.
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        let name = name.trim();
        if name.is_empty() || name.eq_ignore_ascii_case("utc") || name == "Z" {
            return Ok(LogTimeZone::Utc);
        }
        if name.eq_ignore_ascii_case("local") {
            return Ok(LogTimeZone::Local);
        }
        name.parse::<FixedOffset>()
            .map(LogTimeZone::Fixed)
            .map_err(|_| ConfigError::InvalidTimeZone(name.to_string()))
    }

    /// RFC 3339 with nanosecond precision in this zone.
    pub fn format(&self, ts: &DateTime<Utc>) -> String {
        match self {
            LogTimeZone::Utc => ts.to_rfc3339_opts(SecondsFormat::Nanos, true),
            LogTimeZone::Local => ts
                .with_timezone(&Local)
                .to_rfc3339_opts(SecondsFormat::Nanos, false),
            LogTimeZone::Fixed(offset) => ts
                .with_timezone(offset)
                .to_rfc3339_opts(SecondsFormat::Nanos, false),
        }
    }
}

/// Settings of the log sink.
///
/// Built once at startup and shared read-only afterwards. With
/// `enabled = false` only the local sink is active and no background task
/// is spawned.
#[derive(Clone, Debug)]
pub struct SinkConfig {
    pub enabled: bool,
    /// Backend base URLs, e.g. `http://localhost:9200`.
    pub addresses: Vec<String>,
    pub index: String,
    pub credentials: Credentials,
    /// Buffer size at which an append requests an early flush. `0` flushes
    /// after every append.
    pub flush_bytes: usize,
    /// Periodic flush cadence. `Duration::ZERO` disables the timer.
    pub flush_interval: Duration,
    pub request_timeout: Duration,
    /// Time zone name, see [`LogTimeZone::parse`].
    pub time_zone: String,
    pub service_name: Option<String>,
    pub local_level: Severity,
    pub remote_level: Severity,
    pub failure_policy: FailurePolicy,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addresses: vec!["http://localhost:9200".to_string()],
            index: "logs".to_string(),
            credentials: Credentials::None,
            flush_bytes: DEFAULT_FLUSH_BYTES,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            time_zone: "UTC".to_string(),
            service_name: None,
            local_level: Severity::Info,
            remote_level: Severity::Info,
            failure_policy: FailurePolicy::Discard,
        }
    }
}

impl SinkConfig {
    /// Build a configuration from the `ELASTIC_*`, `LOG_*` and `APP_NAME`
    /// environment variables (see [`crate::env`]).
    ///
    /// Values that fail to parse fall back to their defaults.
    pub fn from_env() -> Self {
        let defaults = SinkConfig::default();

        let addresses = split_csv(&env_or(env::ELASTIC_ADDRESSES_ENV, ""));
        let addresses = if addresses.is_empty() {
            defaults.addresses
        } else {
            addresses
        };

        let service_name = env_or(env::APP_NAME_ENV, "");
        let level = |key: &str, default: Severity| {
            Severity::parse(&env_or(key, "")).unwrap_or(default)
        };

        SinkConfig {
            enabled: env_bool(env::ELASTIC_ENABLED_ENV, false),
            addresses,
            index: env_or(env::ELASTIC_INDEX_ENV, &defaults.index),
            credentials: Credentials::resolve(
                &env_or(env::ELASTIC_API_KEY_ENV, ""),
                &env_or(env::ELASTIC_USERNAME_ENV, ""),
                &env_or(env::ELASTIC_PASSWORD_ENV, ""),
            ),
            flush_bytes: env_usize(env::ELASTIC_BULK_FLUSH_BYTES_ENV, defaults.flush_bytes),
            flush_interval: Duration::from_millis(env_u64(
                env::ELASTIC_BULK_FLUSH_INTERVAL_MS_ENV,
                defaults.flush_interval.as_millis() as u64,
            )),
            request_timeout: defaults.request_timeout,
            time_zone: env_or(env::LOG_TZ_ENV, &defaults.time_zone),
            service_name: (!service_name.is_empty()).then_some(service_name),
            local_level: level(env::LOG_LEVEL_ENV, defaults.local_level),
            remote_level: level(env::ELASTIC_LOG_LEVEL_ENV, defaults.remote_level),
            failure_policy: defaults.failure_policy,
        }
    }
}
