use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Severity of a [`LogRecord`].
///
/// Ranks follow the usual structured-logger convention (`debug = -1`,
/// `info = 0`, ... `fatal = 5`). Any rank outside that set is kept as
/// [`Severity::Other`] and is rendered as `"log"` by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
    DPanic,
    Panic,
    Fatal,
    Other(i8),
}

impl Severity {
    /// Build a severity from its numeric rank.
    pub fn from_rank(rank: i8) -> Self {
        match rank {
            -1 => Severity::Debug,
            0 => Severity::Info,
            1 => Severity::Warn,
            2 => Severity::Error,
            3 => Severity::DPanic,
            4 => Severity::Panic,
            5 => Severity::Fatal,
            other => Severity::Other(other),
        }
    }

    pub fn rank(self) -> i8 {
        match self {
            Severity::Debug => -1,
            Severity::Info => 0,
            Severity::Warn => 1,
            Severity::Error => 2,
            Severity::DPanic => 3,
            Severity::Panic => 4,
            Severity::Fatal => 5,
            Severity::Other(rank) => rank,
        }
    }

    /// Short lowercase name written into the `type` field of a document.
    ///
    /// Total over every value: unknown ranks map to `"log"`.
    pub fn as_type_str(self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
            Severity::DPanic => "dpanic",
            Severity::Panic => "panic",
            Severity::Fatal => "fatal",
            Severity::Other(_) => "log",
        }
    }

    /// Parse a level name as used in configuration (`"warn"`, `"ERROR"`, ...).
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(Severity::Debug),
            "info" => Some(Severity::Info),
            "warn" | "warning" => Some(Severity::Warn),
            "error" => Some(Severity::Error),
            "dpanic" => Some(Severity::DPanic),
            "panic" => Some(Severity::Panic),
            "fatal" => Some(Severity::Fatal),
            _ => None,
        }
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl From<&tracing::Level> for Severity {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => Severity::Other(-2),
            tracing::Level::DEBUG => Severity::Debug,
            tracing::Level::INFO => Severity::Info,
            tracing::Level::WARN => Severity::Warn,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_type_str())
    }
}

/// Source location of the log call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub file: String,
    pub line: u32,
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// A single structured log entry.
///
/// Built once per log call and never mutated after it is handed to the
/// dispatcher. Attribute keys are unique; inserting an existing key replaces
/// the previous value.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub caller: Option<Caller>,
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl LogRecord {
    /// Create a record stamped with the current time.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        LogRecord {
            severity,
            timestamp: Utc::now(),
            message: message.into(),
            caller: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_caller(mut self, file: impl Into<String>, line: u32) -> Self {
        self.caller = Some(Caller { file: file.into(), line });
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Attach an error detail; stored as its display string.
    pub fn with_error(self, key: impl Into<String>, err: &dyn std::error::Error) -> Self {
        self.with_field(key, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_round_trips_for_known_levels() {
        for rank in -1..=5 {
            let severity = Severity::from_rank(rank);
            assert!(!matches!(severity, Severity::Other(_)));
            assert_eq!(severity.rank(), rank);
        }
        assert_eq!(Severity::from_rank(42), Severity::Other(42));
    }

    #[test]
    fn ordering_follows_rank() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Error > Severity::Warn);
        assert!(Severity::Other(-2) < Severity::Debug);
        assert!(Severity::Other(9) > Severity::Fatal);
    }

    #[test]
    fn trace_level_has_no_short_name() {
        let severity = Severity::from(&tracing::Level::TRACE);
        assert_eq!(severity.as_type_str(), "log");
        assert_eq!(Severity::from(&tracing::Level::WARN), Severity::Warn);
    }

    #[test]
    fn parse_accepts_config_spellings() {
        assert_eq!(Severity::parse(" WARNING "), Some(Severity::Warn));
        assert_eq!(Severity::parse("dpanic"), Some(Severity::DPanic));
        assert_eq!(Severity::parse("verbose"), None);
    }

    #[test]
    fn duplicate_field_keys_keep_last_value() {
        let record = LogRecord::new(Severity::Info, "hi")
            .with_field("user", "a")
            .with_field("user", "b");
        assert_eq!(record.fields.len(), 1);
        assert_eq!(record.fields["user"], "b");
    }
}
