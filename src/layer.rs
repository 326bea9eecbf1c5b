use crate::dispatcher::Dispatcher;
use crate::record::{Caller, LogRecord, Severity};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Target of the warnings this crate raises about itself.
pub(crate) const DIAGNOSTICS_TARGET: &str = concat!(env!("CARGO_CRATE_NAME"), "::diagnostics");

/// Targets whose events are written locally but never shipped: this crate's
/// diagnostics and the HTTP stack used by the transport. Shipping them
/// would let every flush enqueue documents about itself.
const LOCAL_ONLY_TARGETS: &[&str] = &[DIAGNOSTICS_TARGET, "reqwest", "hyper", "h2", "rustls"];

fn is_local_only(target: &str) -> bool {
    LOCAL_ONLY_TARGETS.iter().any(|prefix| {
        target
            .strip_prefix(prefix)
            .map_or(false, |rest| rest.is_empty() || rest.starts_with("::"))
    })
}

/// `tracing_subscriber` layer that turns events into [`LogRecord`]s and
/// hands them to a [`Dispatcher`].
///
/// Everything happens synchronously on the calling thread except the
/// network I/O, which the dispatcher leaves to the flush scheduler.
#[derive(Clone)]
pub struct BulkLogLayer {
    dispatcher: Arc<Dispatcher>,
}

impl BulkLogLayer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

impl<S> Layer<S> for BulkLogLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let severity = Severity::from(meta.level());
        if !self.dispatcher.enabled(severity) {
            return;
        }

        let mut fields = BTreeMap::new();
        let mut message: Option<String> = None;

        let mut visitor = FieldVisitor { fields: &mut fields, message: &mut message };
        event.record(&mut visitor);

        let caller = match (meta.file(), meta.line()) {
            (Some(file), Some(line)) => Some(Caller { file: file.to_string(), line }),
            _ => None,
        };

        let record = LogRecord {
            severity,
            timestamp: Utc::now(),
            message: message.unwrap_or_default(),
            caller,
            fields,
        };

        if is_local_only(meta.target()) {
            self.dispatcher.emit_local(&record);
        } else {
            self.dispatcher.emit(&record);
        }
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, serde_json::Value>,
    pub message: &'a mut Option<String>,
}

impl<'a> FieldVisitor<'a> {
    fn insert(&mut self, field: &Field, value: serde_json::Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.insert(field, serde_json::Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, serde_json::Value::from(value));
    }

    // JSON has no NaN or infinity; those are kept as text.
    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = if value.is_finite() {
            serde_json::Value::from(value)
        } else {
            serde_json::Value::String(value.to_string())
        };
        self.insert(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, serde_json::Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, serde_json::Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.insert(field, serde_json::Value::String(format!("{:?}", value)));
        }
    }
}
