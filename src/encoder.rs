use crate::config::LogTimeZone;
use crate::record::LogRecord;
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Document keys owned by the encoder. Attributes using one of these names
/// are moved under `fields.<name>`.
const RESERVED_KEYS: [&str; 5] = ["time", "type", "message", "file_line", "service_name"];

/// One serialized [`LogRecord`] as a single-line JSON object (no trailing
/// newline).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedDocument(Vec<u8>);

impl EncodedDocument {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

#[derive(Serialize)]
struct Document<'a, V: Serialize> {
    time: String,
    #[serde(rename = "type")]
    kind: &'static str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_line: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service_name: Option<&'a str>,
    #[serde(flatten)]
    fields: BTreeMap<Cow<'a, str>, V>,
}

/// Turns [`LogRecord`]s into the JSON documents written to every sink.
///
/// Output shape:
///
/// ```json
/// {"time":"2024-03-02T06:30:00.000000000+07:00","type":"error","message":"boom","file_line":"src/api.rs:42","service_name":"orders","order_id":7}
/// ```
#[derive(Debug, Clone)]
pub struct RecordEncoder {
    time_zone: LogTimeZone,
    service_name: Option<String>,
}

impl RecordEncoder {
    pub fn new(time_zone: LogTimeZone, service_name: Option<String>) -> Self {
        Self {
            time_zone,
            service_name,
        }
    }

    /// Encode a record. Never fails: if the attributes cannot be serialized
    /// they are retried as plain strings, and as a last resort dropped.
    pub fn encode(&self, record: &LogRecord) -> EncodedDocument {
        if let Ok(bytes) = serde_json::to_vec(&self.document(record, attribute_map(record))) {
            return EncodedDocument(bytes);
        }

        let stringified = attribute_map(record)
            .into_iter()
            .map(|(k, v)| (k, Value::String(v.to_string())))
            .collect::<BTreeMap<_, _>>();
        if let Ok(bytes) = serde_json::to_vec(&self.document(record, stringified)) {
            return EncodedDocument(bytes);
        }

        let bare: BTreeMap<Cow<'_, str>, Value> = BTreeMap::new();
        EncodedDocument(
            serde_json::to_vec(&self.document(record, bare)).unwrap_or_else(|_| b"{}".to_vec()),
        )
    }

    fn document<'a, V: Serialize>(
        &'a self,
        record: &'a LogRecord,
        fields: BTreeMap<Cow<'a, str>, V>,
    ) -> Document<'a, V> {
        Document {
            time: self.time_zone.format(&record.timestamp),
            kind: record.severity.as_type_str(),
            message: &record.message,
            file_line: record.caller.as_ref().map(|c| c.to_string()),
            service_name: self.service_name.as_deref(),
            fields,
        }
    }
}

fn attribute_map(record: &LogRecord) -> BTreeMap<Cow<'_, str>, &Value> {
    let (reserved, plain): (Vec<_>, Vec<_>) = record
        .fields
        .iter()
        .partition(|(key, _)| RESERVED_KEYS.contains(&key.as_str()));

    let mut out: BTreeMap<Cow<'_, str>, &Value> = plain
        .into_iter()
        .map(|(key, value)| (Cow::Borrowed(key.as_str()), value))
        .collect();
    // A moved key may itself be taken by another attribute; prefix again
    // until it is free.
    for (key, value) in reserved {
        let mut moved = format!("fields.{key}");
        while out.contains_key(moved.as_str()) {
            moved.insert_str(0, "fields.");
        }
        out.insert(Cow::Owned(moved), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Severity;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn fixed_record(severity: Severity) -> LogRecord {
        LogRecord::new(severity, "payment declined")
            .at(Utc.with_ymd_and_hms(2024, 3, 1, 23, 30, 0).unwrap())
    }

    fn decode(doc: &EncodedDocument) -> Value {
        serde_json::from_slice(doc.as_bytes()).unwrap()
    }

    #[test]
    fn every_severity_has_its_short_name() {
        let encoder = RecordEncoder::new(LogTimeZone::Utc, None);
        let expected = [
            (Severity::Debug, "debug"),
            (Severity::Info, "info"),
            (Severity::Warn, "warn"),
            (Severity::Error, "error"),
            (Severity::DPanic, "dpanic"),
            (Severity::Panic, "panic"),
            (Severity::Fatal, "fatal"),
            (Severity::Other(-2), "log"),
            (Severity::Other(6), "log"),
            (Severity::Other(i8::MIN), "log"),
        ];
        for (severity, name) in expected {
            let doc = decode(&encoder.encode(&fixed_record(severity)));
            assert_eq!(doc["type"], name, "{severity:?}");
        }
    }

    #[test]
    fn fixed_fields_come_first_in_order() {
        let encoder = RecordEncoder::new(
            LogTimeZone::parse("+07:00").unwrap(),
            Some("orders".to_string()),
        );
        let record = fixed_record(Severity::Error)
            .with_caller("src/api.rs", 42)
            .with_field("order_id", 7);

        let text = String::from_utf8(encoder.encode(&record).into_bytes()).unwrap();
        assert_eq!(
            text,
            r#"{"time":"2024-03-02T06:30:00.000000000+07:00","type":"error","message":"payment declined","file_line":"src/api.rs:42","service_name":"orders","order_id":7}"#
        );
    }

    #[test]
    fn caller_and_service_are_optional() {
        let encoder = RecordEncoder::new(LogTimeZone::Utc, None);
        let doc = decode(&encoder.encode(&fixed_record(Severity::Info)));
        assert!(doc.get("file_line").is_none());
        assert!(doc.get("service_name").is_none());
        assert_eq!(doc["time"], "2024-03-01T23:30:00.000000000Z");
    }

    #[test]
    fn reserved_attribute_names_are_moved_aside() {
        let encoder = RecordEncoder::new(LogTimeZone::Utc, None);
        let record = fixed_record(Severity::Warn)
            .with_field("message", "shadow")
            .with_field("type", 3);
        let doc = decode(&encoder.encode(&record));
        assert_eq!(doc["message"], "payment declined");
        assert_eq!(doc["type"], "warn");
        assert_eq!(doc["fields.message"], "shadow");
        assert_eq!(doc["fields.type"], 3);
    }

    #[test]
    fn moved_attribute_does_not_replace_an_existing_one() {
        let encoder = RecordEncoder::new(LogTimeZone::Utc, None);
        let record = fixed_record(Severity::Info)
            .with_field("message", "inner")
            .with_field("fields.message", "outer")
            .with_field("fields.fields.message", "outermost");
        let doc = decode(&encoder.encode(&record));
        assert_eq!(doc.as_object().unwrap().len(), 6);
        assert_eq!(doc["message"], "payment declined");
        assert_eq!(doc["fields.message"], "outer");
        assert_eq!(doc["fields.fields.message"], "outermost");
        assert_eq!(doc["fields.fields.fields.message"], "inner");
    }

    #[test]
    fn nested_and_error_attributes() {
        let encoder = RecordEncoder::new(LogTimeZone::Utc, None);
        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let record = fixed_record(Severity::Error)
            .with_field("request", json!({"method": "POST", "retries": [1, 2]}))
            .with_field("ok", false)
            .with_error("error", &err);
        let doc = decode(&encoder.encode(&record));
        assert_eq!(doc["request"]["method"], "POST");
        assert_eq!(doc["request"]["retries"], json!([1, 2]));
        assert_eq!(doc["ok"], false);
        assert_eq!(doc["error"], "disk full");
    }

    #[test]
    fn document_is_single_line() {
        let encoder = RecordEncoder::new(LogTimeZone::Utc, None);
        let record = fixed_record(Severity::Info).with_field("multi", "a\nb");
        let doc = encoder.encode(&record);
        assert!(!doc.as_bytes().contains(&b'\n'));
    }
}
