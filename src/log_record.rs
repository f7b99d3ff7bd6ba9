//! Log record representation flowing through the node graph.
//!
//! A [`Record`] pairs a message payload with its severity and the provenance
//! metadata captured when the record was created. Metadata lives behind an
//! `Arc` so fan-out edges share it instead of copying it; only the message is
//! cloned per edge. Formatters replace the message through
//! [`Record::map_message`], which keeps the metadata and severity intact.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::thread;

use chrono::{SecondsFormat, Utc};
use once_cell::sync::Lazy;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::callsite::{CallSite, StackCapture};
use crate::level::Severity;

/// Message payload carried by graph records.
///
/// On the wire text is a plain JSON string, while bytes and structured values
/// are wrapped as `{"bytes": [...]}` and `{"json": ...}` so every variant
/// decodes back to itself. Untagged non-string values from other producers
/// are accepted as [`Payload::Json`].
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
    Json(Value),
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum TaggedPayload<'a> {
    Bytes(&'a [u8]),
    Json(&'a Value),
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Payload::Text(text) => serializer.serialize_str(text),
            Payload::Bytes(bytes) => TaggedPayload::Bytes(bytes).serialize(serializer),
            Payload::Json(value) => TaggedPayload::Json(value).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(text) => Ok(Payload::Text(text)),
            Value::Object(mut map) if map.len() == 1 => {
                if let Some(bytes) = map.remove("bytes") {
                    return serde_json::from_value(bytes)
                        .map(Payload::Bytes)
                        .map_err(D::Error::custom);
                }
                match map.remove("json") {
                    Some(value) => Ok(Payload::Json(value)),
                    None => Ok(Payload::Json(Value::Object(map))),
                }
            }
            other => Ok(Payload::Json(other)),
        }
    }
}

impl Payload {
    /// Render the payload as text.
    ///
    /// Bytes are decoded lossily as UTF-8 and JSON values are rendered
    /// compactly.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Payload::Text(text) => Cow::Borrowed(text),
            Payload::Bytes(bytes) => String::from_utf8_lossy(bytes),
            Payload::Json(value) => Cow::Owned(value.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_owned())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Bytes(value)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

static HOSTNAME: Lazy<Option<String>> = Lazy::new(|| {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
});

/// Provenance captured when a record is created.
#[derive(Debug, Default)]
pub struct RecordMetadata {
    /// Creation time in RFC 3339 form with millisecond precision.
    pub isotime: Option<String>,
    /// Free-form label supplied at the logging call.
    pub label: Option<String>,
    pub pid: u32,
    pub hostname: Option<String>,
    /// Debug rendering of the creating thread's id.
    pub thread_id: String,
    pub thread_name: Option<String>,
    pub(crate) stack: Option<StackCapture>,
}

impl RecordMetadata {
    /// Capture process, host and thread details from the current context.
    pub fn capture(label: Option<&str>, capture_iso_time: bool) -> Self {
        let current = thread::current();
        Self {
            isotime: capture_iso_time
                .then(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            label: label.map(str::to_owned),
            pid: std::process::id(),
            hostname: HOSTNAME.clone(),
            thread_id: format!("{:?}", current.id()),
            thread_name: current.name().map(ToString::to_string),
            stack: None,
        }
    }

    /// Attach a stack capture whose call site resolves lazily.
    pub fn with_stack(mut self, stack: StackCapture) -> Self {
        self.stack = Some(stack);
        self
    }

    /// Call site of the logging call, when one was captured and parsed.
    pub fn callsite(&self) -> Option<&CallSite> {
        self.stack.as_ref().and_then(StackCapture::callsite)
    }
}

/// A log event flowing through the graph.
#[derive(Clone, Debug)]
pub struct Record<M = Payload> {
    /// The payload; formatters replace it wholesale.
    pub message: M,
    level: Severity,
    /// Logical source name, usually the logger name.
    pub name: Option<String>,
    metadata: Arc<RecordMetadata>,
}

impl<M> Record<M> {
    /// Construct a record with freshly captured metadata.
    pub fn new(level: Severity, message: impl Into<M>) -> Self {
        Self::with_metadata(level, message.into(), None, RecordMetadata::capture(None, true))
    }

    /// Construct a record from explicit parts.
    pub fn with_metadata(
        level: Severity,
        message: M,
        name: Option<String>,
        metadata: RecordMetadata,
    ) -> Self {
        Self {
            message,
            level,
            name,
            metadata: Arc::new(metadata),
        }
    }

    /// Severity fixed at creation.
    pub fn level(&self) -> Severity {
        self.level
    }

    pub fn metadata(&self) -> &RecordMetadata {
        &self.metadata
    }

    pub fn callsite(&self) -> Option<&CallSite> {
        self.metadata.callsite()
    }

    /// Return `true` when both records share the same metadata allocation.
    pub fn shares_metadata_with<N>(&self, other: &Record<N>) -> bool {
        Arc::ptr_eq(&self.metadata, &other.metadata)
    }

    /// Replace the message, keeping severity, name and metadata.
    pub fn map_message<N>(self, f: impl FnOnce(M) -> N) -> Record<N> {
        Record {
            message: f(self.message),
            level: self.level,
            name: self.name,
            metadata: self.metadata,
        }
    }

    /// Set the logical source name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl<M: fmt::Display> fmt::Display for Record<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.level, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn map_message_keeps_level_and_metadata() {
        let record: Record = Record::new(Severity::Notice, "hello").named("app");
        let original = record.clone();
        let mapped = record.map_message(|m| m.to_text().len());
        assert_eq!(mapped.message, 5);
        assert_eq!(mapped.level(), Severity::Notice);
        assert_eq!(mapped.name.as_deref(), Some("app"));
        assert!(mapped.shares_metadata_with(&original));
    }

    #[test]
    fn clones_share_metadata() {
        let record: Record = Record::new(Severity::Info, "x");
        let copy = record.clone();
        assert!(copy.shares_metadata_with(&record));
    }

    #[test]
    fn capture_populates_provenance() {
        let meta = RecordMetadata::capture(Some("db"), true);
        assert_eq!(meta.label.as_deref(), Some("db"));
        assert_eq!(meta.pid, std::process::id());
        assert!(meta.isotime.as_deref().is_some_and(|t| t.ends_with('Z')));
        assert!(meta.callsite().is_none());
    }

    #[test]
    fn iso_time_is_optional() {
        let meta = RecordMetadata::capture(None, false);
        assert!(meta.isotime.is_none());
    }

    #[rstest]
    #[case(Payload::from("plain"))]
    #[case(Payload::from(vec![104, 105]))]
    #[case(Payload::from(serde_json::json!([104, 105])))]
    #[case(Payload::from(serde_json::json!("quoted")))]
    #[case(Payload::from(serde_json::json!({"bytes": "not really"})))]
    fn payload_variants_survive_json(#[case] payload: Payload) {
        let encoded = serde_json::to_string(&payload).unwrap();
        let decoded: Payload = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, payload, "wire form {encoded}");
    }

    #[test]
    fn untagged_values_decode_as_json() {
        let decoded: Payload = serde_json::from_str("[1, 2]").unwrap();
        assert_eq!(decoded, Payload::Json(serde_json::json!([1, 2])));
        let decoded: Payload = serde_json::from_str(r#"{"a": 1}"#).unwrap();
        assert_eq!(decoded, Payload::Json(serde_json::json!({"a": 1})));
    }

    #[test]
    fn malformed_byte_arrays_are_rejected() {
        assert!(serde_json::from_str::<Payload>(r#"{"bytes": [256]}"#).is_err());
    }

    #[test]
    fn payload_renders_text() {
        assert_eq!(Payload::from("plain").to_text(), "plain");
        assert_eq!(Payload::from(b"bytes".to_vec()).to_text(), "bytes");
        assert_eq!(
            Payload::from(serde_json::json!({"a": 1})).to_text(),
            "{\"a\":1}"
        );
    }
}
