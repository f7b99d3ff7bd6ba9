//! JSON encoding of records for the wire.

use std::borrow::Cow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::callsite::{CallSite, StackCapture};
use crate::error::TransformError;
use crate::level::Severity;
use crate::log_record::{Payload, Record, RecordMetadata};

/// Turns an outgoing record into a frame payload.
pub type Serializer = Arc<dyn Fn(&Record) -> Result<Vec<u8>, TransformError> + Send + Sync>;
/// Turns a received frame payload back into a record.
pub type Deserializer = Arc<dyn Fn(&[u8]) -> Result<Record, TransformError> + Send + Sync>;

#[derive(Serialize, Deserialize)]
struct WireRecord<'a> {
    message: Cow<'a, Payload>,
    level: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<Cow<'a, str>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    isotime: Option<Cow<'a, str>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<Cow<'a, str>>,
    #[serde(default)]
    pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hostname: Option<Cow<'a, str>>,
    #[serde(default)]
    thread_id: Cow<'a, str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thread_name: Option<Cow<'a, str>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    callsite: Option<Cow<'a, CallSite>>,
}

impl<'a> From<&'a Record> for WireRecord<'a> {
    fn from(record: &'a Record) -> Self {
        let meta = record.metadata();
        Self {
            message: Cow::Borrowed(&record.message),
            level: record.level(),
            name: record.name.as_deref().map(Cow::Borrowed),
            isotime: meta.isotime.as_deref().map(Cow::Borrowed),
            label: meta.label.as_deref().map(Cow::Borrowed),
            pid: meta.pid,
            hostname: meta.hostname.as_deref().map(Cow::Borrowed),
            thread_id: Cow::Borrowed(&meta.thread_id),
            thread_name: meta.thread_name.as_deref().map(Cow::Borrowed),
            callsite: meta.callsite().map(Cow::Borrowed),
        }
    }
}

impl WireRecord<'_> {
    fn into_record(self) -> Record {
        let metadata = RecordMetadata {
            isotime: self.isotime.map(Cow::into_owned),
            label: self.label.map(Cow::into_owned),
            pid: self.pid,
            hostname: self.hostname.map(Cow::into_owned),
            thread_id: self.thread_id.into_owned(),
            thread_name: self.thread_name.map(Cow::into_owned),
            stack: self
                .callsite
                .map(|site| StackCapture::resolved(Some(site.into_owned()))),
        };
        Record::with_metadata(
            self.level,
            self.message.into_owned(),
            self.name.map(Cow::into_owned),
            metadata,
        )
    }
}

/// Serialise a record as a UTF-8 JSON object.
///
/// Resolves the record's call site if that has not happened yet.
pub fn serialise_record(record: &Record) -> Result<Vec<u8>, TransformError> {
    Ok(serde_json::to_vec(&WireRecord::from(record))?)
}

/// Parse a JSON object produced by [`serialise_record`].
pub fn deserialise_record(payload: &[u8]) -> Result<Record, TransformError> {
    let wire: WireRecord<'_> = serde_json::from_slice(payload)?;
    Ok(wire.into_record())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn round_trip_keeps_message_level_and_provenance() {
        let meta = RecordMetadata::capture(Some("db"), true);
        let record = Record::with_metadata(
            Severity::Crit,
            Payload::from("disk failing"),
            Some("storage".into()),
            meta,
        );

        let back = deserialise_record(&serialise_record(&record).unwrap()).unwrap();

        assert_eq!(back.message, record.message);
        assert_eq!(back.level(), Severity::Crit);
        assert_eq!(back.name.as_deref(), Some("storage"));
        assert_eq!(back.metadata().label.as_deref(), Some("db"));
        assert_eq!(back.metadata().pid, record.metadata().pid);
        assert_eq!(back.metadata().isotime, record.metadata().isotime);
    }

    #[test]
    fn call_site_travels_resolved() {
        let site = CallSite {
            func: Some("app::main".into()),
            file: "src/main.rs".into(),
            line: 12,
            col: 5,
        };
        let meta = RecordMetadata::capture(None, false)
            .with_stack(StackCapture::resolved(Some(site.clone())));
        let record = Record::with_metadata(Severity::Info, Payload::from("x"), None, meta);

        let back = deserialise_record(&serialise_record(&record).unwrap()).unwrap();

        assert_eq!(back.callsite(), Some(&site));
    }

    #[rstest]
    #[case(Payload::from(serde_json::json!({"k": [1, "two"]})))]
    #[case(Payload::from(serde_json::json!([104, 105])))]
    #[case(Payload::from(b"hi".to_vec()))]
    fn structured_payloads_keep_their_variant(#[case] message: Payload) {
        let record: Record = Record::new(Severity::Warn, message);
        let back = deserialise_record(&serialise_record(&record).unwrap()).unwrap();
        assert_eq!(back.message, record.message);
    }

    #[test]
    fn minimal_objects_are_accepted() {
        let back = deserialise_record(br#"{"message":"hi","level":"NOTICE"}"#).unwrap();
        assert_eq!(back.message.as_str(), Some("hi"));
        assert_eq!(back.level(), Severity::Notice);
        assert!(back.callsite().is_none());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(deserialise_record(b"not json").is_err());
        assert!(deserialise_record(br#"{"message":"hi","level":"LOUD"}"#).is_err());
    }
}
