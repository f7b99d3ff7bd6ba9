//! Formatter nodes rewriting record messages.
//!
//! Besides wrapping user functions, [`Formatter`] provides the standard
//! one-line layout and two encoding converters: [`Formatter::bytes_to_text`]
//! for decoding raw payloads and [`Formatter::text_to_bytes`] for producing
//! them, both backed by `encoding_rs`.

use std::sync::Arc;

use delegate::delegate;
use encoding_rs::Encoding;

use crate::error::{NodeError, TransformError};
use crate::log_record::{Payload, Record};
use crate::node::{Capability, Node, NodeContext, WriteOutcome};
use crate::transform::TransformStage;

/// Transform node replacing each record's message with the output of a user
/// function.
///
/// Severity, name and metadata are kept; only the message changes.
pub struct Formatter {
    stage: TransformStage,
}

impl Formatter {
    /// Wrap an infallible formatting function.
    pub fn new<F, P>(format: F) -> Self
    where
        F: Fn(&Record) -> P + Send + Sync + 'static,
        P: Into<Payload>,
    {
        Self::try_new(move |record| Ok::<_, TransformError>(format(record)))
    }

    /// Wrap a formatting function that may fail. Failed records are dropped
    /// and the error goes to the graph's error handler.
    pub fn try_new<F, P>(format: F) -> Self
    where
        F: Fn(&Record) -> Result<P, TransformError> + Send + Sync + 'static,
        P: Into<Payload>,
    {
        let stage = Arc::new(move |record: Record| -> Result<Option<Record>, TransformError> {
            let message: Payload = format(&record)?.into();
            Ok(Some(record.map_message(|_| message)))
        });
        Self {
            stage: TransformStage::new("formatter", stage),
        }
    }

    /// `"<name>: <LEVEL> - <message>"`, the classic one-line layout.
    pub fn standard() -> Self {
        Self::new(|record| {
            format!(
                "{}: {} - {}",
                record.name.as_deref().unwrap_or("root"),
                record.level(),
                record.message
            )
        })
    }

    /// Decode byte payloads into text using `encoding`.
    ///
    /// Malformed sequences become U+FFFD. Text passes through unchanged and
    /// JSON values are rendered as text.
    pub fn bytes_to_text(encoding: &'static Encoding) -> Self {
        Self::new(move |record| match &record.message {
            Payload::Bytes(bytes) => Payload::Text(encoding.decode(bytes).0.into_owned()),
            Payload::Text(text) => Payload::Text(text.clone()),
            json @ Payload::Json(_) => Payload::Text(json.to_text().into_owned()),
        })
    }

    /// Encode text payloads into bytes using `encoding`.
    ///
    /// Byte payloads pass through unchanged and JSON values are encoded from
    /// their text rendering. UTF-16 labels encode as UTF-8, a limitation of
    /// `encoding_rs`.
    pub fn text_to_bytes(encoding: &'static Encoding) -> Self {
        Self::new(move |record| match &record.message {
            Payload::Bytes(bytes) => Payload::Bytes(bytes.clone()),
            other => Payload::Bytes(encoding.encode(&other.to_text()).0.into_owned()),
        })
    }

    /// Run the function on a dedicated worker thread.
    pub fn offloaded(mut self) -> Self {
        self.stage.offload(None);
        self
    }

    /// Run the function on a worker thread fed by a queue of `capacity`.
    pub fn offloaded_with_capacity(mut self, capacity: usize) -> Self {
        self.stage.offload(Some(capacity));
        self
    }
}

impl Node for Formatter {
    delegate! {
        to self.stage {
            fn capability(&self) -> Capability;
            fn name(&self) -> &str;
            fn attach(&mut self, ctx: NodeContext);
            fn write(&mut self, record: Record) -> Result<WriteOutcome, NodeError>;
            fn flush(&mut self) -> bool;
            fn destroy(&mut self);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rstest::rstest;

    use super::*;
    use crate::config::Config;
    use crate::error::PipelineError;
    use crate::level::Severity;
    use crate::node::Graph;
    use crate::test_utils::{CollectingSink, PassThrough};

    fn counting_graph() -> (Graph, Arc<AtomicUsize>) {
        let reports = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reports);
        let graph = Graph::new(
            Config::builder()
                .with_error_handler(move |err| {
                    if matches!(err, PipelineError::Transform { .. }) {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                })
                .build()
                .unwrap(),
        );
        (graph, reports)
    }

    #[rstest]
    #[case::inline(false)]
    #[case::offloaded(true)]
    fn replaces_message_and_keeps_metadata(#[case] offload: bool) {
        let graph = Graph::default();
        let source = graph.add(PassThrough::duplex());
        let mut formatter = Formatter::new(|r: &Record| r.message.to_text().to_uppercase());
        if offload {
            formatter = formatter.offloaded_with_capacity(2);
        }
        let formatter = graph.add(formatter);
        let (sink, probe) = CollectingSink::new();
        let sink = graph.add(sink);
        graph.connect(source, formatter).unwrap();
        graph.connect(formatter, sink).unwrap();

        let input: Record = Record::new(Severity::Notice, "hello").named("svc");
        let original = input.clone();
        graph.write(source, input).unwrap();
        assert!(graph.flush());

        let records = probe.records();
        assert_eq!(probe.messages(), ["HELLO"]);
        assert_eq!(records[0].level(), Severity::Notice);
        assert_eq!(records[0].name.as_deref(), Some("svc"));
        assert!(records[0].shares_metadata_with(&original));
    }

    #[test]
    fn offloaded_output_keeps_submission_order() {
        let graph = Graph::default();
        let formatter = graph.add(
            Formatter::new(|r: &Record| format!("<{}>", r.message)).offloaded_with_capacity(3),
        );
        let (sink, probe) = CollectingSink::new();
        let sink = graph.add(sink);
        graph.connect(formatter, sink).unwrap();

        for i in 0..200 {
            graph
                .write(formatter, Record::new(Severity::Info, format!("{i}")))
                .unwrap();
        }
        assert!(graph.flush());

        let expected: Vec<String> = (0..200).map(|i| format!("<{i}>")).collect();
        assert_eq!(probe.messages(), expected);
    }

    #[rstest]
    #[case::inline(false)]
    #[case::offloaded(true)]
    fn errors_are_reported_and_records_dropped(#[case] offload: bool) {
        let (graph, reports) = counting_graph();
        let mut formatter = Formatter::try_new(|r: &Record| {
            if r.message.as_str() == Some("bad") {
                Err("cannot format".into())
            } else {
                Ok(r.message.clone())
            }
        });
        if offload {
            formatter = formatter.offloaded();
        }
        let formatter = graph.add(formatter);
        let (sink, probe) = CollectingSink::new();
        let sink = graph.add(sink);
        graph.connect(formatter, sink).unwrap();

        for message in ["ok", "bad", "fine"] {
            graph
                .write(formatter, Record::new(Severity::Warn, message))
                .unwrap();
        }
        assert!(graph.flush());

        assert_eq!(probe.messages(), ["ok", "fine"]);
        assert_eq!(reports.load(Ordering::SeqCst), 1);
        assert!(graph.is_live(formatter));
    }

    #[test]
    fn panics_are_contained() {
        let (graph, reports) = counting_graph();
        let formatter = graph.add(Formatter::new(|r: &Record| -> String {
            if r.level() == Severity::Emerg {
                panic!("formatter exploded");
            }
            r.message.to_text().into_owned()
        }));
        let (sink, probe) = CollectingSink::new();
        let sink = graph.add(sink);
        graph.connect(formatter, sink).unwrap();

        graph
            .write(formatter, Record::new(Severity::Emerg, "boom"))
            .unwrap();
        graph
            .write(formatter, Record::new(Severity::Info, "calm"))
            .unwrap();

        assert_eq!(probe.messages(), ["calm"]);
        assert_eq!(reports.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn encoding_converters_round_trip_latin1() {
        let graph = Graph::default();
        let encode = graph.add(Formatter::text_to_bytes(encoding_rs::WINDOWS_1252));
        let (encoded, encoded_probe) = CollectingSink::new();
        let encoded = graph.add(encoded);
        let decode = graph.add(Formatter::bytes_to_text(encoding_rs::WINDOWS_1252));
        let (decoded, decoded_probe) = CollectingSink::new();
        let decoded = graph.add(decoded);
        graph.connect_all(encode, [encoded, decode]).unwrap();
        graph.connect(decode, decoded).unwrap();

        graph
            .write(encode, Record::new(Severity::Warn, "café"))
            .unwrap();

        assert_eq!(
            encoded_probe.records()[0].message,
            Payload::Bytes(vec![b'c', b'a', b'f', 0xE9])
        );
        assert_eq!(decoded_probe.records()[0].message, Payload::from("café"));
    }

    #[rstest]
    #[case(Payload::from("plain"), Payload::from("plain"))]
    #[case(Payload::from(serde_json::json!({"n": 1})), Payload::from("{\"n\":1}"))]
    #[case(Payload::from(vec![0xFF, b'x']), Payload::from("\u{FFFD}x"))]
    fn bytes_to_text_handles_every_payload(#[case] input: Payload, #[case] expected: Payload) {
        let graph = Graph::default();
        let formatter = graph.add(Formatter::bytes_to_text(encoding_rs::UTF_8));
        let (sink, probe) = CollectingSink::new();
        let sink = graph.add(sink);
        graph.connect(formatter, sink).unwrap();

        graph.write(formatter, Record::new(Severity::Info, input)).unwrap();

        assert_eq!(probe.records()[0].message, expected);
    }

    #[test]
    fn text_to_bytes_keeps_existing_bytes() {
        let graph = Graph::default();
        let formatter = graph.add(Formatter::text_to_bytes(encoding_rs::UTF_8));
        let (sink, probe) = CollectingSink::new();
        let sink = graph.add(sink);
        graph.connect(formatter, sink).unwrap();

        graph
            .write(formatter, Record::new(Severity::Info, vec![0u8, 1, 2]))
            .unwrap();

        assert_eq!(probe.records()[0].message, Payload::Bytes(vec![0, 1, 2]));
    }

    #[test]
    fn standard_layout_includes_name_and_level() {
        let graph = Graph::default();
        let formatter = graph.add(Formatter::standard());
        let (sink, probe) = CollectingSink::new();
        let sink = graph.add(sink);
        graph.connect(formatter, sink).unwrap();

        graph
            .write(formatter, Record::new(Severity::Error, "disk full").named("io"))
            .unwrap();

        assert_eq!(probe.messages(), ["io: ERROR - disk full"]);
    }
}
