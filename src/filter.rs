//! Predicate nodes deciding which records continue downstream.

use std::sync::Arc;

use delegate::delegate;

use crate::error::{NodeError, TransformError};
use crate::level::Severity;
use crate::log_record::Record;
use crate::node::{Capability, Node, NodeContext, WriteOutcome};
use crate::transform::TransformStage;

/// Transform node forwarding records for which a predicate holds.
pub struct Filter {
    stage: TransformStage,
}

impl Filter {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        Self::try_new(move |record| Ok(predicate(record)))
    }

    /// Wrap a predicate that may fail. A failing record is dropped and the
    /// error reported.
    pub fn try_new<F>(predicate: F) -> Self
    where
        F: Fn(&Record) -> Result<bool, TransformError> + Send + Sync + 'static,
    {
        let stage = Arc::new(move |record: Record| -> Result<Option<Record>, TransformError> {
            Ok(predicate(&record)?.then_some(record))
        });
        Self {
            stage: TransformStage::new("filter", stage),
        }
    }

    /// Admit records at least as severe as `threshold`.
    pub fn level(threshold: Severity) -> Self {
        Self::new(move |record| threshold.admits(record.level()))
    }

    /// Admit records whose name equals `prefix` or starts with `prefix.`.
    pub fn name_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self::new(move |record| {
            record.name.as_deref().is_some_and(|name| {
                name == prefix
                    || name
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            })
        })
    }

    pub fn offloaded(mut self) -> Self {
        self.stage.offload(None);
        self
    }

    pub fn offloaded_with_capacity(mut self, capacity: usize) -> Self {
        self.stage.offload(Some(capacity));
        self
    }
}

impl Node for Filter {
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
    use rstest::rstest;

    use super::*;
    use crate::node::Graph;
    use crate::test_utils::{CollectingSink, SinkProbe};

    fn wire(graph: &Graph, filter: Filter) -> (crate::NodeId, SinkProbe) {
        let filter = graph.add(filter);
        let (sink, probe) = CollectingSink::new();
        let sink = graph.add(sink);
        graph.connect(filter, sink).unwrap();
        (filter, probe)
    }

    #[rstest]
    #[case::inline(false)]
    #[case::offloaded(true)]
    fn forwards_only_matching_records(#[case] offload: bool) {
        let graph = Graph::default();
        let mut filter = Filter::new(|r: &Record| r.message.to_text().starts_with("keep"));
        if offload {
            filter = filter.offloaded();
        }
        let (filter, probe) = wire(&graph, filter);

        for message in ["keep 1", "drop", "keep 2"] {
            graph
                .write(filter, Record::new(Severity::Info, message))
                .unwrap();
        }
        assert!(graph.flush());

        assert_eq!(probe.messages(), ["keep 1", "keep 2"]);
    }

    #[test]
    fn level_filter_uses_severity_ordering() {
        let graph = Graph::default();
        let (filter, probe) = wire(&graph, Filter::level(Severity::Error));
        for level in Severity::ALL {
            graph.write(filter, Record::new(level, "m")).unwrap();
        }
        let levels: Vec<Severity> = probe.records().iter().map(Record::level).collect();
        assert_eq!(
            levels,
            [Severity::Emerg, Severity::Alert, Severity::Crit, Severity::Error]
        );
    }

    #[rstest]
    #[case("app", true)]
    #[case("app.db", true)]
    #[case("application", false)]
    #[case("other", false)]
    fn name_filter_matches_hierarchy(#[case] name: &str, #[case] admitted: bool) {
        let graph = Graph::default();
        let (filter, probe) = wire(&graph, Filter::name_prefix("app"));
        graph
            .write(filter, Record::new(Severity::Warn, "m").named(name))
            .unwrap();
        assert_eq!(probe.len(), usize::from(admitted));
    }

    #[test]
    fn predicate_errors_drop_the_record() {
        let graph = Graph::default();
        let (filter, probe) = wire(
            &graph,
            Filter::try_new(|r: &Record| match r.message.as_str() {
                Some("?") => Err("undecidable".into()),
                _ => Ok(true),
            }),
        );
        graph.write(filter, Record::new(Severity::Warn, "?")).unwrap();
        graph.write(filter, Record::new(Severity::Warn, "!")).unwrap();
        assert_eq!(probe.messages(), ["!"]);
        assert!(graph.is_live(filter));
    }
}
