//! Severity-gated entry point into a graph.
//!
//! A [`Logger`] is a handle pairing a [`Graph`] with the id of a pass-through
//! node registered in it. Logging calls build a [`Record`], capture call-site
//! and timing details when enabled, and write the record at that node. From
//! there it travels along whatever edges the caller has wired.
//!
//! Loggers form hierarchies through ordinary edges: a child built with
//! [`LoggerBuilder::with_parent`] is connected to its parent's node, so the
//! parent's targets see the child's records as well as its own. Without an
//! explicit parent a logger feeds the graph's root node ([`Graph::root`]);
//! [`LoggerBuilder::detached`] opts out of that.

mod convenience_methods;


use std::sync::atomic::{AtomicU8, Ordering};

use log::warn;

use crate::callsite::StackCapture;
use crate::error::{GraphError, NodeError, QueueSizeLimitExceededError};
use crate::level::Severity;
use crate::log_record::{Payload, Record, RecordMetadata};
use crate::node::{Capability, Graph, Node, NodeId, WriteOutcome};
use crate::rate_limited_warner::RateLimitedWarner;

/// Graph node behind a [`Logger`]; forwards every record unchanged.
pub struct LoggerNode {
    name: String,
}

impl LoggerNode {
    pub(crate) fn new(logger_name: Option<&str>) -> Self {
        let name = match logger_name {
            Some(n) => format!("logger:{n}"),
            None => "logger".to_owned(),
        };
        Self { name }
    }
}

impl Node for LoggerNode {
    fn capability(&self) -> Capability {
        Capability::Duplex
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, record: Record) -> Result<WriteOutcome, NodeError> {
        Ok(WriteOutcome::Forward(record))
    }
}

#[derive(Clone, Copy, Debug, Default)]
enum Parent {
    #[default]
    Root,
    Logger(NodeId),
    Detached,
}

/// Builder for [`Logger`].
#[derive(Default)]
pub struct LoggerBuilder {
    name: Option<String>,
    level: Severity,
    queue_size_limit: Option<usize>,
    parent: Parent,
    capture_stack_trace: Option<bool>,
    capture_iso_time: Option<bool>,
}

impl LoggerBuilder {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Least severe level that is still forwarded. Defaults to `WARN`.
    pub fn with_level(mut self, level: Severity) -> Self {
        self.level = level;
        self
    }

    /// Fail logging calls once more than `limit` records are pending.
    pub fn with_queue_size_limit(mut self, limit: usize) -> Self {
        self.queue_size_limit = Some(limit);
        self
    }

    /// Forward this logger's records through `parent` instead of the root.
    pub fn with_parent(mut self, parent: &Logger) -> Self {
        self.parent = Parent::Logger(parent.id);
        self
    }

    /// Do not connect the logger to any parent, not even the root.
    pub fn detached(mut self) -> Self {
        self.parent = Parent::Detached;
        self
    }

    pub fn with_capture_stack_trace(mut self, enabled: bool) -> Self {
        self.capture_stack_trace = Some(enabled);
        self
    }

    pub fn with_capture_iso_time(mut self, enabled: bool) -> Self {
        self.capture_iso_time = Some(enabled);
        self
    }

    /// Register the logger node in `graph` and wire it to its parent.
    pub fn build(self, graph: &Graph) -> Result<Logger, GraphError> {
        let config = graph.config();
        let capture_stack_trace = self
            .capture_stack_trace
            .unwrap_or(config.capture_stack_trace());
        let capture_iso_time = self.capture_iso_time.unwrap_or(config.capture_iso_time());
        let parent = match self.parent {
            Parent::Root => Some(graph.root()),
            Parent::Logger(id) => Some(id),
            Parent::Detached => None,
        };
        let id = graph.add(LoggerNode::new(self.name.as_deref()));
        if let Some(parent) = parent
            && let Err(err) = graph.connect(id, parent)
        {
            graph.destroy(id)?;
            return Err(err);
        }
        Ok(Logger {
            graph: graph.clone(),
            id,
            name: self.name,
            level: AtomicU8::new(u8::from(self.level)),
            queue_size_limit: self.queue_size_limit,
            capture_stack_trace,
            capture_iso_time,
            drop_warner: RateLimitedWarner::default(),
        })
    }
}

/// Source of log records.
pub struct Logger {
    graph: Graph,
    id: NodeId,
    name: Option<String>,
    level: AtomicU8,
    queue_size_limit: Option<usize>,
    capture_stack_trace: bool,
    capture_iso_time: bool,
    drop_warner: RateLimitedWarner,
}

impl Logger {
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::default()
    }

    /// Handle on the graph's root node, named `root`, at the default `WARN`
    /// level.
    ///
    /// The level belongs to the handle: two root handles gate independently.
    pub fn root(graph: &Graph) -> Logger {
        Logger {
            graph: graph.clone(),
            id: graph.root(),
            name: Some("root".to_owned()),
            level: AtomicU8::new(u8::from(Severity::default())),
            queue_size_limit: None,
            capture_stack_trace: graph.config().capture_stack_trace(),
            capture_iso_time: graph.config().capture_iso_time(),
            drop_warner: RateLimitedWarner::default(),
        }
    }

    /// Node id to wire targets to, e.g. `graph.connect(logger.id(), sink)`.
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn queue_size_limit(&self) -> Option<usize> {
        self.queue_size_limit
    }

    /// Records waiting at this logger's node.
    pub fn pending(&self) -> usize {
        self.graph.pending(self.id).unwrap_or(0)
    }

    pub fn set_level(&self, level: Severity) {
        self.level.store(u8::from(level), Ordering::Relaxed);
    }

    pub fn level(&self) -> Severity {
        Severity::try_from(self.level.load(Ordering::Relaxed)).unwrap_or_default()
    }

    /// Whether a call at `level` would produce a record.
    pub fn is_enabled_for(&self, level: Severity) -> bool {
        self.level().admits(level)
    }

    /// Log `message` at `level`, optionally tagged with `label`.
    ///
    /// Calls below the logger's level return `Ok(())` without doing anything.
    /// When a queue size limit is set and more records than the limit are
    /// pending after the write, the record stays queued and the call returns
    /// [`QueueSizeLimitExceededError`].
    pub fn log(
        &self,
        level: Severity,
        message: impl Into<Payload>,
        label: Option<&str>,
    ) -> Result<(), QueueSizeLimitExceededError> {
        if !self.is_enabled_for(level) {
            return Ok(());
        }
        let mut metadata = RecordMetadata::capture(label, self.capture_iso_time);
        if self.capture_stack_trace {
            metadata = metadata.with_stack(StackCapture::capture());
        }
        let record = Record::with_metadata(level, message.into(), self.name.clone(), metadata);
        match self.graph.write(self.id, record) {
            Ok(pending) => self.check_queue(pending),
            Err(err) => {
                self.drop_warner.record_drop();
                self.drop_warner.warn_if_due(|count| {
                    warn!("Logger: dropped {count} records ({err})");
                });
                Ok(())
            }
        }
    }

    fn check_queue(&self, pending: usize) -> Result<(), QueueSizeLimitExceededError> {
        match self.queue_size_limit {
            Some(limit) if pending > limit => {
                Err(QueueSizeLimitExceededError { limit, pending })
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("level", &self.level())
            .field("queue_size_limit", &self.queue_size_limit)
            .finish_non_exhaustive()
    }
}
