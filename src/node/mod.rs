//! Node abstraction and the graph engine that wires nodes together.
//!
//! A [`Node`] wraps one underlying resource: a pass-through logger, a
//! transform function, a file, a console stream or a socket. Nodes never hold
//! references to each other. They are registered with a [`Graph`], which owns
//! them, keeps the adjacency lists, buffers records for resources that cannot
//! accept more data, and isolates nodes whose resources fail.
//!
//! Resources that do their work on another thread talk back to the graph
//! through the [`NodeContext`] handed to them in [`Node::attach`].

mod dispatcher;
mod graph;
pub(crate) mod worker;


use std::fmt;
use std::io;
use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::config::Config;
use crate::error::{NodeError, PipelineError, TransformError};
use crate::log_record::Record;

pub(crate) use dispatcher::Event;
pub use graph::Graph;

/// Identifier of a node within its graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which sides of a node can take part in edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    /// Produces records; cannot be the target of an edge.
    Source,
    /// Consumes records; cannot be the origin of an edge.
    Sink,
    /// Both consumes and produces records.
    Duplex,
}

impl Capability {
    pub fn has_input(self) -> bool {
        matches!(self, Capability::Sink | Capability::Duplex)
    }

    pub fn has_output(self) -> bool {
        matches!(self, Capability::Source | Capability::Duplex)
    }
}

/// Result of handing a record to a node's resource.
#[derive(Debug)]
pub enum WriteOutcome {
    /// The resource produced a record for every outgoing edge.
    Forward(Record),
    /// The resource took the record and has nothing to forward (yet).
    Consumed,
    /// The resource is saturated; the record comes back to be buffered until
    /// the resource calls [`NodeContext::ready`].
    WouldBlock(Record),
}

/// A graph vertex wrapping one resource.
pub trait Node: Send {
    fn capability(&self) -> Capability;

    /// Short name used in diagnostics, e.g. `"formatter"`.
    fn name(&self) -> &str;

    /// Called once when the node joins a graph, before any write.
    fn attach(&mut self, _ctx: NodeContext) {}

    /// Offer one record to the resource.
    fn write(&mut self, record: Record) -> Result<WriteOutcome, NodeError>;

    /// Wait until the resource has processed everything handed to it.
    fn flush(&mut self) -> bool {
        true
    }

    /// Release the resource. Must not block on other threads.
    fn destroy(&mut self) {}
}

/// Handle through which a resource reports back to its graph.
///
/// Every call is a message to the graph's dispatcher thread, so it is safe to
/// use from worker threads and never waits on the graph lock.
#[derive(Clone)]
pub struct NodeContext {
    id: NodeId,
    label: Arc<str>,
    events: Sender<Event>,
    config: Arc<Config>,
}

impl NodeContext {
    pub(crate) fn new(id: NodeId, label: &str, events: Sender<Event>, config: Arc<Config>) -> Self {
        Self {
            id,
            label: Arc::from(label),
            events,
            config,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Forward a record produced asynchronously to every outgoing edge.
    pub fn emit(&self, record: Record) {
        self.send(Event::Emit(self.id, record));
    }

    /// Signal that the resource can accept buffered records again.
    pub fn ready(&self) {
        self.send(Event::Ready(self.id));
    }

    /// Report an unrecoverable failure; the graph isolates the node.
    pub fn fail(&self, err: io::Error) {
        let err = PipelineError::Io {
            node: self.label.to_string(),
            source: err,
        };
        self.send(Event::Failed(self.id, err));
    }

    /// Report a recoverable error to the error handler.
    pub fn report(&self, err: PipelineError) {
        self.send(Event::Report(err));
    }

    pub fn report_transform(&self, err: TransformError) {
        self.report(PipelineError::Transform {
            node: self.label.to_string(),
            source: err,
        });
    }

    fn send(&self, event: Event) {
        if self.events.send(event).is_err() {
            log::debug!("{}: graph has shut down, dropping event", self.label);
        }
    }
}

impl fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeContext")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
