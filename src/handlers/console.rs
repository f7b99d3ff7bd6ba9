//! Console sink writing message payloads to stdout and stderr.
//!
//! Each admitted record is rendered as text and written followed by a
//! newline. Records at or above the optional `stderr_level` go to stderr,
//! everything else to stdout. Writing happens on a worker thread; when its
//! queue fills up the node stops accepting records until it catches up.

use std::io::{self, Write};

use super::common::{CommonBuilder, LevelHandle};
use super::HandlerBuildError;
use crate::error::NodeError;
use crate::level::Severity;
use crate::log_record::Record;
use crate::node::worker::{WorkerQueue, WorkerTask};
use crate::node::{Capability, Node, NodeContext, WriteOutcome};

type BoxedWriter = Box<dyn Write + Send>;

/// Builder for [`ConsoleHandler`].
#[derive(Clone, Debug, Default)]
pub struct ConsoleHandlerBuilder {
    common: CommonBuilder,
    stderr_level: Option<Severity>,
}

impl ConsoleHandlerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Least severe level written. Defaults to `WARN`.
    pub fn with_level(mut self, level: Severity) -> Self {
        self.common.level = level;
        self
    }

    /// Send records at least as severe as `level` to stderr.
    pub fn with_stderr_level(mut self, level: Severity) -> Self {
        self.stderr_level = Some(level);
        self
    }

    /// Bound the worker queue. Defaults to the graph's worker capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.common.capacity = Some(capacity);
        self
    }

    /// Build a handler bound to the process's stdout and stderr.
    pub fn build(self) -> Result<ConsoleHandler, HandlerBuildError> {
        self.build_with_writers(io::stdout(), io::stderr())
    }

    /// Build a handler writing to arbitrary streams.
    pub fn build_with_writers<O, E>(self, out: O, err: E) -> Result<ConsoleHandler, HandlerBuildError>
    where
        O: Write + Send + 'static,
        E: Write + Send + 'static,
    {
        self.common.validate()?;
        Ok(ConsoleHandler {
            level: LevelHandle::new(self.common.level),
            stderr_level: self.stderr_level,
            capacity: self.common.capacity,
            writers: Some((Box::new(out), Box::new(err))),
            queue: None,
        })
    }
}

/// Sink node writing to the console.
pub struct ConsoleHandler {
    level: LevelHandle,
    stderr_level: Option<Severity>,
    capacity: Option<usize>,
    writers: Option<(BoxedWriter, BoxedWriter)>,
    queue: Option<WorkerQueue>,
}

impl ConsoleHandler {
    pub fn builder() -> ConsoleHandlerBuilder {
        ConsoleHandlerBuilder::new()
    }

    /// Handle for changing the threshold after the node joined a graph.
    pub fn level_handle(&self) -> LevelHandle {
        self.level.clone()
    }
}

struct ConsoleWriter {
    out: BoxedWriter,
    err: BoxedWriter,
    stderr_level: Option<Severity>,
}

impl WorkerTask for ConsoleWriter {
    fn process(&mut self, record: Record, _ctx: &NodeContext) -> io::Result<()> {
        let to_stderr = self
            .stderr_level
            .is_some_and(|split| split.admits(record.level()));
        let stream = if to_stderr { &mut self.err } else { &mut self.out };
        writeln!(stream, "{}", record.message.to_text())?;
        stream.flush()
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()?;
        self.err.flush()
    }
}

impl Node for ConsoleHandler {
    fn capability(&self) -> Capability {
        Capability::Sink
    }

    fn name(&self) -> &str {
        "console"
    }

    fn attach(&mut self, ctx: NodeContext) {
        if let Some((out, err)) = self.writers.take() {
            let capacity = self.capacity.unwrap_or(ctx.config().worker_capacity());
            let task = ConsoleWriter {
                out,
                err,
                stderr_level: self.stderr_level,
            };
            self.queue = Some(WorkerQueue::spawn(task, capacity, ctx));
        }
    }

    fn write(&mut self, record: Record) -> Result<WriteOutcome, NodeError> {
        if !self.level.admits(record.level()) {
            return Ok(WriteOutcome::Consumed);
        }
        match &self.queue {
            Some(queue) => queue.offer(record),
            None => Err(NodeError::Closed),
        }
    }

    fn flush(&mut self) -> bool {
        self.queue.as_ref().is_some_and(WorkerQueue::flush)
    }

    fn destroy(&mut self) {
        if let Some(queue) = self.queue.as_mut() {
            queue.close();
        }
    }
}
