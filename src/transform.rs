//! Shared machinery behind [`Formatter`](crate::Formatter) and
//! [`Filter`](crate::Filter).
//!
//! A stage wraps a user function mapping a record to an optional record.
//! Inline stages call it on the graph's thread while the record is offered;
//! offloaded stages queue records to a worker thread and re-enter the graph
//! through [`NodeContext::emit`] in submission order. Errors and panics from
//! the function are reported and the record is dropped.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{NodeError, TransformError};
use crate::log_record::Record;
use crate::node::worker::{WorkerQueue, WorkerTask};
use crate::node::{Capability, Node, NodeContext, WriteOutcome};

pub(crate) type StageFn =
    Arc<dyn Fn(Record) -> Result<Option<Record>, TransformError> + Send + Sync>;

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

fn run_stage(func: &StageFn, record: Record) -> Result<Option<Record>, TransformError> {
    match panic::catch_unwind(AssertUnwindSafe(|| func(record))) {
        Ok(result) => result,
        Err(payload) => Err(format!("panicked: {}", panic_message(payload)).into()),
    }
}

enum Mode {
    Inline,
    Offloaded {
        capacity: Option<usize>,
        queue: Option<WorkerQueue>,
    },
}

pub(crate) struct TransformStage {
    name: &'static str,
    func: StageFn,
    mode: Mode,
}

impl TransformStage {
    pub(crate) fn new(name: &'static str, func: StageFn) -> Self {
        Self {
            name,
            func,
            mode: Mode::Inline,
        }
    }

    /// Run the function on a worker thread with an optional queue size.
    pub(crate) fn offload(&mut self, capacity: Option<usize>) {
        self.mode = Mode::Offloaded {
            capacity,
            queue: None,
        };
    }
}

struct OffloadedTask {
    func: StageFn,
}

impl WorkerTask for OffloadedTask {
    fn process(&mut self, record: Record, ctx: &NodeContext) -> io::Result<()> {
        match run_stage(&self.func, record) {
            Ok(Some(out)) => ctx.emit(out),
            Ok(None) => {}
            Err(err) => ctx.report_transform(err),
        }
        Ok(())
    }
}

impl Node for TransformStage {
    fn capability(&self) -> Capability {
        Capability::Duplex
    }

    fn name(&self) -> &str {
        self.name
    }

    fn attach(&mut self, ctx: NodeContext) {
        if let Mode::Offloaded { capacity, queue } = &mut self.mode {
            let capacity = capacity.unwrap_or(ctx.config().worker_capacity());
            let task = OffloadedTask {
                func: Arc::clone(&self.func),
            };
            *queue = Some(WorkerQueue::spawn(task, capacity, ctx));
        }
    }

    fn write(&mut self, record: Record) -> Result<WriteOutcome, NodeError> {
        match &self.mode {
            Mode::Inline => match run_stage(&self.func, record) {
                Ok(Some(out)) => Ok(WriteOutcome::Forward(out)),
                Ok(None) => Ok(WriteOutcome::Consumed),
                Err(err) => Err(NodeError::Transform(err)),
            },
            Mode::Offloaded {
                queue: Some(queue), ..
            } => queue.offer(record),
            Mode::Offloaded { queue: None, .. } => Err(NodeError::Closed),
        }
    }

    fn flush(&mut self) -> bool {
        match &self.mode {
            Mode::Offloaded {
                queue: Some(queue), ..
            } => queue.flush(),
            _ => true,
        }
    }

    fn destroy(&mut self) {
        if let Mode::Offloaded {
            queue: Some(queue), ..
        } = &mut self.mode
        {
            queue.close();
        }
    }
}
