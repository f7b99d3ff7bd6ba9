//! Scriptable in-memory nodes for exercising the graph engine.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::NodeError;
use crate::log_record::Record;
use crate::node::{Capability, Node, NodeContext, WriteOutcome};

#[derive(Default)]
struct SinkShared {
    records: Mutex<Vec<Record>>,
    blocked: AtomicBool,
    alternate: AtomicBool,
    refuse_next: AtomicBool,
    fail: AtomicBool,
    offers: AtomicUsize,
    destroyed: AtomicBool,
    ctx: Mutex<Option<NodeContext>>,
}

/// Sink node storing every record it accepts.
pub struct CollectingSink {
    shared: Arc<SinkShared>,
}

/// Test-side handle controlling and inspecting a [`CollectingSink`].
#[derive(Clone)]
pub struct SinkProbe {
    shared: Arc<SinkShared>,
}

impl CollectingSink {
    pub fn new() -> (Self, SinkProbe) {
        let shared = Arc::new(SinkShared::default());
        (
            Self {
                shared: Arc::clone(&shared),
            },
            SinkProbe { shared },
        )
    }
}

impl Node for CollectingSink {
    fn capability(&self) -> Capability {
        Capability::Sink
    }

    fn name(&self) -> &str {
        "collector"
    }

    fn attach(&mut self, ctx: NodeContext) {
        *self.shared.ctx.lock() = Some(ctx);
    }

    fn write(&mut self, record: Record) -> Result<WriteOutcome, NodeError> {
        let shared = &self.shared;
        shared.offers.fetch_add(1, Ordering::SeqCst);
        if shared.fail.load(Ordering::SeqCst) {
            return Err(io::Error::other("collector failure").into());
        }
        if shared.blocked.load(Ordering::SeqCst) {
            return Ok(WriteOutcome::WouldBlock(record));
        }
        if shared.alternate.load(Ordering::SeqCst)
            && shared.refuse_next.fetch_xor(true, Ordering::SeqCst)
        {
            // Refuse this offer but ask to be retried straight away.
            if let Some(ctx) = shared.ctx.lock().as_ref() {
                ctx.ready();
            }
            return Ok(WriteOutcome::WouldBlock(record));
        }
        shared.records.lock().push(record);
        Ok(WriteOutcome::Consumed)
    }

    fn destroy(&mut self) {
        self.shared.destroyed.store(true, Ordering::SeqCst);
    }
}

impl SinkProbe {
    pub fn records(&self) -> Vec<Record> {
        self.shared.records.lock().clone()
    }

    /// Accepted messages rendered as text.
    pub fn messages(&self) -> Vec<String> {
        self.shared
            .records
            .lock()
            .iter()
            .map(|r| r.message.to_text().into_owned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.shared.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of times the graph offered a record, accepted or not.
    pub fn offers(&self) -> usize {
        self.shared.offers.load(Ordering::SeqCst)
    }

    /// Refuse every offer until unblocked. Unblocking signals readiness.
    pub fn set_blocked(&self, blocked: bool) {
        self.shared.blocked.store(blocked, Ordering::SeqCst);
        if !blocked && let Some(ctx) = self.shared.ctx.lock().as_ref() {
            ctx.ready();
        }
    }

    /// Alternate between refusing and accepting offers.
    pub fn set_alternating(&self, alternate: bool) {
        self.shared.alternate.store(alternate, Ordering::SeqCst);
    }

    /// Make every following offer fail with an I/O error.
    pub fn fail_writes(&self) {
        self.shared.fail.store(true, Ordering::SeqCst);
    }

    /// Whether the graph destroyed the sink.
    pub fn destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::SeqCst)
    }
}

/// Node forwarding every record unchanged.
pub struct PassThrough {
    capability: Capability,
}

impl PassThrough {
    pub fn duplex() -> Self {
        Self {
            capability: Capability::Duplex,
        }
    }

    /// A producer that cannot be the target of an edge.
    pub fn source() -> Self {
        Self {
            capability: Capability::Source,
        }
    }
}

impl Node for PassThrough {
    fn capability(&self) -> Capability {
        self.capability
    }

    fn name(&self) -> &str {
        "pass"
    }

    fn write(&mut self, record: Record) -> Result<WriteOutcome, NodeError> {
        Ok(WriteOutcome::Forward(record))
    }
}
