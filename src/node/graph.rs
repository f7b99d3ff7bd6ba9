//! The graph engine: node registry, adjacency and flow control.
//!
//! Records move along edges through an explicit work list rather than by
//! recursion, so arbitrarily long chains and cycles cannot exhaust the stack.
//! Each node owns a FIFO of pending records. A record is offered to a node's
//! resource only when nothing older is pending there and no live target of the
//! node has reached the high-water mark; otherwise it is appended to the
//! pending FIFO and drained later, when the resource signals readiness or a
//! downstream node catches up.

use std::collections::{HashMap, VecDeque};
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, bounded, unbounded};
use log::{debug, warn};
use parking_lot::Mutex;

use super::dispatcher::{Dispatcher, Event};
use super::{Capability, Node, NodeContext, NodeId, WriteOutcome};
use crate::config::{Config, DestroyCascade};
use crate::error::{GraphError, NodeError, PipelineError};
use crate::log_record::Record;
use crate::logger::LoggerNode;
use crate::rate_limited_warner::RateLimitedWarner;

const BARRIER_TIMEOUT: Duration = Duration::from_secs(2);
const FLUSH_DEADLINE: Duration = Duration::from_secs(5);

enum Task {
    Deliver(NodeId, Record),
    Drain(NodeId),
}

struct Slot {
    node: Box<dyn Node>,
    capability: Capability,
    label: String,
    targets: Vec<NodeId>,
    sources: Vec<NodeId>,
    pending: VecDeque<Record>,
    destroyed: bool,
}

/// Mutable graph state, guarded by the graph lock.
pub(crate) struct GraphState {
    slots: HashMap<NodeId, Slot>,
    next_id: u64,
    tasks: VecDeque<Task>,
    progress: u64,
    root: Option<NodeId>,
    reports: Vec<PipelineError>,
    config: Arc<Config>,
    events: Sender<Event>,
    drop_warner: RateLimitedWarner,
}

impl GraphState {
    fn new(config: Arc<Config>, events: Sender<Event>) -> Self {
        Self {
            slots: HashMap::new(),
            next_id: 1,
            tasks: VecDeque::new(),
            progress: 0,
            root: None,
            reports: Vec::new(),
            config,
            events,
            drop_warner: RateLimitedWarner::default(),
        }
    }

    fn add(&mut self, mut node: Box<dyn Node>) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        let label = format!("{}{id}", node.name());
        let capability = node.capability();
        node.attach(NodeContext::new(
            id,
            &label,
            self.events.clone(),
            Arc::clone(&self.config),
        ));
        debug!("{label}: added to graph as {capability:?}");
        self.slots.insert(
            id,
            Slot {
                node,
                capability,
                label,
                targets: Vec::new(),
                sources: Vec::new(),
                pending: VecDeque::new(),
                destroyed: false,
            },
        );
        id
    }

    fn root(&mut self) -> NodeId {
        match self.root.filter(|id| self.live(*id).is_ok()) {
            Some(id) => id,
            None => {
                let id = self.add(Box::new(LoggerNode::new(Some("root"))));
                self.root = Some(id);
                id
            }
        }
    }

    /// Errors collected since the last call, for the error handler.
    pub(crate) fn take_reports(&mut self) -> Vec<PipelineError> {
        mem::take(&mut self.reports)
    }

    fn live(&self, id: NodeId) -> Result<&Slot, GraphError> {
        match self.slots.get(&id) {
            None => Err(GraphError::UnknownNode(id)),
            Some(slot) if slot.destroyed => Err(GraphError::Destroyed(id)),
            Some(slot) => Ok(slot),
        }
    }

    fn connect(&mut self, from: NodeId, targets: &[NodeId]) -> Result<NodeId, GraphError> {
        let &last = targets.last().ok_or(GraphError::NoTargets)?;
        let from_capability = self.live(from)?.capability;
        for &to in targets {
            let to_capability = self.live(to)?.capability;
            let reason = if !from_capability.has_output() {
                Some("source node has no output side")
            } else if !to_capability.has_input() {
                Some("target node has no input side")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(GraphError::IllegalConnection {
                    from,
                    from_capability,
                    to,
                    to_capability,
                    reason,
                });
            }
        }
        for &to in targets {
            let Some(slot) = self.slots.get_mut(&from) else {
                continue;
            };
            if slot.targets.contains(&to) {
                continue;
            }
            slot.targets.push(to);
            if let Some(target) = self.slots.get_mut(&to) {
                target.sources.push(from);
            }
        }
        Ok(last)
    }

    fn disconnect(&mut self, from: NodeId, to: NodeId) -> Result<bool, GraphError> {
        self.live(from)?;
        let Some(slot) = self.slots.get_mut(&from) else {
            return Ok(false);
        };
        let before = slot.targets.len();
        slot.targets.retain(|t| *t != to);
        let removed = slot.targets.len() != before;
        if removed {
            if let Some(target) = self.slots.get_mut(&to) {
                target.sources.retain(|s| *s != from);
            }
            self.tasks.push_back(Task::Drain(from));
            self.run();
        }
        Ok(removed)
    }

    fn write(&mut self, id: NodeId, record: Record) -> Result<usize, GraphError> {
        self.live(id)?;
        self.tasks.push_back(Task::Deliver(id, record));
        self.run();
        Ok(self.pending_len(id))
    }

    fn destroy(&mut self, id: NodeId) -> Result<(), GraphError> {
        self.live(id)?;
        self.isolate(id);
        self.run();
        Ok(())
    }

    fn pending_len(&self, id: NodeId) -> usize {
        self.slots.get(&id).map_or(0, |slot| slot.pending.len())
    }

    pub(crate) fn apply(&mut self, event: Event) {
        match event {
            Event::Ready(id) => self.tasks.push_back(Task::Drain(id)),
            Event::Emit(id, record) => match self.slots.get(&id) {
                Some(slot) if !slot.destroyed => {
                    let targets = slot.targets.clone();
                    self.forward(&targets, record);
                }
                _ => self.note_drop(),
            },
            Event::Failed(id, err) => {
                if self.slots.get(&id).is_some_and(|slot| !slot.destroyed) {
                    self.reports.push(err);
                    self.isolate(id);
                }
            }
            Event::Report(err) => self.reports.push(err),
            Event::Barrier(ack) => {
                let _ = ack.send(());
            }
        }
        self.run();
    }

    fn run(&mut self) {
        while let Some(task) = self.tasks.pop_front() {
            match task {
                Task::Deliver(id, record) => self.deliver(id, record),
                Task::Drain(id) => self.drain(id),
            }
        }
    }

    fn deliver(&mut self, id: NodeId, record: Record) {
        let queued = match self.slots.get(&id) {
            None => return self.note_drop(),
            Some(slot) if slot.destroyed => return self.note_drop(),
            Some(slot) => !slot.pending.is_empty(),
        };
        self.progress += 1;
        if queued || !self.can_emit(id) {
            if let Some(slot) = self.slots.get_mut(&id) {
                slot.pending.push_back(record);
            }
            return;
        }
        self.offer(id, record);
    }

    /// A node may emit while every live target is below the high-water mark.
    fn can_emit(&self, id: NodeId) -> bool {
        let mark = self.config.high_water_mark();
        self.slots.get(&id).is_some_and(|slot| {
            slot.targets.iter().all(|target| {
                self.slots
                    .get(target)
                    .is_none_or(|t| t.destroyed || t.pending.len() < mark)
            })
        })
    }

    /// Hand one record to a node's resource. Returns `false` when the
    /// resource handed it back.
    fn offer(&mut self, id: NodeId, record: Record) -> bool {
        let Some(slot) = self.slots.get_mut(&id) else {
            return true;
        };
        let outcome = slot.node.write(record);
        if !matches!(outcome, Ok(WriteOutcome::WouldBlock(_))) {
            self.progress += 1;
        }
        match outcome {
            Ok(WriteOutcome::Forward(out)) => {
                let targets = slot.targets.clone();
                self.forward(&targets, out);
                true
            }
            Ok(WriteOutcome::Consumed) => true,
            Ok(WriteOutcome::WouldBlock(record)) => {
                slot.pending.push_front(record);
                false
            }
            Err(err) => {
                let fatal = !matches!(err, NodeError::Transform(_));
                let err = PipelineError::from_node_error(&slot.label, err);
                self.reports.push(err);
                if fatal {
                    self.isolate(id);
                }
                true
            }
        }
    }

    fn forward(&mut self, targets: &[NodeId], record: Record) {
        let Some((&last, rest)) = targets.split_last() else {
            return;
        };
        for &target in rest {
            self.tasks.push_back(Task::Deliver(target, record.clone()));
        }
        self.tasks.push_back(Task::Deliver(last, record));
    }

    fn drain(&mut self, id: NodeId) {
        let mut progressed = false;
        loop {
            match self.slots.get(&id) {
                Some(slot) if !slot.destroyed && !slot.pending.is_empty() => {}
                _ => break,
            }
            if !self.can_emit(id) {
                break;
            }
            let Some(record) = self
                .slots
                .get_mut(&id)
                .and_then(|slot| slot.pending.pop_front())
            else {
                break;
            };
            if !self.offer(id, record) {
                break;
            }
            progressed = true;
        }
        if !progressed {
            return;
        }
        let mark = self.config.high_water_mark();
        let Some(slot) = self.slots.get(&id) else {
            return;
        };
        if slot.destroyed || slot.pending.len() >= mark {
            return;
        }
        let waiting: Vec<NodeId> = slot
            .sources
            .iter()
            .copied()
            .filter(|s| *s != id && self.pending_len(*s) > 0)
            .collect();
        for source in waiting {
            self.tasks.push_back(Task::Drain(source));
        }
    }

    /// Destroy `id`, detach it from its neighbours and destroy downstream
    /// nodes as the configured [`DestroyCascade`] dictates.
    fn isolate(&mut self, id: NodeId) {
        let cascade = self.config.destroy_cascade();
        let mut doomed = vec![id];
        while let Some(id) = doomed.pop() {
            let Some(slot) = self.slots.get_mut(&id) else {
                continue;
            };
            if slot.destroyed {
                continue;
            }
            slot.destroyed = true;
            let dropped = slot.pending.len();
            slot.pending.clear();
            slot.node.destroy();
            let sources = mem::take(&mut slot.sources);
            let targets = mem::take(&mut slot.targets);
            warn!(
                "{}: destroyed, dropping {dropped} pending records and {} edges",
                slot.label,
                sources.len() + targets.len()
            );
            for source in sources.into_iter().filter(|s| *s != id) {
                if let Some(upstream) = self.slots.get_mut(&source) {
                    upstream.targets.retain(|t| *t != id);
                    self.tasks.push_back(Task::Drain(source));
                }
            }
            for target in targets.into_iter().filter(|t| *t != id) {
                if let Some(downstream) = self.slots.get_mut(&target) {
                    downstream.sources.retain(|s| *s != id);
                    let follows = match cascade {
                        DestroyCascade::Downstream => true,
                        DestroyCascade::Orphaned => downstream.sources.is_empty(),
                    };
                    if follows && !downstream.destroyed {
                        doomed.push(target);
                    }
                }
            }
        }
    }

    fn note_drop(&self) {
        self.drop_warner.record_drop();
        self.drop_warner.warn_if_due(|count| {
            warn!("loggraph: dropped {count} records addressed to destroyed nodes");
        });
    }

    fn drain_all(&mut self) {
        let mut ids: Vec<NodeId> = self
            .slots
            .iter()
            .filter(|(_, slot)| !slot.destroyed && !slot.pending.is_empty())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        self.tasks.extend(ids.into_iter().map(Task::Drain));
        self.run();
    }

    fn has_pending(&self) -> bool {
        self.slots
            .values()
            .any(|slot| !slot.destroyed && !slot.pending.is_empty())
    }

    fn flush_nodes(&mut self) -> bool {
        let mut ids: Vec<NodeId> = self.slots.keys().copied().collect();
        ids.sort_unstable();
        let mut all = true;
        for id in ids {
            if let Some(slot) = self.slots.get_mut(&id)
                && !slot.destroyed
            {
                all &= slot.node.flush();
            }
        }
        all
    }

    fn close_all(&mut self) {
        self.drain_all();
        for slot in self.slots.values_mut() {
            if !slot.destroyed {
                slot.destroyed = true;
                slot.node.destroy();
            }
        }
        self.drop_warner.flush(|count| {
            warn!("loggraph: dropped {count} records addressed to destroyed nodes");
        });
        // Dropping the nodes joins their worker threads.
        self.slots.clear();
    }
}

struct GraphInner {
    state: Arc<Mutex<GraphState>>,
    events: Sender<Event>,
    dispatcher: Mutex<Option<Dispatcher>>,
    config: Arc<Config>,
}

impl GraphInner {
    /// Run `f` under the graph lock, then hand any errors it produced to the
    /// error handler once the lock is released.
    fn with_state<R>(&self, f: impl FnOnce(&mut GraphState) -> R) -> R {
        let (result, reports) = {
            let mut state = self.state.lock();
            let result = f(&mut state);
            (result, state.take_reports())
        };
        for err in &reports {
            self.config.report(err);
        }
        result
    }

    fn flush(&self) -> bool {
        let deadline = Instant::now() + FLUSH_DEADLINE;
        loop {
            let (before, acknowledged) = self.with_state(|state| {
                state.drain_all();
                let acknowledged = state.flush_nodes();
                (state.progress, acknowledged)
            });
            if !self.barrier() {
                return false;
            }
            let (progress, pending) = {
                let state = self.state.lock();
                (state.progress, state.has_pending())
            };
            if progress == before {
                return acknowledged && !pending;
            }
            if Instant::now() >= deadline {
                return false;
            }
        }
    }

    /// Wait until the dispatcher has applied every event sent so far.
    fn barrier(&self) -> bool {
        let (ack_tx, ack_rx) = bounded(1);
        if self.events.send(Event::Barrier(ack_tx)).is_err() {
            return false;
        }
        ack_rx.recv_timeout(BARRIER_TIMEOUT).is_ok()
    }
}

impl Drop for GraphInner {
    fn drop(&mut self) {
        if !self.flush() {
            warn!("loggraph: graph did not settle before shutdown");
        }
        if let Some(mut dispatcher) = self.dispatcher.lock().take() {
            dispatcher.shutdown();
        }
        self.with_state(GraphState::close_all);
    }
}

/// Handle to a graph of nodes.
///
/// Cloning the handle is cheap; all clones address the same graph. The graph
/// shuts down when the last handle is dropped: buffered records are offered
/// one final time, every resource is released and worker threads are joined.
#[derive(Clone)]
pub struct Graph {
    inner: Arc<GraphInner>,
}

impl Graph {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let (events, rx) = unbounded();
        let state = Arc::new(Mutex::new(GraphState::new(
            Arc::clone(&config),
            events.clone(),
        )));
        let dispatcher = Dispatcher::spawn(Arc::clone(&state), Arc::clone(&config), rx);
        Self {
            inner: Arc::new(GraphInner {
                state,
                events,
                dispatcher: Mutex::new(Some(dispatcher)),
                config,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Register a node and return its identifier.
    pub fn add<N: Node + 'static>(&self, node: N) -> NodeId {
        self.inner.with_state(|state| state.add(Box::new(node)))
    }

    /// The graph's root logger node.
    ///
    /// Loggers feed it unless built detached, so handlers connected here see
    /// every logger's records. A destroyed root is replaced by a fresh node
    /// on the next call.
    pub fn root(&self) -> NodeId {
        self.inner.with_state(GraphState::root)
    }

    /// Add an edge from `from` to `to` and return `to` for chaining.
    ///
    /// Connecting an existing edge again is a no-op.
    pub fn connect(&self, from: NodeId, to: NodeId) -> Result<NodeId, GraphError> {
        self.inner.with_state(|state| state.connect(from, &[to]))
    }

    /// Add edges from `from` to every target and return the last target.
    ///
    /// All targets are validated before any edge is added.
    pub fn connect_all<I>(&self, from: NodeId, targets: I) -> Result<NodeId, GraphError>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let targets: Vec<NodeId> = targets.into_iter().collect();
        self.inner.with_state(|state| state.connect(from, &targets))
    }

    /// Remove the edge from `from` to `to`. Returns whether it existed.
    pub fn disconnect(&self, from: NodeId, to: NodeId) -> Result<bool, GraphError> {
        self.inner.with_state(|state| state.disconnect(from, to))
    }

    /// Inject a record at `id` and return how many records are now pending
    /// there.
    pub fn write(&self, id: NodeId, record: Record) -> Result<usize, GraphError> {
        self.inner.with_state(|state| state.write(id, record))
    }

    /// Destroy a node as if its resource had failed.
    pub fn destroy(&self, id: NodeId) -> Result<(), GraphError> {
        self.inner.with_state(|state| state.destroy(id))
    }

    /// Records buffered at `id`, or `None` for an unknown node.
    pub fn pending(&self, id: NodeId) -> Option<usize> {
        let state = self.inner.state.lock();
        state.slots.get(&id).map(|slot| slot.pending.len())
    }

    pub fn is_live(&self, id: NodeId) -> bool {
        self.inner.state.lock().live(id).is_ok()
    }

    /// Outgoing edges of `id`, in connection order.
    pub fn targets(&self, id: NodeId) -> Vec<NodeId> {
        let state = self.inner.state.lock();
        state
            .slots
            .get(&id)
            .map(|slot| slot.targets.clone())
            .unwrap_or_default()
    }

    /// Label used for `id` in diagnostics and error reports.
    pub fn label(&self, id: NodeId) -> Option<String> {
        let state = self.inner.state.lock();
        state.slots.get(&id).map(|slot| slot.label.clone())
    }

    /// Push buffered records through the graph and wait for every resource
    /// to finish its queued work.
    ///
    /// Returns `false` when a resource failed to acknowledge in time or
    /// records are still buffered because a resource stays saturated.
    pub fn flush(&self) -> bool {
        self.inner.flush()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Graph")
            .field("nodes", &state.slots.len())
            .field("config", &self.inner.config)
            .finish()
    }
}
