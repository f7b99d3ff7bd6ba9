//! Background worker shared by resources that do blocking I/O.
//!
//! A [`WorkerQueue`] owns a bounded channel feeding a dedicated thread that
//! runs a [`WorkerTask`]. Offering a record never blocks: when the channel is
//! full the record is handed back as [`WriteOutcome::WouldBlock`] and the
//! worker calls [`NodeContext::ready`] once it has made room again.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use log::{debug, warn};

use super::{NodeContext, WriteOutcome};
use crate::error::NodeError;
use crate::log_record::Record;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Commands sent to the worker thread.
pub(crate) enum Job {
    Record(Record),
    Flush(Sender<()>),
}

/// Work performed on the worker thread for each record.
pub(crate) trait WorkerTask: Send + 'static {
    /// Process one record. An error fails the node; later records are
    /// discarded until the node is destroyed.
    fn process(&mut self, record: Record, ctx: &NodeContext) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sending half of a worker thread plus its bookkeeping.
pub(crate) struct WorkerQueue {
    tx: Option<Sender<Job>>,
    waiting: Arc<AtomicBool>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
    label: String,
}

impl WorkerQueue {
    /// Spawn a worker thread running `task` behind a queue of `capacity`.
    pub(crate) fn spawn<T: WorkerTask>(task: T, capacity: usize, ctx: NodeContext) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        let (done_tx, done_rx) = bounded(1);
        let waiting = Arc::new(AtomicBool::new(false));
        let label = ctx.label().to_owned();
        let flag = Arc::clone(&waiting);
        let handle = thread::spawn(move || {
            worker_loop(rx, task, &ctx, &flag);
            let _ = done_tx.send(());
        });
        Self {
            tx: Some(tx),
            waiting,
            done_rx,
            handle: Some(handle),
            label,
        }
    }

    /// Queue a record without blocking.
    pub(crate) fn offer(&self, record: Record) -> Result<WriteOutcome, NodeError> {
        let Some(tx) = &self.tx else {
            return Err(NodeError::Closed);
        };
        match tx.try_send(Job::Record(record)) {
            Ok(()) => Ok(WriteOutcome::Consumed),
            Err(TrySendError::Full(job)) => {
                // Arm the wake-up before retrying so a slot freed in between
                // still produces a ready signal.
                self.waiting.store(true, Ordering::SeqCst);
                match tx.try_send(job) {
                    Ok(()) => Ok(WriteOutcome::Consumed),
                    Err(TrySendError::Full(Job::Record(record))) => {
                        Ok(WriteOutcome::WouldBlock(record))
                    }
                    Err(_) => Err(NodeError::Closed),
                }
            }
            Err(TrySendError::Disconnected(_)) => Err(NodeError::Closed),
        }
    }

    /// Wait until the worker has processed everything queued so far.
    pub(crate) fn flush(&self) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        let (ack_tx, ack_rx) = bounded(1);
        if tx.send_timeout(Job::Flush(ack_tx), FLUSH_TIMEOUT).is_err() {
            return false;
        }
        ack_rx.recv_timeout(FLUSH_TIMEOUT).is_ok()
    }

    /// Stop accepting records. The worker finishes what is queued and exits.
    pub(crate) fn close(&mut self) {
        self.tx.take();
    }

    /// Close the queue and wait briefly for the worker to exit.
    pub(crate) fn join(&mut self) {
        self.close();
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if self.done_rx.recv_timeout(CLOSE_TIMEOUT).is_err() {
            warn!("{}: worker thread did not shut down within 1s", self.label);
            return;
        }
        if handle.join().is_err() {
            warn!("{}: worker thread panicked", self.label);
        }
    }
}

impl Drop for WorkerQueue {
    fn drop(&mut self) {
        self.join();
    }
}

fn worker_loop<T: WorkerTask>(
    rx: Receiver<Job>,
    mut task: T,
    ctx: &NodeContext,
    waiting: &AtomicBool,
) {
    for job in rx.iter() {
        match job {
            Job::Record(record) => {
                if let Err(err) = task.process(record, ctx) {
                    warn!("{}: stopping worker after I/O error: {err}", ctx.label());
                    ctx.fail(err);
                    discard_until_closed(&rx, ctx, waiting);
                    return;
                }
            }
            Job::Flush(ack) => {
                if let Err(err) = task.flush() {
                    warn!("{}: flush error: {err}", ctx.label());
                }
                let _ = ack.send(());
            }
        }
        if waiting.swap(false, Ordering::SeqCst) {
            ctx.ready();
        }
    }
    if let Err(err) = task.flush() {
        warn!("{}: flush error during shutdown: {err}", ctx.label());
    }
}

/// Drain the queue after a failure until the node closes it. Records are
/// dropped and flushes acknowledged.
fn discard_until_closed(rx: &Receiver<Job>, ctx: &NodeContext, waiting: &AtomicBool) {
    let mut discarded = 0u64;
    for job in rx.iter() {
        match job {
            Job::Record(_) => discarded += 1,
            Job::Flush(ack) => {
                let _ = ack.send(());
            }
        }
        if waiting.swap(false, Ordering::SeqCst) {
            ctx.ready();
        }
    }
    if discarded > 0 {
        debug!("{}: discarded {discarded} records after failure", ctx.label());
    }
}
