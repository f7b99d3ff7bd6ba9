//! Dispatcher thread applying resource events to the graph.
//!
//! Worker threads never lock the graph. They send [`Event`] values over an
//! unbounded channel and this thread applies them one at a time under the
//! graph lock, which keeps emitted records in the order their resource
//! produced them.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded, select};
use log::warn;
use parking_lot::Mutex;

use super::NodeId;
use super::graph::GraphState;
use crate::config::Config;
use crate::error::PipelineError;
use crate::log_record::Record;

/// Message from a resource to its graph.
pub(crate) enum Event {
    /// The resource can accept buffered records again.
    Ready(NodeId),
    /// The resource produced a record asynchronously.
    Emit(NodeId, Record),
    /// The resource failed and must be isolated.
    Failed(NodeId, PipelineError),
    /// A recoverable error for the error handler.
    Report(PipelineError),
    /// Acknowledged once every earlier event has been applied.
    Barrier(Sender<()>),
}

pub(crate) struct Dispatcher {
    shutdown_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Dispatcher {
    pub(crate) fn spawn(
        state: Arc<Mutex<GraphState>>,
        config: Arc<Config>,
        rx: Receiver<Event>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let handle = thread::spawn(move || {
            let applier = Applier {
                state: &state,
                config: &config,
            };
            dispatch_loop(&applier, &rx, &shutdown_rx);
        });
        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Apply outstanding events, then stop the thread and wait for it.
    pub(crate) fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("loggraph: dispatcher thread panicked");
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Applier<'a> {
    state: &'a Mutex<GraphState>,
    config: &'a Config,
}

impl Applier<'_> {
    fn apply(&self, event: Event) {
        let reports = match event {
            Event::Barrier(ack) => {
                let _ = ack.send(());
                return;
            }
            other => {
                let mut state = self.state.lock();
                state.apply(other);
                state.take_reports()
            }
        };
        for err in &reports {
            self.config.report(err);
        }
    }

    fn drain_remaining(&self, rx: &Receiver<Event>) {
        while let Ok(event) = rx.try_recv() {
            self.apply(event);
        }
    }
}

fn dispatch_loop(applier: &Applier<'_>, rx: &Receiver<Event>, shutdown_rx: &Receiver<()>) {
    loop {
        select! {
            recv(rx) -> event => match event {
                Ok(event) => applier.apply(event),
                Err(_) => break,
            },
            recv(shutdown_rx) -> _ => {
                applier.drain_remaining(rx);
                break;
            }
        }
    }
}
