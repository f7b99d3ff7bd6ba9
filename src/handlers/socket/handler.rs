//! Duplex node bridging the graph and a connected byte stream.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, bounded};
use log::{debug, warn};

use super::frame::{FrameDecoder, encode_frame};
use super::serialise::{Deserializer, Serializer};
use crate::error::{NodeError, PipelineError};
use crate::handlers::LevelHandle;
use crate::log_record::Record;
use crate::node::worker::{WorkerQueue, WorkerTask};
use crate::node::{Capability, Node, NodeContext, WriteOutcome};

const READ_CHUNK: usize = 8 * 1024;
const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

type Closer = Box<dyn FnMut() -> io::Result<()> + Send>;

/// The two halves of a connection plus a way to unblock the reader.
pub(crate) struct SocketParts {
    pub(crate) reader: Box<dyn Read + Send>,
    pub(crate) writer: Box<dyn Write + Send>,
    pub(crate) closer: Option<Closer>,
}

/// Options resolved by the builder.
pub(crate) struct SocketSettings {
    pub(crate) serializer: Serializer,
    pub(crate) deserializer: Deserializer,
    pub(crate) max_frame_size: usize,
    pub(crate) capacity: Option<usize>,
}

/// Duplex node sending records to a peer and emitting records it receives.
///
/// Records written to the node are serialised, framed and sent by a worker
/// thread. A reader thread reassembles incoming frames and emits the decoded
/// records to the node's targets. Build one with
/// [`SocketHandlerBuilder`](crate::handlers::SocketHandlerBuilder).
pub struct SocketHandler {
    level: LevelHandle,
    settings: SocketSettings,
    parts: Option<SocketParts>,
    closer: Option<Closer>,
    closing: Arc<AtomicBool>,
    queue: Option<WorkerQueue>,
    reader: Option<ReaderThread>,
}

impl SocketHandler {
    pub(crate) fn new(level: LevelHandle, settings: SocketSettings, mut parts: SocketParts) -> Self {
        let closer = parts.closer.take();
        Self {
            level,
            settings,
            parts: Some(parts),
            closer,
            closing: Arc::new(AtomicBool::new(false)),
            queue: None,
            reader: None,
        }
    }

    /// Handle for changing the egress threshold after the node joined a graph.
    pub fn level_handle(&self) -> LevelHandle {
        self.level.clone()
    }

    fn close_stream(&mut self) {
        self.closing.store(true, Ordering::SeqCst);
        if let Some(mut closer) = self.closer.take()
            && let Err(err) = closer()
        {
            debug!("socket shutdown failed: {err}");
        }
    }
}

impl fmt::Debug for SocketHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketHandler")
            .field("level", &self.level.get())
            .field("max_frame_size", &self.settings.max_frame_size)
            .field("closing", &self.closing.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

struct SocketWriter {
    writer: Box<dyn Write + Send>,
    serializer: Serializer,
    max_frame_size: usize,
}

impl WorkerTask for SocketWriter {
    fn process(&mut self, record: Record, ctx: &NodeContext) -> io::Result<()> {
        let frame = (self.serializer)(&record)
            .and_then(|payload| encode_frame(&payload, self.max_frame_size).map_err(Into::into));
        match frame {
            Ok(frame) => {
                self.writer.write_all(&frame)?;
                self.writer.flush()
            }
            Err(source) => {
                ctx.report(PipelineError::Encode {
                    node: ctx.label().to_owned(),
                    source,
                });
                Ok(())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

struct ReaderThread {
    handle: Option<JoinHandle<()>>,
    done_rx: Receiver<()>,
    label: String,
}

impl ReaderThread {
    fn spawn(
        reader: Box<dyn Read + Send>,
        decoder: FrameDecoder,
        deserializer: Deserializer,
        ctx: NodeContext,
        closing: Arc<AtomicBool>,
    ) -> Self {
        let (done_tx, done_rx) = bounded(1);
        let label = ctx.label().to_owned();
        let handle = thread::spawn(move || {
            read_loop(reader, decoder, &deserializer, &ctx, &closing);
            let _ = done_tx.send(());
        });
        Self {
            handle: Some(handle),
            done_rx,
            label,
        }
    }

    fn join(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if self.done_rx.recv_timeout(READER_JOIN_TIMEOUT).is_err() {
            warn!("{}: reader thread still blocked after 1s; detaching", self.label);
            return;
        }
        if handle.join().is_err() {
            warn!("{}: reader thread panicked", self.label);
        }
    }
}

fn read_loop(
    mut reader: Box<dyn Read + Send>,
    mut decoder: FrameDecoder,
    deserializer: &Deserializer,
    ctx: &NodeContext,
    closing: &AtomicBool,
) {
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let read = match reader.read(&mut chunk) {
            Ok(0) => {
                debug!("{}: peer closed the connection", ctx.label());
                return;
            }
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                if !closing.load(Ordering::SeqCst) {
                    warn!("{}: read failed: {err}", ctx.label());
                    ctx.fail(err);
                }
                return;
            }
        };
        decoder.extend(&chunk[..read]);
        loop {
            match decoder.next_frame() {
                Ok(Some(payload)) => match deserializer(&payload) {
                    Ok(record) => ctx.emit(record),
                    Err(source) => ctx.report(PipelineError::Decode {
                        node: ctx.label().to_owned(),
                        source,
                    }),
                },
                Ok(None) => break,
                Err(err) => {
                    warn!("{}: lost frame synchronisation: {err}", ctx.label());
                    ctx.fail(io::Error::new(io::ErrorKind::InvalidData, err));
                    return;
                }
            }
        }
    }
}

impl Node for SocketHandler {
    fn capability(&self) -> Capability {
        Capability::Duplex
    }

    fn name(&self) -> &str {
        "socket"
    }

    fn attach(&mut self, ctx: NodeContext) {
        let Some(parts) = self.parts.take() else {
            return;
        };
        let capacity = self
            .settings
            .capacity
            .unwrap_or(ctx.config().worker_capacity());
        let writer = SocketWriter {
            writer: parts.writer,
            serializer: Arc::clone(&self.settings.serializer),
            max_frame_size: self.settings.max_frame_size,
        };
        self.reader = Some(ReaderThread::spawn(
            parts.reader,
            FrameDecoder::new(self.settings.max_frame_size),
            Arc::clone(&self.settings.deserializer),
            ctx.clone(),
            Arc::clone(&self.closing),
        ));
        self.queue = Some(WorkerQueue::spawn(writer, capacity, ctx));
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
        self.close_stream();
    }
}

impl Drop for SocketHandler {
    fn drop(&mut self) {
        if let Some(mut queue) = self.queue.take() {
            queue.join();
        }
        self.close_stream();
        if let Some(reader) = self.reader.as_mut() {
            reader.join();
        }
    }
}
