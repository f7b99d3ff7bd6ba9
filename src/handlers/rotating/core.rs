//! Rotating file sink and the worker that owns its file handle.
//!
//! The node gates records by level and queues them to a single writer
//! thread. That thread performs every rotate-then-append step in submission
//! order, so size tracking never races with a rotation.

use std::{
    fs::{File, OpenOptions},
    io::{self, BufWriter, Write},
    path::Path,
};

use encoding_rs::Encoding;
use log::{debug, warn};

use super::strategy::RotationPolicy;
use crate::error::NodeError;
use crate::handlers::{LevelHandle, RotatingFileHandlerBuilder};
use crate::log_record::{Payload, Record};
use crate::node::worker::{WorkerQueue, WorkerTask};
use crate::node::{Capability, Node, NodeContext, WriteOutcome};

/// Resolved options for a rotating file, produced by the builder.
pub(crate) struct FileSettings {
    /// Target path, size limit and backup count.
    pub(crate) policy: RotationPolicy,
    /// Encoding applied to text payloads before they are written.
    pub(crate) encoding: &'static Encoding,
    /// Unix permission bits used whenever the file is created.
    ///
    /// Ignored on other platforms.
    pub(crate) mode: u32,
    /// Records between explicit flushes of the buffered writer.
    pub(crate) flush_interval: usize,
}

/// Sink node appending message payloads to a size-rotated file.
///
/// Build one with [`RotatingFileHandler::builder`]. The file is opened when
/// the handler is built, so permission problems surface immediately; the
/// size counter starts from whatever the file already holds.
pub struct RotatingFileHandler {
    level: LevelHandle,
    /// Worker queue size; `None` defers to the graph configuration.
    capacity: Option<usize>,
    /// Writer state waiting to be moved onto the worker thread on attach.
    writer: Option<RotatingFileWriter>,
    queue: Option<WorkerQueue>,
}

impl RotatingFileHandler {
    /// Start configuring a handler that writes to `path`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use loggraph::handlers::RotatingFileHandler;
    ///
    /// let handler = RotatingFileHandler::builder("service.log")
    ///     .with_max_size(10 * 1024 * 1024)
    ///     .with_rotation_limit(5)
    ///     .build()?;
    /// # Ok::<(), loggraph::handlers::HandlerBuildError>(())
    /// ```
    pub fn builder(path: impl AsRef<Path>) -> RotatingFileHandlerBuilder {
        RotatingFileHandlerBuilder::new(path)
    }

    /// Open the target file and prepare the writer.
    ///
    /// Only the builder calls this, after validating every option. The
    /// writer thread starts when the node is attached to a graph.
    pub(crate) fn open(
        settings: FileSettings,
        level: LevelHandle,
        capacity: Option<usize>,
    ) -> io::Result<Self> {
        let file = open_append(settings.policy.path(), settings.mode)?;
        let size = file.metadata()?.len();
        let writer = RotatingFileWriter {
            file: Some(BufWriter::new(file)),
            size,
            flush: FlushTracker::new(settings.flush_interval),
            policy: settings.policy,
            encoding: settings.encoding,
            mode: settings.mode,
        };
        Ok(Self {
            level,
            capacity,
            writer: Some(writer),
            queue: None,
        })
    }

    /// Handle for changing the threshold after the node joined a graph.
    pub fn level_handle(&self) -> LevelHandle {
        self.level.clone()
    }
}

/// Open `path` for appending, creating it with `mode` when missing.
fn open_append(path: &Path, mode: u32) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    options.open(path)
}

/// Flushes the writer every `flush_interval` records.
pub(crate) struct FlushTracker {
    writes: usize,
    flush_interval: usize,
}

impl FlushTracker {
    /// Track writes against `flush_interval`; `0` never flushes.
    pub(crate) fn new(flush_interval: usize) -> Self {
        Self {
            writes: 0,
            flush_interval,
        }
    }

    /// Count one write and flush `writer` when the interval is reached.
    pub(crate) fn record_write<W: Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.writes += 1;
        if self.flush_interval != 0 && self.writes.is_multiple_of(self.flush_interval) {
            writer.flush()?;
        }
        Ok(())
    }

    /// Restart counting, e.g. after the file was replaced.
    pub(crate) fn reset(&mut self) {
        self.writes = 0;
    }
}

/// State owned by the writer thread.
struct RotatingFileWriter {
    /// `None` between a rotation and the next append.
    file: Option<BufWriter<File>>,
    /// Bytes in the current file, including buffered ones.
    size: u64,
    flush: FlushTracker,
    policy: RotationPolicy,
    encoding: &'static Encoding,
    mode: u32,
}

impl RotatingFileWriter {
    /// Bytes to append for `message`. Raw bytes are written as they are.
    fn encode(&self, message: &Payload) -> Vec<u8> {
        match message {
            Payload::Bytes(bytes) => bytes.clone(),
            other => {
                let text = other.to_text();
                let (bytes, _, _) = self.encoding.encode(&text);
                bytes.into_owned()
            }
        }
    }

    /// Close the current file and shift the backups.
    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        self.flush.reset();
        self.policy.rotate()?;
        self.size = 0;
        Ok(())
    }

    /// Open a fresh current file after a rotation.
    fn reopen(&mut self) -> io::Result<()> {
        let file = open_append(self.policy.path(), self.mode)?;
        self.size = file.metadata()?.len();
        self.file = Some(BufWriter::new(file));
        Ok(())
    }
}

impl WorkerTask for RotatingFileWriter {
    /// Rotate if the record would overflow the file, then append it.
    fn process(&mut self, record: Record, ctx: &NodeContext) -> io::Result<()> {
        let bytes = self.encode(&record.message);
        if self.policy.should_rotate(self.size, bytes.len() as u64) {
            self.rotate()?;
            debug!("{}: rotated {}", ctx.label(), self.policy.path().display());
        }
        if self.file.is_none() {
            self.reopen()?;
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("log file is not open"))?;
        file.write_all(&bytes)?;
        self.size += bytes.len() as u64;
        self.flush.record_write(file).inspect_err(|err| {
            warn!("{}: flush after write failed: {err}", ctx.label());
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Node for RotatingFileHandler {
    fn capability(&self) -> Capability {
        Capability::Sink
    }

    fn name(&self) -> &str {
        "rotating_file"
    }

    fn attach(&mut self, ctx: NodeContext) {
        if let Some(writer) = self.writer.take() {
            let capacity = self.capacity.unwrap_or(ctx.config().worker_capacity());
            self.queue = Some(WorkerQueue::spawn(writer, capacity, ctx));
        }
    }

    /// Queue an admitted record for the writer thread. Records below the
    /// threshold are consumed without being written.
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
