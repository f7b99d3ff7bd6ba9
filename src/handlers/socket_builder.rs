//! Builder for [`SocketHandler`].
//!
//! The handler does not dial anywhere itself: pass an established stream to
//! [`SocketHandlerBuilder::build`], or separate read and write halves to
//! [`SocketHandlerBuilder::build_from_parts`].

use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use super::{
    HandlerBuildError,
    common::{CommonBuilder, LevelHandle},
    socket::{
        DEFAULT_MAX_FRAME_SIZE, Deserializer, HEADER_LEN, Serializer, SocketHandler, SocketParts,
        SocketSettings, SocketStream, deserialise_record, serialise_record,
    },
};
use crate::error::TransformError;
use crate::level::Severity;
use crate::log_record::Record;

/// Builder for constructing [`SocketHandler`] instances.
#[derive(Clone)]
pub struct SocketHandlerBuilder {
    common: CommonBuilder,
    serializer: Serializer,
    deserializer: Deserializer,
    max_frame_size: usize,
}

impl Default for SocketHandlerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketHandlerBuilder {
    /// Start from JSON framing with every severity forwarded.
    pub fn new() -> Self {
        Self {
            common: CommonBuilder {
                level: Severity::Debug,
                capacity: None,
            },
            serializer: Arc::new(serialise_record),
            deserializer: Arc::new(deserialise_record),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Only send records at least as severe as `level`.
    pub fn with_level(mut self, level: Severity) -> Self {
        self.common.level = level;
        self
    }

    /// Replace the JSON encoding of outgoing records.
    pub fn with_serializer<F>(mut self, serializer: F) -> Self
    where
        F: Fn(&Record) -> Result<Vec<u8>, TransformError> + Send + Sync + 'static,
    {
        self.serializer = Arc::new(serializer);
        self
    }

    /// Replace the JSON decoding of incoming frames.
    pub fn with_deserializer<F>(mut self, deserializer: F) -> Self
    where
        F: Fn(&[u8]) -> Result<Record, TransformError> + Send + Sync + 'static,
    {
        self.deserializer = Arc::new(deserializer);
        self
    }

    /// Largest frame, header included, sent or accepted.
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Set the bounded channel capacity of the egress worker.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.common.capacity = Some(capacity);
        self
    }

    fn validate(&self) -> Result<(), HandlerBuildError> {
        self.common.validate()?;
        if self.max_frame_size <= HEADER_LEN {
            return Err(HandlerBuildError::InvalidConfig(format!(
                "max_frame_size must exceed the {HEADER_LEN}-byte header",
            )));
        }
        Ok(())
    }

    fn settings(&self) -> SocketSettings {
        SocketSettings {
            serializer: Arc::clone(&self.serializer),
            deserializer: Arc::clone(&self.deserializer),
            max_frame_size: self.max_frame_size,
            capacity: self.common.capacity,
        }
    }

    /// Build a handler over a connected stream.
    ///
    /// The stream is cloned for the reader thread; destroying the node shuts
    /// the connection down.
    pub fn build<S: SocketStream>(self, stream: S) -> Result<SocketHandler, HandlerBuildError> {
        self.validate()?;
        let reader = stream.try_clone_stream()?;
        let control = stream.try_clone_stream()?;
        let parts = SocketParts {
            reader: Box::new(reader),
            writer: Box::new(stream),
            closer: Some(Box::new(move || control.shutdown_stream())),
        };
        Ok(SocketHandler::new(
            LevelHandle::new(self.common.level),
            self.settings(),
            parts,
        ))
    }

    /// Build a handler from independent read and write halves.
    ///
    /// Nothing can interrupt a blocked `reader`, so it should reach end of
    /// stream on its own once the peer is done.
    pub fn build_from_parts<R, W>(self, reader: R, writer: W) -> Result<SocketHandler, HandlerBuildError>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        self.validate()?;
        let parts = SocketParts {
            reader: Box::new(reader),
            writer: Box::new(writer),
            closer: None,
        };
        Ok(SocketHandler::new(
            LevelHandle::new(self.common.level),
            self.settings(),
            parts,
        ))
    }
}

impl fmt::Debug for SocketHandlerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketHandlerBuilder")
            .field("level", &self.common.level)
            .field("capacity", &self.common.capacity)
            .field("max_frame_size", &self.max_frame_size)
            .finish_non_exhaustive()
    }
}
