//! Error types shared across the crate.
//!
//! Errors fall into four groups. [`QueueSizeLimitExceededError`] is returned to
//! the caller of a logging method. [`PipelineError`] values are absorbed at a
//! node boundary and passed to the configured error handler. [`GraphError`]
//! reports illegal wiring. [`NodeError`] is what a node's resource hands back
//! to the engine.

use std::{error::Error as StdError, io};

use thiserror::Error;

use crate::node::{Capability, NodeId};

/// Boxed error raised by a user supplied transform function.
pub type TransformError = Box<dyn StdError + Send + Sync + 'static>;

/// The logger's pending queue grew past its configured ceiling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("The queue size limit, {limit}, is exceeded ({pending} records pending).")]
pub struct QueueSizeLimitExceededError {
    pub limit: usize,
    pub pending: usize,
}

/// Wiring errors detected when connecting or addressing nodes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("node {0} has been destroyed")]
    Destroyed(NodeId),
    #[error("cannot connect {from} ({from_capability:?}) to {to} ({to_capability:?}): {reason}")]
    IllegalConnection {
        from: NodeId,
        from_capability: Capability,
        to: NodeId,
        to_capability: Capability,
        reason: &'static str,
    },
    #[error("connect requires at least one target")]
    NoTargets,
}

/// Failure reported by a node's resource.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Recoverable: the record is dropped and the node keeps running.
    #[error("transform failed: {0}")]
    Transform(#[source] TransformError),
    /// Unrecoverable I/O failure; the node is isolated.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The resource has already shut down.
    #[error("node resource is closed")]
    Closed,
}

/// Error delivered to the configured error handler.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{node}: transform failed: {source}")]
    Transform {
        node: String,
        #[source]
        source: TransformError,
    },
    #[error("{node}: I/O failure: {source}")]
    Io {
        node: String,
        #[source]
        source: io::Error,
    },
    #[error("{node}: failed to decode frame: {source}")]
    Decode {
        node: String,
        #[source]
        source: TransformError,
    },
    #[error("{node}: failed to encode record: {source}")]
    Encode {
        node: String,
        #[source]
        source: TransformError,
    },
    #[error("{node}: resource closed")]
    Closed { node: String },
}

impl PipelineError {
    /// Return `true` when the error triggers failure isolation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Io { .. } | PipelineError::Closed { .. })
    }

    pub fn node(&self) -> &str {
        match self {
            PipelineError::Transform { node, .. }
            | PipelineError::Io { node, .. }
            | PipelineError::Decode { node, .. }
            | PipelineError::Encode { node, .. }
            | PipelineError::Closed { node } => node,
        }
    }

    pub(crate) fn from_node_error(node: &str, err: NodeError) -> Self {
        let node = node.to_owned();
        match err {
            NodeError::Transform(source) => PipelineError::Transform { node, source },
            NodeError::Io(source) => PipelineError::Io { node, source },
            NodeError::Closed => PipelineError::Closed { node },
        }
    }
}

/// Invalid configuration supplied to [`ConfigBuilder`](crate::config::ConfigBuilder).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
