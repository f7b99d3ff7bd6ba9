//! Sink and transport nodes plus their builders.
//!
//! Every handler does its I/O on a dedicated worker thread fed by a bounded
//! queue, so a slow terminal, disk or peer pushes back on the graph instead of
//! blocking it. Builders validate options up front and return
//! [`HandlerBuildError`] for bad input.

use std::io;

use thiserror::Error;

mod common;
pub mod console;
pub mod rotating;
pub mod rotating_builder;
pub mod socket;
pub mod socket_builder;

pub use common::LevelHandle;
pub use console::{ConsoleHandler, ConsoleHandlerBuilder};
pub use rotating::RotatingFileHandler;
pub use rotating_builder::RotatingFileHandlerBuilder;
pub use socket::{SocketHandler, SocketStream};
pub use socket_builder::SocketHandlerBuilder;

/// Errors that may occur while building a handler.
#[derive(Debug, Error)]
pub enum HandlerBuildError {
    /// Invalid user supplied configuration.
    #[error("invalid handler configuration: {0}")]
    InvalidConfig(String),
    /// Underlying I/O error whilst creating the handler.
    #[error(transparent)]
    Io(#[from] io::Error),
}
