//! Composable logging pipelines.
//!
//! Log records are produced by [`Logger`]s, pass through transform nodes
//! such as [`Formatter`] and [`Filter`], and end up in sinks: the console, a
//! size-rotated file, or a socket that may feed another process's graph.
//! Nodes are registered with a [`Graph`] and wired with
//! [`Graph::connect`]; fan-out, fan-in and cycles are all allowed.
//!
//! ```no_run
//! use loggraph::handlers::ConsoleHandlerBuilder;
//! use loggraph::{Formatter, Graph, Logger, Severity};
//!
//! let graph = Graph::default();
//! let logger = Logger::builder().with_level(Severity::Info).build(&graph)?;
//! let format = graph.add(Formatter::standard());
//! let console = graph.add(ConsoleHandlerBuilder::new().with_level(Severity::Info).build()?);
//! graph.connect(logger.id(), format)?;
//! graph.connect(format, console)?;
//! logger.info("service started")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod callsite;
pub mod config;
pub mod error;
pub mod filter;
pub mod formatter;
pub mod handlers;
pub mod level;
pub mod log_record;
pub mod logger;
pub mod node;
pub mod rate_limited_warner;
mod transform;

#[cfg(any(test, feature = "test-util"))]
pub mod test_utils;

pub use callsite::CallSite;
pub use config::{Config, ConfigBuilder, DestroyCascade, ErrorHandler};
pub use error::{
    ConfigError, GraphError, NodeError, PipelineError, QueueSizeLimitExceededError,
    TransformError,
};
pub use filter::Filter;
pub use formatter::Formatter;
pub use level::{InvalidSeverity, Severity};
pub use log_record::{Payload, Record, RecordMetadata};
pub use logger::{Logger, LoggerBuilder};
pub use node::{Capability, Graph, Node, NodeContext, NodeId, WriteOutcome};
