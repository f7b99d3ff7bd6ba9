//! Graph-wide defaults injected at construction time.
//!
//! A [`Config`] is handed to [`Graph::new`](crate::Graph::new) and read by
//! every node when it is attached. Nothing in the crate mutates it afterwards;
//! build a new graph to apply different settings.

use std::fmt;
use std::sync::Arc;

use log::error;

use crate::error::{ConfigError, PipelineError};

/// Default number of pending records before a node counts as saturated.
pub const DEFAULT_HIGH_WATER_MARK: usize = 16;
/// Default bounded queue size for worker-backed nodes.
pub const DEFAULT_WORKER_CAPACITY: usize = 1024;

/// Callback receiving errors absorbed at node boundaries.
///
/// Reports are collected while the graph is locked and handed to the handler
/// once the lock is released, so a handler may log through the same graph.
pub type ErrorHandler = Arc<dyn Fn(&PipelineError) + Send + Sync>;

/// Which downstream nodes go down with a destroyed or failed node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DestroyCascade {
    /// Every node reachable through outgoing edges.
    #[default]
    Downstream,
    /// Only downstream nodes left without a live source.
    Orphaned,
}

fn log_error(err: &PipelineError) {
    error!("loggraph: {err}");
}

/// Immutable graph configuration.
#[derive(Clone)]
pub struct Config {
    high_water_mark: usize,
    worker_capacity: usize,
    capture_stack_trace: bool,
    capture_iso_time: bool,
    destroy_cascade: DestroyCascade,
    error_handler: ErrorHandler,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    pub fn worker_capacity(&self) -> usize {
        self.worker_capacity
    }

    pub fn capture_stack_trace(&self) -> bool {
        self.capture_stack_trace
    }

    pub fn capture_iso_time(&self) -> bool {
        self.capture_iso_time
    }

    pub fn destroy_cascade(&self) -> DestroyCascade {
        self.destroy_cascade
    }

    /// Pass `err` to the configured error handler.
    pub fn report(&self, err: &PipelineError) {
        (self.error_handler)(err);
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            worker_capacity: DEFAULT_WORKER_CAPACITY,
            capture_stack_trace: true,
            capture_iso_time: true,
            destroy_cascade: DestroyCascade::default(),
            error_handler: Arc::new(log_error),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("high_water_mark", &self.high_water_mark)
            .field("worker_capacity", &self.worker_capacity)
            .field("capture_stack_trace", &self.capture_stack_trace)
            .field("capture_iso_time", &self.capture_iso_time)
            .field("destroy_cascade", &self.destroy_cascade)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Config`].
#[derive(Default)]
pub struct ConfigBuilder {
    high_water_mark: Option<usize>,
    worker_capacity: Option<usize>,
    capture_stack_trace: Option<bool>,
    capture_iso_time: Option<bool>,
    destroy_cascade: Option<DestroyCascade>,
    error_handler: Option<ErrorHandler>,
}

impl ConfigBuilder {
    /// Pending records a node may hold before upstream nodes stop feeding it.
    pub fn with_high_water_mark(mut self, mark: usize) -> Self {
        self.high_water_mark = Some(mark);
        self
    }

    /// Queue size used by worker-backed nodes unless they override it.
    pub fn with_worker_capacity(mut self, capacity: usize) -> Self {
        self.worker_capacity = Some(capacity);
        self
    }

    pub fn with_capture_stack_trace(mut self, enabled: bool) -> Self {
        self.capture_stack_trace = Some(enabled);
        self
    }

    pub fn with_capture_iso_time(mut self, enabled: bool) -> Self {
        self.capture_iso_time = Some(enabled);
        self
    }

    /// Choose how far destruction spreads downstream.
    pub fn with_destroy_cascade(mut self, cascade: DestroyCascade) -> Self {
        self.destroy_cascade = Some(cascade);
        self
    }

    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&PipelineError) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Validate the settings and build the configuration.
    pub fn build(self) -> Result<Config, ConfigError> {
        let defaults = Config::default();
        let high_water_mark = self.high_water_mark.unwrap_or(defaults.high_water_mark);
        if high_water_mark == 0 {
            return Err(ConfigError::Invalid(
                "high_water_mark must be greater than zero".into(),
            ));
        }
        let worker_capacity = self.worker_capacity.unwrap_or(defaults.worker_capacity);
        if worker_capacity == 0 {
            return Err(ConfigError::Invalid(
                "worker_capacity must be greater than zero".into(),
            ));
        }
        Ok(Config {
            high_water_mark,
            worker_capacity,
            capture_stack_trace: self
                .capture_stack_trace
                .unwrap_or(defaults.capture_stack_trace),
            capture_iso_time: self.capture_iso_time.unwrap_or(defaults.capture_iso_time),
            destroy_cascade: self.destroy_cascade.unwrap_or(defaults.destroy_cascade),
            error_handler: self.error_handler.unwrap_or(defaults.error_handler),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn rejects_zero_high_water_mark() {
        let err = Config::builder().with_high_water_mark(0).build().unwrap_err();
        assert!(err.to_string().contains("high_water_mark"));
    }

    #[test]
    fn rejects_zero_worker_capacity() {
        assert!(Config::builder().with_worker_capacity(0).build().is_err());
    }

    #[test]
    fn custom_error_handler_receives_reports() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let config = Config::builder()
            .with_error_handler(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();
        config.report(&PipelineError::Closed { node: "n".into() });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.high_water_mark(), DEFAULT_HIGH_WATER_MARK);
        assert!(config.capture_stack_trace());
        assert!(config.capture_iso_time());
        assert_eq!(config.destroy_cascade(), DestroyCascade::Downstream);
    }
}
