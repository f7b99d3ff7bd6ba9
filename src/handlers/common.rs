//! Options and helpers shared by handler builders.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use super::HandlerBuildError;
use crate::level::Severity;

/// Runtime-adjustable severity threshold of a handler.
///
/// The handler keeps one clone and consults it for every record; callers keep
/// another to change the threshold after the handler joined a graph.
#[derive(Clone, Debug)]
pub struct LevelHandle(Arc<AtomicU8>);

impl LevelHandle {
    pub fn new(level: Severity) -> Self {
        Self(Arc::new(AtomicU8::new(u8::from(level))))
    }

    pub fn get(&self) -> Severity {
        Severity::try_from(self.0.load(Ordering::Relaxed)).unwrap_or_default()
    }

    pub fn set(&self, level: Severity) {
        self.0.store(u8::from(level), Ordering::Relaxed);
    }

    pub fn admits(&self, level: Severity) -> bool {
        self.get().admits(level)
    }
}

/// Fields common to every handler builder.
#[derive(Clone, Debug, Default)]
pub(crate) struct CommonBuilder {
    pub(crate) level: Severity,
    pub(crate) capacity: Option<usize>,
}

impl CommonBuilder {
    pub(crate) fn ensure_non_zero(field: &str, value: Option<u64>) -> Result<(), HandlerBuildError> {
        match value {
            Some(0) => Err(HandlerBuildError::InvalidConfig(format!(
                "{field} must be greater than zero",
            ))),
            _ => Ok(()),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), HandlerBuildError> {
        Self::ensure_non_zero("capacity", self.capacity.map(|c| c as u64))
    }
}
