//! Size-rotated file sink.
//!
//! [`core`] holds the node and its writer thread, [`strategy`] the file
//! naming and rollover rules.

mod core;
mod strategy;

pub use core::RotatingFileHandler;
pub(crate) use core::FileSettings;
pub(crate) use strategy::RotationPolicy;
