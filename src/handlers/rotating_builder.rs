//! Builder for [`RotatingFileHandler`].
//!
//! Extends the common level and capacity options with the rotation
//! thresholds, the text encoding and the Unix file mode.

use std::path::{Path, PathBuf};

use encoding_rs::Encoding;

use super::{
    common::{CommonBuilder, LevelHandle},
    rotating::{FileSettings, RotatingFileHandler, RotationPolicy},
    HandlerBuildError,
};
use crate::level::Severity;

/// Bytes a file may hold before it rotates, unless configured otherwise.
pub const DEFAULT_MAX_SIZE: u64 = 1_000_000;
/// Permissions applied when the handler creates the file.
pub const DEFAULT_MODE: u32 = 0o666;

/// Builder for constructing [`RotatingFileHandler`] instances.
#[derive(Clone, Debug)]
pub struct RotatingFileHandlerBuilder {
    path: PathBuf,
    common: CommonBuilder,
    max_size: u64,
    rotation_limit: usize,
    encoding: String,
    mode: u32,
    flush_interval: usize,
}

impl RotatingFileHandlerBuilder {
    /// Create a builder targeting the specified file path.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            common: CommonBuilder::default(),
            max_size: DEFAULT_MAX_SIZE,
            rotation_limit: 0,
            encoding: "utf-8".into(),
            mode: DEFAULT_MODE,
            flush_interval: 1,
        }
    }

    /// Set the least severe level written. Defaults to `WARN`.
    pub fn with_level(mut self, level: Severity) -> Self {
        self.common.level = level;
        self
    }

    /// Set the maximum number of bytes before rotation occurs.
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set how many numbered backups to keep. Zero deletes the file on
    /// rotation instead.
    pub fn with_rotation_limit(mut self, limit: usize) -> Self {
        self.rotation_limit = limit;
        self
    }

    /// Set the encoding used for text payloads, by WHATWG label.
    pub fn with_encoding(mut self, label: impl Into<String>) -> Self {
        self.encoding = label.into();
        self
    }

    /// Set the permission bits used when creating the file.
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Flush the file every `interval` records. Must be greater than zero.
    pub fn with_flush_interval(mut self, interval: usize) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Set the bounded channel capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.common.capacity = Some(capacity);
        self
    }

    fn resolve_encoding(&self) -> Result<&'static Encoding, HandlerBuildError> {
        Encoding::for_label(self.encoding.trim().as_bytes()).ok_or_else(|| {
            HandlerBuildError::InvalidConfig(format!("unknown encoding: {}", self.encoding))
        })
    }

    fn validate(&self) -> Result<&'static Encoding, HandlerBuildError> {
        self.common.validate()?;
        CommonBuilder::ensure_non_zero("max_size", Some(self.max_size))?;
        CommonBuilder::ensure_non_zero("flush_interval", Some(self.flush_interval as u64))?;
        self.resolve_encoding()
    }

    /// Validate the options, open the file and build the handler.
    pub fn build(self) -> Result<RotatingFileHandler, HandlerBuildError> {
        let encoding = self.validate()?;
        let settings = FileSettings {
            policy: RotationPolicy::new(self.path, self.max_size, self.rotation_limit),
            encoding,
            mode: self.mode,
            flush_interval: self.flush_interval,
        };
        let level = LevelHandle::new(self.common.level);
        Ok(RotatingFileHandler::open(settings, level, self.common.capacity)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::tempdir;

    #[rstest]
    #[case::zero_size(RotatingFileHandlerBuilder::new("x").with_max_size(0), "max_size")]
    #[case::zero_interval(RotatingFileHandlerBuilder::new("x").with_flush_interval(0), "flush_interval")]
    #[case::zero_capacity(RotatingFileHandlerBuilder::new("x").with_capacity(0), "capacity")]
    #[case::bad_encoding(RotatingFileHandlerBuilder::new("x").with_encoding("klingon"), "klingon")]
    fn rejects_invalid_options(#[case] builder: RotatingFileHandlerBuilder, #[case] field: &str) {
        match builder.build() {
            Err(HandlerBuildError::InvalidConfig(msg)) => assert!(msg.contains(field), "{msg}"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("builder accepted invalid options"),
        }
    }

    #[rstest]
    #[case("utf-8")]
    #[case("latin1")]
    #[case(" Shift_JIS ")]
    fn accepts_known_encoding_labels(#[case] label: &str) {
        let builder = RotatingFileHandlerBuilder::new("x").with_encoding(label);
        assert!(builder.resolve_encoding().is_ok());
    }

    #[test]
    fn unopenable_path_is_an_io_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("app.log");
        let err = RotatingFileHandlerBuilder::new(path).build().err().unwrap();
        assert!(matches!(err, HandlerBuildError::Io(_)));
    }

    #[test]
    fn build_creates_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let handler = RotatingFileHandlerBuilder::new(&path).build().unwrap();
        assert!(path.exists());
        drop(handler);
    }
}
