//! Best-effort call-site extraction from captured stack traces.
//!
//! A [`StackCapture`] stores the raw backtrace taken at the logging call and
//! resolves it into a [`CallSite`] the first time somebody asks. Resolution
//! scans the rendered trace with a regular expression and picks the first
//! frame that does not belong to the runtime or to the logger itself. Traces
//! without symbol or line information simply yield no call site.

use std::backtrace::Backtrace;
use std::fmt;
use std::path::{Component, Path};

use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Source location of a logging call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    /// Fully qualified function name, when the frame carried one.
    pub func: Option<String>,
    /// Source file path as reported by the runtime.
    pub file: String,
    pub line: u32,
    pub col: u32,
}

impl CallSite {
    pub fn path(&self) -> &Path {
        Path::new(&self.file)
    }

    /// `file://` URL of the source file, for absolute paths only.
    pub fn url(&self) -> Option<String> {
        self.path()
            .is_absolute()
            .then(|| format!("file://{}", self.file))
    }

    /// Directory part of the path, when it has one.
    pub fn dir(&self) -> Option<&str> {
        self.path()
            .parent()
            .and_then(Path::to_str)
            .filter(|dir| !dir.is_empty())
    }

    /// Root of an absolute path, such as `/` or `C:\`.
    pub fn root(&self) -> Option<&str> {
        let mut end = 0;
        for component in self.path().components() {
            match component {
                Component::Prefix(prefix) => end += prefix.as_os_str().len(),
                Component::RootDir => end += 1,
                _ => break,
            }
        }
        (end > 0).then(|| &self.file[..end])
    }

    /// File name including its extension.
    pub fn base(&self) -> Option<&str> {
        self.path().file_name().and_then(|name| name.to_str())
    }

    /// File name without its extension.
    pub fn stem(&self) -> Option<&str> {
        self.path().file_stem().and_then(|stem| stem.to_str())
    }

    /// Extension without the leading dot.
    pub fn ext(&self) -> Option<&str> {
        self.path().extension().and_then(|ext| ext.to_str())
    }
}

static FRAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^\s*\d+:\s+(?P<func>[^\n]*?)\s*\n\s+at\s+(?P<file>[^\n]+?):(?P<line>\d+):(?P<col>\d+)\s*$",
    )
    .expect("call-site pattern must compile")
});

/// Frames with these prefixes are never reported as the call site.
const INTERNAL_FRAME_PREFIXES: &[&str] = &[
    "std::",
    "core::",
    "alloc::",
    "backtrace::",
    "loggraph::callsite::",
    "loggraph::log_record::",
    "loggraph::logger::Logger",
    "loggraph::logger::convenience_methods::",
    "<loggraph::logger::Logger",
];

fn is_internal_frame(func: &str) -> bool {
    INTERNAL_FRAME_PREFIXES
        .iter()
        .any(|prefix| func.starts_with(prefix))
}

/// Extract the first application frame from a rendered stack trace.
///
/// Returns `None` when no frame matches; that is not an error.
pub fn parse_stack(trace: &str) -> Option<CallSite> {
    FRAME_PATTERN.captures_iter(trace).find_map(|caps| {
        let func = caps.name("func").map(|m| m.as_str().trim()).unwrap_or("");
        if is_internal_frame(func) {
            return None;
        }
        Some(CallSite {
            func: (!func.is_empty()).then(|| func.to_owned()),
            file: caps.name("file")?.as_str().to_owned(),
            line: caps.name("line")?.as_str().parse().ok()?,
            col: caps.name("col")?.as_str().parse().ok()?,
        })
    })
}

/// Stack captured at a logging call, resolved on demand.
pub struct StackCapture {
    trace: Option<Backtrace>,
    callsite: OnceCell<Option<CallSite>>,
}

impl StackCapture {
    /// Capture the current stack without resolving symbols yet.
    pub fn capture() -> Self {
        Self {
            trace: Some(Backtrace::force_capture()),
            callsite: OnceCell::new(),
        }
    }

    /// Wrap an already known call site, e.g. one received over a socket.
    pub fn resolved(callsite: Option<CallSite>) -> Self {
        Self {
            trace: None,
            callsite: OnceCell::with_value(callsite),
        }
    }

    /// Resolve the call site, parsing the trace on first use only.
    pub fn callsite(&self) -> Option<&CallSite> {
        self.callsite
            .get_or_init(|| {
                self.trace
                    .as_ref()
                    .and_then(|trace| parse_stack(&trace.to_string()))
            })
            .as_ref()
    }
}

impl fmt::Debug for StackCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackCapture")
            .field("resolved", &self.callsite.get())
            .finish()
    }
}
