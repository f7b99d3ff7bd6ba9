//! Helpers shared by unit tests, integration tests and benches.
//!
//! Compiled for the crate's own tests and, through the `test-util` feature,
//! for anything outside the crate that wants scriptable nodes and in-memory
//! writers.

mod collecting_sink;
mod shared_buf;

pub use collecting_sink::{CollectingSink, PassThrough, SinkProbe};
pub use shared_buf::{FailingWriter, SharedBuf};

use std::time::{Duration, Instant};

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}
