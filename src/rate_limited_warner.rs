use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

/// Default spacing between repeated warnings about discarded records.
pub const WARN_INTERVAL: Duration = Duration::from_secs(5);

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

fn now_millis() -> u64 {
    u64::try_from(EPOCH.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Counts discarded records and reports them at most once per interval.
///
/// Callers bump the counter with [`record_drop`](Self::record_drop) and then
/// call [`warn_if_due`](Self::warn_if_due), which invokes the callback with
/// the number of records discarded since the previous report.
pub struct RateLimitedWarner {
    interval_ms: u64,
    last_warn: AtomicU64,
    dropped: AtomicU64,
    warned_once: AtomicBool,
}

impl RateLimitedWarner {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            last_warn: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            warned_once: AtomicBool::new(false),
        }
    }

    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Report pending drops when the first report or the interval is due.
    pub fn warn_if_due(&self, mut warn: impl FnMut(u64)) {
        let now = now_millis();
        let first = !self.warned_once.load(Ordering::Relaxed);
        let prev = self.last_warn.load(Ordering::Relaxed);
        if first || now.saturating_sub(prev) >= self.interval_ms {
            let count = self.dropped.swap(0, Ordering::Relaxed);
            if count > 0 {
                warn(count);
                self.warned_once.store(true, Ordering::Relaxed);
                self.last_warn.store(now, Ordering::Relaxed);
            }
        }
    }

    /// Report pending drops immediately.
    pub fn flush(&self, mut warn: impl FnMut(u64)) {
        let count = self.dropped.swap(0, Ordering::Relaxed);
        if count > 0 {
            warn(count);
            self.warned_once.store(true, Ordering::Relaxed);
            self.last_warn.store(now_millis(), Ordering::Relaxed);
        }
    }
}

impl Default for RateLimitedWarner {
    fn default() -> Self {
        Self::new(WARN_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_drop_is_reported_immediately() {
        let warner = RateLimitedWarner::default();
        let mut reports = Vec::new();
        warner.record_drop();
        warner.warn_if_due(|c| reports.push(c));
        assert_eq!(reports, vec![1]);
    }

    #[test]
    fn later_drops_accumulate_until_interval() {
        let warner = RateLimitedWarner::new(Duration::from_secs(3600));
        let mut reports = Vec::new();
        warner.record_drop();
        warner.warn_if_due(|c| reports.push(c));
        warner.record_drop();
        warner.record_drop();
        warner.warn_if_due(|c| reports.push(c));
        assert_eq!(reports, vec![1]);
        warner.flush(|c| reports.push(c));
        assert_eq!(reports, vec![1, 2]);
    }

    #[test]
    fn zero_interval_reports_every_time() {
        let warner = RateLimitedWarner::new(Duration::ZERO);
        let mut reports = Vec::new();
        for _ in 0..3 {
            warner.record_drop();
            warner.warn_if_due(|c| reports.push(c));
        }
        assert_eq!(reports, vec![1, 1, 1]);
    }

    #[test]
    fn flush_without_drops_is_silent() {
        let warner = RateLimitedWarner::default();
        let mut called = false;
        warner.flush(|_| called = true);
        assert!(!called);
    }
}
