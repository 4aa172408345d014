//! Per-queue consecutive-failure tracking and backoff math (spec §4.3, §4.4).
//!
//! Mirrors `queue.py`'s `_consecutive_failures` counter: it increments on
//! every failed `work()` call and resets to zero the moment one succeeds.
//! The worker loop reads it to compute how long to wait before polling a
//! queue again.

use std::sync::atomic::{AtomicU32, Ordering};

/// Tracks consecutive failures for one queue. Cheap to share across the
/// worker loop and the queue's own dispatch path via `&RetryCounter`.
#[derive(Debug, Default)]
pub struct RetryCounter {
    consecutive_failures: AtomicU32,
}

impl RetryCounter {
    pub fn new() -> Self {
        Self { consecutive_failures: AtomicU32::new(0) }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    pub fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Seconds to sleep before the next poll of this queue, given
    /// `idle_wait` (the base poll interval) and the queue's configured
    /// `multiplier`/`max_backoff`. Zero failures means no backoff at all.
    pub fn backoff_seconds(&self, idle_wait: f64, multiplier: f64, max_backoff: f64) -> f64 {
        let failures = self.failures();
        if failures == 0 {
            return idle_wait;
        }
        let scaled = idle_wait * multiplier.powi(failures as i32 - 1);
        scaled.min(max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_failures_uses_idle_wait() {
        let rc = RetryCounter::new();
        assert_eq!(rc.backoff_seconds(10.0, 2.0, 300.0), 10.0);
    }

    #[test]
    fn backoff_doubles_per_failure() {
        let rc = RetryCounter::new();
        rc.record_failure();
        assert_eq!(rc.backoff_seconds(10.0, 2.0, 300.0), 10.0);
        rc.record_failure();
        assert_eq!(rc.backoff_seconds(10.0, 2.0, 300.0), 20.0);
        rc.record_failure();
        assert_eq!(rc.backoff_seconds(10.0, 2.0, 300.0), 40.0);
    }

    #[test]
    fn backoff_caps_at_max() {
        let rc = RetryCounter::new();
        for _ in 0..20 {
            rc.record_failure();
        }
        assert_eq!(rc.backoff_seconds(10.0, 2.0, 300.0), 300.0);
    }

    #[test]
    fn success_resets_counter() {
        let rc = RetryCounter::new();
        rc.record_failure();
        rc.record_failure();
        assert_eq!(rc.failures(), 2);
        rc.record_success();
        assert_eq!(rc.failures(), 0);
        assert_eq!(rc.backoff_seconds(10.0, 2.0, 300.0), 10.0);
    }
}
