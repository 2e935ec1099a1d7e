//! Diagnostic counters and the consecutive command-failure detector.
//!
//! [`Counters`] are monotonically increasing for the lifetime of the hub
//! context.  [`FailureStreak`] watches command outcomes and reports when the
//! same kind of failure has happened `threshold` times in a row so the
//! supervisor can be asked for a reset.
//!
//! # Example
//!
//! ```rust
//! use shub_kernel::counters::FailureStreak;
//!
//! let streak = FailureStreak::new(3);
//! assert!(!streak.record_failure());
//! assert!(!streak.record_failure());
//! assert!(streak.record_failure()); // third in a row
//!
//! streak.record_success();
//! assert!(!streak.record_failure());
//! ```

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use shub_types::CounterSnapshot;

/// `cnt_reset`, `cnt_timeout`, `cnt_com_fail`, `cnt_no_event_reset`.
#[derive(Debug, Default)]
pub struct Counters {
    reset: AtomicU64,
    timeout: AtomicU64,
    com_fail: AtomicU64,
    no_event_reset: AtomicU64,
}

impl Counters {
    pub fn bump_reset(&self) {
        self.reset.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_timeout(&self) {
        self.timeout.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_com_fail(&self) {
        self.com_fail.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_no_event_reset(&self) {
        self.no_event_reset.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            reset: self.reset.load(Ordering::Relaxed),
            timeout: self.timeout.load(Ordering::Relaxed),
            com_fail: self.com_fail.load(Ordering::Relaxed),
            no_event_reset: self.no_event_reset.load(Ordering::Relaxed),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FailureStreak
// ─────────────────────────────────────────────────────────────────────────────

/// Counts consecutive command failures.
///
/// A `threshold` of 0 disables detection.
pub struct FailureStreak {
    threshold: u32,
    current: AtomicU32,
}

impl FailureStreak {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            current: AtomicU32::new(0),
        }
    }

    /// Record one failure.  Returns `true` exactly when the streak reaches
    /// the threshold; the streak then starts over.
    pub fn record_failure(&self) -> bool {
        if self.threshold == 0 {
            return false;
        }
        let now = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        if now >= self.threshold {
            self.current.store(0, Ordering::Release);
            return true;
        }
        false
    }

    /// Any success breaks the streak.
    pub fn record_success(&self) {
        self.current.store(0, Ordering::Release);
    }

    pub fn current(&self) -> u32 {
        self.current.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_increase() {
        let counters = Counters::default();
        assert_eq!(counters.snapshot(), CounterSnapshot::default());
        counters.bump_reset();
        counters.bump_reset();
        counters.bump_timeout();
        counters.bump_no_event_reset();
        let snap = counters.snapshot();
        assert_eq!(snap.reset, 2);
        assert_eq!(snap.timeout, 1);
        assert_eq!(snap.com_fail, 0);
        assert_eq!(snap.no_event_reset, 1);
    }

    #[test]
    fn streak_triggers_at_threshold_and_restarts() {
        let streak = FailureStreak::new(2);
        assert!(!streak.record_failure());
        assert!(streak.record_failure());
        assert_eq!(streak.current(), 0);
        assert!(!streak.record_failure());
    }

    #[test]
    fn success_breaks_the_streak() {
        let streak = FailureStreak::new(3);
        streak.record_failure();
        streak.record_failure();
        streak.record_success();
        assert!(!streak.record_failure());
        assert_eq!(streak.current(), 1);
    }

    #[test]
    fn zero_threshold_never_triggers() {
        let streak = FailureStreak::new(0);
        for _ in 0..10 {
            assert!(!streak.record_failure());
        }
    }
}
