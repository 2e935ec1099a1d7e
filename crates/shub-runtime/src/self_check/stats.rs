//! Per-sensor accumulators fed by the campaign tap.

use serde::Serialize;

/// Integer square root by at most 30 Newton iterations starting from `n`.
/// Stops early once the estimate no longer decreases.
///
/// ```
/// use shub_runtime::self_check::stats::isqrt_newton;
///
/// assert_eq!(isqrt_newton(0), 0);
/// assert_eq!(isqrt_newton(144), 12);
/// assert_eq!(isqrt_newton(30_000), 173);
/// ```
pub fn isqrt_newton(n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    let n = u128::from(n);
    let mut x = n;
    for _ in 0..30 {
        let next = (x + n / x) / 2;
        if next >= x {
            break;
        }
        x = next;
    }
    x as u64
}

/// Inter-event gap deviation statistics, µs.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventStats {
    last_ts_ns: u64,
    count: u64,
    min_us: u64,
    max_us: u64,
    sum_sq: u64,
}

impl EventStats {
    /// Account one event stamped `ts_ns` against an expected gap.  The first
    /// event only seeds the previous timestamp.
    pub fn observe(&mut self, ts_ns: u64, expected_gap_us: u64) {
        if self.last_ts_ns != 0 {
            let gap_us = ts_ns.saturating_sub(self.last_ts_ns) / 1_000;
            self.observe_gap(gap_us, expected_gap_us);
        }
        self.last_ts_ns = ts_ns;
    }

    pub fn observe_gap(&mut self, gap_us: u64, expected_gap_us: u64) {
        let deviation = gap_us.abs_diff(expected_gap_us);
        if self.count == 0 || deviation < self.min_us {
            self.min_us = deviation;
        }
        self.max_us = self.max_us.max(deviation);
        self.sum_sq = self.sum_sq.saturating_add(deviation.saturating_mul(deviation));
        self.count += 1;
    }

    pub fn summary(&self) -> EventSummary {
        EventSummary {
            count: self.count,
            rms_us: if self.count == 0 {
                0
            } else {
                isqrt_newton(self.sum_sq / self.count)
            },
            min_us: self.min_us,
            max_us: self.max_us,
        }
    }
}

/// Reported form of [`EventStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventSummary {
    pub count: u64,
    pub rms_us: u64,
    pub min_us: u64,
    pub max_us: u64,
}

/// Timestamp monotonicity for one sensor.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderStats {
    prev_ts_ns: u64,
    valid: u64,
    violations: u64,
    last_violation: Option<(u64, u64)>,
}

impl OrderStats {
    /// A zero previous timestamp means no prior sample; the previous
    /// timestamp always moves to `ts_ns`.
    pub fn observe(&mut self, ts_ns: u64) {
        if self.prev_ts_ns != 0 {
            if ts_ns <= self.prev_ts_ns {
                self.violations += 1;
                self.last_violation = Some((self.prev_ts_ns, ts_ns));
            } else {
                self.valid += 1;
            }
        }
        self.prev_ts_ns = ts_ns;
    }

    pub fn summary(&self) -> OrderSummary {
        OrderSummary {
            valid: self.valid,
            violations: self.violations,
            last_violation: self.last_violation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub valid: u64,
    pub violations: u64,
    pub last_violation: Option<(u64, u64)>,
}
