//! Campaign results.

use std::fmt;

use serde::Serialize;
use shub_types::{OperationStats, SensorType};
use tracing::info;

use super::params::CheckParams;
use super::stats::{EventSummary, OrderSummary};

/// Comm-test outcome for one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommResult {
    pub responses: u32,
    pub expected: u32,
}

impl CommResult {
    /// Every flush was answered exactly once.
    pub fn passed(&self) -> bool {
        self.responses == self.expected
    }
}

/// All results for one probed sensor.
#[derive(Debug, Clone, Serialize)]
pub struct SensorReport {
    pub sensor: SensorType,
    pub name: String,
    pub comm: CommResult,
    pub event: Option<EventSummary>,
    pub hub_stats: Option<OperationStats>,
    pub order: Option<OrderSummary>,
}

/// Full campaign report, retained as the last report until the next run.
#[derive(Debug, Clone, Serialize)]
pub struct SelfCheckReport {
    pub params: CheckParams,
    pub seed: u64,
    pub duration_ms: u64,
    /// The closing reset succeeded and the table matches the snapshot.
    pub restored: bool,
    pub sensors: Vec<SensorReport>,
}

impl SelfCheckReport {
    pub fn passed(&self) -> usize {
        self.sensors.iter().filter(|s| s.comm.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.sensors.len() - self.passed()
    }

    pub fn sensor(&self, sensor: SensorType) -> Option<&SensorReport> {
        self.sensors.iter().find(|s| s.sensor == sensor)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// One structured log line per sensor plus a summary.
    pub fn log(&self) {
        for s in &self.sensors {
            let event = s.event.unwrap_or(EventSummary {
                count: 0,
                rms_us: 0,
                min_us: 0,
                max_us: 0,
            });
            info!(
                sensor = %s.name,
                comm_pass = s.comm.passed(),
                comm_responses = s.comm.responses,
                event_count = event.count,
                event_rms_us = event.rms_us,
                event_min_us = event.min_us,
                event_max_us = event.max_us,
                hub_stats = ?s.hub_stats,
                order = ?s.order,
                "self-check sensor result"
            );
        }
        info!(
            passed = self.passed(),
            failed = self.failed(),
            seed = self.seed,
            restored = self.restored,
            duration_ms = self.duration_ms,
            "self-check complete"
        );
    }
}

impl fmt::Display for SelfCheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "self-check: {} passed, {} failed (delay {}µs, {} iterations, seed {:#x}, {} ms)",
            self.passed(),
            self.failed(),
            self.params.delay_us,
            self.params.iterations,
            self.seed,
            self.duration_ms
        )?;
        for s in &self.sensors {
            write!(
                f,
                "  {:<28} comm {} {}/{}",
                s.name,
                if s.comm.passed() { "PASS" } else { "FAIL" },
                s.comm.responses,
                s.comm.expected
            )?;
            if let Some(e) = s.event {
                write!(
                    f,
                    " | events {} rms {}µs min {}µs max {}µs",
                    e.count, e.rms_us, e.min_us, e.max_us
                )?;
            }
            if let Some(h) = s.hub_stats {
                write!(
                    f,
                    " | hub open {}/{}µs read {}/{}µs close {}/{}µs",
                    h.open.count, h.open.max_us, h.read.count, h.read.max_us, h.close.count, h.close.max_us
                )?;
            }
            if let Some(o) = s.order {
                write!(f, " | order ok {} bad {}", o.valid, o.violations)?;
                if let Some((prev, curr)) = o.last_violation {
                    write!(f, " last ({prev}, {curr})")?;
                }
            }
            writeln!(f)?;
        }
        if !self.restored {
            writeln!(f, "  WARNING: sensor state was not restored cleanly")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor(sensor: SensorType, responses: u32) -> SensorReport {
        SensorReport {
            sensor,
            name: sensor.to_string(),
            comm: CommResult {
                responses,
                expected: 10,
            },
            event: None,
            hub_stats: None,
            order: None,
        }
    }

    #[test]
    fn pass_fail_counts_follow_comm_results() {
        let report = SelfCheckReport {
            params: CheckParams {
                delay_us: 500,
                iterations: 10,
            },
            seed: 1,
            duration_ms: 0,
            restored: true,
            sensors: vec![
                sensor(SensorType::ACCELEROMETER, 10),
                sensor(SensorType::GYROSCOPE, 9),
                sensor(SensorType::PRESSURE, 11),
            ],
        };
        assert_eq!(report.passed(), 1);
        assert_eq!(report.failed(), 2);
        assert!(report.to_string().contains("FAIL 9/10"));
        assert!(report.to_json().unwrap().contains("\"responses\": 11"));
    }
}
