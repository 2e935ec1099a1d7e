//! [`HealthMonitor`] – hub liveness watchdog.
//!
//! The hub has no heartbeat of its own; its vital sensors are the heartbeat.
//! A vital sensor that is enabled, un-batched and has not delivered an event
//! for longer than the no-event threshold means the hub is silent, and the
//! only cure is a reset.
//!
//! [`HealthMonitor::inspect`] is the pure check; the periodic task in
//! [`run`] adds the policy (skip while a reset or a diagnostic campaign owns
//! the hub, log a summary every tick, restart the period after each reset).
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use shub_kernel::health::{HealthMonitor, SensorHealth};
//! use shub_kernel::state_table::SensorStateTable;
//! use shub_types::{SensorConfig, SensorType};
//!
//! let monitor = HealthMonitor::new(vec![SensorType::ACCELEROMETER], Duration::from_secs(5));
//! let table = SensorStateTable::new();
//! table.enable(SensorType::ACCELEROMETER, SensorConfig::new(10, 0), 1_000).unwrap();
//!
//! let later = 1_000 + 6_000_000_000;
//! assert!(matches!(
//!     monitor.health(&table, SensorType::ACCELEROMETER, later),
//!     SensorHealth::Silent { .. }
//! ));
//! assert_eq!(monitor.inspect(&table, later), vec![SensorType::ACCELEROMETER]);
//! ```

use std::sync::Arc;
use std::time::Duration;

use shub_types::{BoardConfig, ResetReason, SensorType};
use tracing::{debug, info, warn};

use crate::hub::HubContext;
use crate::state_table::SensorStateTable;
use crate::supervisor::HubPhase;

/// Liveness verdict for one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorHealth {
    /// Not enabled.
    Idle,
    /// Batched delivery; long gaps are expected.
    Batched,
    /// Delivered an event within the threshold.
    Healthy,
    /// No event for longer than the threshold.
    Silent { silent_for_ms: u64 },
}

/// Pure no-event detector over the sensor table.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    vital: Vec<SensorType>,
    threshold: Duration,
}

impl HealthMonitor {
    pub fn new(vital: Vec<SensorType>, threshold: Duration) -> Self {
        Self { vital, threshold }
    }

    pub fn from_config(config: &BoardConfig) -> Self {
        Self::new(config.vital_sensors.clone(), config.no_event_threshold())
    }

    pub fn vital_sensors(&self) -> &[SensorType] {
        &self.vital
    }

    /// Verdict for `sensor` at host time `now_ns`.
    pub fn health(&self, table: &SensorStateTable, sensor: SensorType, now_ns: u64) -> SensorHealth {
        let Some(config) = table.config(sensor) else {
            return SensorHealth::Idle;
        };
        if !config.is_unbatched() {
            return SensorHealth::Batched;
        }
        let silent_for = now_ns.saturating_sub(table.state(sensor).last_event_ns);
        if silent_for > self.threshold.as_nanos() as u64 {
            SensorHealth::Silent {
                silent_for_ms: silent_for / 1_000_000,
            }
        } else {
            SensorHealth::Healthy
        }
    }

    /// Vital sensors that are silent at `now_ns`.
    pub fn inspect(&self, table: &SensorStateTable, now_ns: u64) -> Vec<SensorType> {
        self.vital
            .iter()
            .copied()
            .filter(|s| matches!(self.health(table, *s, now_ns), SensorHealth::Silent { .. }))
            .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Periodic task
// ────────────────────────────────────────────────────────────────────────────

pub(crate) async fn run(ctx: Arc<HubContext>) {
    let mut shutdown = ctx.shutdown_signal();
    let period = ctx.config.health_period();
    loop {
        tokio::select! {
            _ = tokio::time::sleep(period) => {
                tick(&ctx);
            }
            _ = ctx.health_rearm.notified() => {
                debug!("health tick re-armed");
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("health monitor stopped");
}

/// One inspection.  Returns whether a reset was requested.
pub(crate) fn tick(ctx: &HubContext) -> bool {
    let counters = ctx.counters.snapshot();
    info!(
        probe = format_args!("{:#x}", ctx.table.probe_bitmap()),
        enabled = format_args!("{:#x}", ctx.table.enabled_bitmap()),
        reset = counters.reset,
        timeout = counters.timeout,
        com_fail = counters.com_fail,
        no_event_reset = counters.no_event_reset,
        "hub health"
    );

    if ctx.supervisor.is_busy() || ctx.phase.get() != HubPhase::Idle {
        debug!("reset in flight; health check skipped");
        return false;
    }
    if ctx.campaign_active() {
        debug!("diagnostic campaign owns the hub; health check skipped");
        return false;
    }

    let silent = ctx.health.inspect(&ctx.table, ctx.now_ns());
    if silent.is_empty() {
        return false;
    }
    let names: Vec<String> = silent.iter().map(|s| ctx.registry.name_of(*s)).collect();
    warn!(sensors = ?names, "vital sensors silent; resetting hub");
    ctx.counters.bump_no_event_reset();
    drop(ctx.supervisor.request(ResetReason::NoEvent));
    true
}
