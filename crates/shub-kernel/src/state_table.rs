//! [`SensorStateTable`] – per-sensor enablement and configuration.
//!
//! The table is the desired state of the hub: which sensors the host wants
//! running and with which period/latency.  It survives hub resets untouched;
//! the supervisor re-applies it after every reset.  It also carries the
//! host-side arrival time of each sensor's last event for the health monitor.
//!
//! Locks are never held across an `.await`.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use shub_types::{HubError, MAX_SENSOR_TYPES, SensorConfig, SensorType, sensors_in};

/// State of one sensor slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorState {
    pub config: SensorConfig,
    /// Host monotonic arrival time of the last event, ns.  `0` = never.
    pub last_event_ns: u64,
}

/// Enable bitmap plus the configuration of every enabled sensor.
///
/// Two snapshots compare equal exactly when the same sensors are enabled with
/// the same period and latency.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateSnapshot {
    pub enabled: u64,
    pub configs: BTreeMap<SensorType, SensorConfig>,
}

impl StateSnapshot {
    pub fn sensors(&self) -> impl Iterator<Item = SensorType> + '_ {
        sensors_in(self.enabled)
    }
}

struct TableInner {
    enabled: u64,
    probed: u64,
    sensors: [SensorState; MAX_SENSOR_TYPES],
}

/// Process-lifetime sensor table owned by the hub context.
pub struct SensorStateTable {
    inner: RwLock<TableInner>,
}

impl Default for SensorStateTable {
    fn default() -> Self {
        Self {
            inner: RwLock::new(TableInner {
                enabled: 0,
                probed: 0,
                sensors: [SensorState::default(); MAX_SENSOR_TYPES],
            }),
        }
    }
}

impl SensorStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `sensor` enabled with `config`.  The last-event time is reset to
    /// `now_ns` so a freshly enabled sensor gets a full silence window.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidConfig`] for a zero sampling period; the
    /// table is left unchanged.
    pub fn enable(&self, sensor: SensorType, config: SensorConfig, now_ns: u64) -> Result<(), HubError> {
        config.validate()?;
        let mut inner = self.inner.write();
        inner.enabled |= sensor.bit();
        let slot = &mut inner.sensors[sensor.index()];
        slot.config = config;
        slot.last_event_ns = now_ns;
        Ok(())
    }

    /// Clear the enable bit.  The stored configuration is kept.
    pub fn disable(&self, sensor: SensorType) {
        self.inner.write().enabled &= !sensor.bit();
    }

    pub fn is_enabled(&self, sensor: SensorType) -> bool {
        self.inner.read().enabled & sensor.bit() != 0
    }

    /// Configuration of `sensor` if it is enabled.
    pub fn config(&self, sensor: SensorType) -> Option<SensorConfig> {
        let inner = self.inner.read();
        (inner.enabled & sensor.bit() != 0).then(|| inner.sensors[sensor.index()].config)
    }

    pub fn state(&self, sensor: SensorType) -> SensorState {
        self.inner.read().sensors[sensor.index()]
    }

    pub fn enabled_bitmap(&self) -> u64 {
        self.inner.read().enabled
    }

    pub fn probe_bitmap(&self) -> u64 {
        self.inner.read().probed
    }

    pub fn set_probe_bitmap(&self, probed: u64) {
        self.inner.write().probed = probed;
    }

    /// Whether the hub reported its sensor set and `sensor` is not in it.
    /// Nothing is unreported before the first scan.
    pub fn is_unreported(&self, sensor: SensorType) -> bool {
        let probed = self.inner.read().probed;
        probed != 0 && probed & sensor.bit() == 0
    }

    /// Record event arrival for `sensor`.
    pub fn record_event(&self, sensor: SensorType, now_ns: u64) {
        self.inner.write().sensors[sensor.index()].last_event_ns = now_ns;
    }

    /// Capture the enable bitmap and every enabled sensor's configuration.
    pub fn snapshot(&self) -> StateSnapshot {
        let inner = self.inner.read();
        let configs = sensors_in(inner.enabled)
            .map(|s| (s, inner.sensors[s.index()].config))
            .collect();
        StateSnapshot {
            enabled: inner.enabled,
            configs,
        }
    }

    /// Put the table back to `snapshot`.  Sensors enabled since the snapshot
    /// are disabled; every snapshot sensor gets its recorded configuration
    /// and a fresh silence window starting at `now_ns`.
    pub fn restore(&self, snapshot: &StateSnapshot, now_ns: u64) {
        let mut inner = self.inner.write();
        inner.enabled = snapshot.enabled;
        for (sensor, config) in &snapshot.configs {
            let slot = &mut inner.sensors[sensor.index()];
            slot.config = *config;
            slot.last_event_ns = now_ns;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enable_rejects_zero_period() {
        let table = SensorStateTable::new();
        assert!(table.enable(SensorType::ACCELEROMETER, SensorConfig::new(0, 0), 1).is_err());
        assert!(!table.is_enabled(SensorType::ACCELEROMETER));
    }

    #[test]
    fn disable_keeps_config_but_hides_it() {
        let table = SensorStateTable::new();
        table
            .enable(SensorType::GYROSCOPE, SensorConfig::new(5, 0), 10)
            .unwrap();
        assert_eq!(table.config(SensorType::GYROSCOPE), Some(SensorConfig::new(5, 0)));

        table.disable(SensorType::GYROSCOPE);
        assert_eq!(table.config(SensorType::GYROSCOPE), None);
        assert_eq!(table.state(SensorType::GYROSCOPE).config, SensorConfig::new(5, 0));
    }

    #[test]
    fn snapshot_restore_round_trips_enabled_set() {
        let table = SensorStateTable::new();
        table
            .enable(SensorType::ACCELEROMETER, SensorConfig::new(10, 0), 1)
            .unwrap();
        table
            .enable(SensorType::PRESSURE, SensorConfig::new(100, 1000), 1)
            .unwrap();
        let before = table.snapshot();

        table.disable(SensorType::ACCELEROMETER);
        table
            .enable(SensorType::GYROSCOPE, SensorConfig::new(5, 0), 2)
            .unwrap();
        table
            .enable(SensorType::PRESSURE, SensorConfig::new(20, 0), 2)
            .unwrap();
        assert_ne!(table.snapshot(), before);

        table.restore(&before, 3);
        assert_eq!(table.snapshot(), before);
        assert_eq!(table.state(SensorType::ACCELEROMETER).last_event_ns, 3);
    }

    #[test]
    fn unreported_only_after_a_scan() {
        let table = SensorStateTable::new();
        assert!(!table.is_unreported(SensorType::LIGHT));

        table.set_probe_bitmap(SensorType::ACCELEROMETER.bit() | SensorType::GYROSCOPE.bit());
        assert!(!table.is_unreported(SensorType::GYROSCOPE));
        assert!(table.is_unreported(SensorType::LIGHT));
    }

    #[test]
    fn record_event_updates_timestamp() {
        let table = SensorStateTable::new();
        table.record_event(SensorType::LIGHT, 42);
        assert_eq!(table.state(SensorType::LIGHT).last_event_ns, 42);
    }
}
