//! In-process simulated hub for CI/CD testing without physical hardware.
//!
//! [`SimHub`] implements both [`Transport`] and [`Platform`].  Enabled
//! sensors produce events at their programmed period on a Tokio task each,
//! flushes are answered with a `FlushComplete` marker, and the platform reset
//! drops every active sensor just like a real coprocessor reboot.  Fault
//! injection hooks (silence, failing commands, failing resets, raw event
//! injection) let the recovery paths run in headless tests.
//!
//! # Example
//!
//! ```rust
//! use shub_hal::sim::SimHub;
//! use shub_hal::transport::Transport;
//! use shub_types::{HubCommand, Opcode, SensorConfig, SensorType};
//!
//! # tokio_test_block_on(async {
//! let hub = SimHub::builder().with_motion_sensors().build();
//! hub.send_command(HubCommand::configure(
//!     Opcode::Enable,
//!     SensorType::ACCELEROMETER,
//!     SensorConfig::new(10, 0),
//! ))
//! .await
//! .expect("sim enable must succeed");
//! assert_eq!(hub.enabled_sensors(), vec![SensorType::ACCELEROMETER]);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use shub_types::{
    CalibrationItem, HubCommand, HubError, HubEvent, HubResponse, Notification, Opcode,
    OperationStats, SensorCapability, SensorConfig, SensorType, TimingStat,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::notifier::Notifier;
use crate::platform::Platform;
use crate::storage::CalibrationStorage;
use crate::transport::Transport;

// ────────────────────────────────────────────────────────────────────────────
// Simulated hub state
// ────────────────────────────────────────────────────────────────────────────

struct ActiveSensor {
    config: SensorConfig,
    generator: JoinHandle<()>,
}

#[derive(Default)]
struct SimState {
    capabilities: BTreeMap<SensorType, u32>,
    active: HashMap<SensorType, ActiveSensor>,
    last_ts: HashMap<SensorType, u64>,
    stats: BTreeMap<SensorType, OperationStats>,
    commands: Vec<HubCommand>,
    silent: u64,
    unanswered_flush: u64,
    failing: HashSet<(Opcode, Option<SensorType>)>,
    timing_out: HashSet<Opcode>,
    fail_reset: bool,
    stuck_in_boot: bool,
    fail_dump: bool,
    resets: u32,
    awake: bool,
    pending: usize,
}

impl SimState {
    fn probe_bitmap(&self) -> u64 {
        self.capabilities.keys().fold(0, |acc, s| acc | s.bit())
    }

    fn is_probed(&self, sensor: SensorType) -> bool {
        self.capabilities.contains_key(&sensor)
    }

    /// Strictly increasing per-sensor timestamp.
    fn stamp(&mut self, sensor: SensorType, now_ns: u64) -> u64 {
        let last = self.last_ts.get(&sensor).copied().unwrap_or(0);
        let ts = now_ns.max(last + 1);
        self.last_ts.insert(sensor, ts);
        ts
    }

    fn stats_mut(&mut self, sensor: SensorType) -> &mut OperationStats {
        self.stats.entry(sensor).or_insert(OperationStats {
            sensor,
            open: TimingStat::default(),
            read: TimingStat::default(),
            close: TimingStat::default(),
        })
    }

    fn stop(&mut self, sensor: SensorType) -> bool {
        match self.active.remove(&sensor) {
            Some(active) => {
                active.generator.abort();
                true
            }
            None => false,
        }
    }
}

fn record_timing(stat: &mut TimingStat, us: u32) {
    if stat.count == 0 || us < stat.min_us {
        stat.min_us = us;
    }
    stat.max_us = stat.max_us.max(us);
    stat.count += 1;
    stat.sum_us += u64::from(us);
}

fn synthetic_payload(sensor: SensorType, seq: u32) -> Vec<u8> {
    let len = match sensor {
        SensorType::ACCELEROMETER
        | SensorType::MAGNETOMETER
        | SensorType::GYROSCOPE
        | SensorType::GRAVITY
        | SensorType::LINEAR_ACCELERATION => 6,
        SensorType::MAGNETOMETER_UNCALIBRATED | SensorType::GYROSCOPE_UNCALIBRATED => 12,
        SensorType::ROTATION_VECTOR
        | SensorType::GAME_ROTATION_VECTOR
        | SensorType::GEOMAGNETIC_ROTATION_VECTOR => 16,
        SensorType::STEP_COUNTER => 8,
        _ => 4,
    };
    (0..len).map(|i| (seq as usize + i) as u8).collect()
}

struct SimInner {
    epoch: Instant,
    firmware_version: u32,
    state: Mutex<SimState>,
    tx: mpsc::UnboundedSender<HubEvent>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<HubEvent>>>,
}

impl SimInner {
    fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn emit_sample(&self, sensor: SensorType, seq: u32) {
        let event = {
            let mut state = self.state.lock();
            if state.silent & sensor.bit() != 0 {
                return;
            }
            let ts = state.stamp(sensor, self.now_ns());
            record_timing(&mut state.stats_mut(sensor).read, 40 + u32::from(sensor.raw()));
            HubEvent::data(sensor, ts, synthetic_payload(sensor, seq))
        };
        let _ = self.tx.send(event);
    }
}

fn spawn_generator(inner: Weak<SimInner>, sensor: SensorType, config: SensorConfig) -> JoinHandle<()> {
    let period = Duration::from_millis(u64::from(config.sampling_period_ms.max(1)));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut seq = 0u32;
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else { break };
            inner.emit_sample(sensor, seq);
            seq = seq.wrapping_add(1);
        }
    })
}

// ────────────────────────────────────────────────────────────────────────────
// SimHub
// ────────────────────────────────────────────────────────────────────────────

/// Simulated hub.  Clones share the same underlying state.
#[derive(Clone)]
pub struct SimHub {
    inner: Arc<SimInner>,
}

impl SimHub {
    /// Start building a simulated hub.
    pub fn builder() -> SimHubBuilder {
        SimHubBuilder::default()
    }

    /// Sensors currently producing events, ascending.
    pub fn enabled_sensors(&self) -> Vec<SensorType> {
        let state = self.inner.state.lock();
        let mut sensors: Vec<_> = state.active.keys().copied().collect();
        sensors.sort();
        sensors
    }

    /// Configuration programmed for `sensor`, if active.
    pub fn active_config(&self, sensor: SensorType) -> Option<SensorConfig> {
        self.inner.state.lock().active.get(&sensor).map(|a| a.config)
    }

    /// Number of successful platform resets.
    pub fn reset_count(&self) -> u32 {
        self.inner.state.lock().resets
    }

    /// Every command received so far, in order.
    pub fn commands(&self) -> Vec<HubCommand> {
        self.inner.state.lock().commands.clone()
    }

    /// Commands received with `opcode`, in order.
    pub fn commands_with(&self, opcode: Opcode) -> Vec<HubCommand> {
        self.inner
            .state
            .lock()
            .commands
            .iter()
            .filter(|c| c.opcode == opcode)
            .cloned()
            .collect()
    }

    pub fn clear_command_log(&self) {
        self.inner.state.lock().commands.clear();
    }

    /// Whether the suspend-inhibit lock is currently held.
    pub fn is_awake(&self) -> bool {
        self.inner.state.lock().awake
    }

    /// Stop (or resume) event production for `sensor` while it stays enabled.
    pub fn set_silent(&self, sensor: SensorType, silent: bool) {
        let mut state = self.inner.state.lock();
        if silent {
            state.silent |= sensor.bit();
        } else {
            state.silent &= !sensor.bit();
        }
    }

    /// Leave flushes for `sensor` unanswered.
    pub fn set_flush_unanswered(&self, sensor: SensorType, unanswered: bool) {
        let mut state = self.inner.state.lock();
        if unanswered {
            state.unanswered_flush |= sensor.bit();
        } else {
            state.unanswered_flush &= !sensor.bit();
        }
    }

    /// Make the platform reset primitive fail until cleared.
    pub fn set_reset_failure(&self, fail: bool) {
        self.inner.state.lock().fail_reset = fail;
    }

    /// Let resets succeed but keep the hub from coming back up.
    pub fn set_stuck_in_boot(&self, stuck: bool) {
        self.inner.state.lock().stuck_in_boot = stuck;
    }

    pub fn set_dump_failure(&self, fail: bool) {
        self.inner.state.lock().fail_dump = fail;
    }

    /// Fail `opcode` (for one sensor, or for all when `sensor` is `None`).
    pub fn fail_command(&self, opcode: Opcode, sensor: Option<SensorType>) {
        self.inner.state.lock().failing.insert((opcode, sensor));
    }

    /// Report every `opcode` command as timed out.
    pub fn time_out_command(&self, opcode: Opcode) {
        self.inner.state.lock().timing_out.insert(opcode);
    }

    pub fn clear_failures(&self) {
        let mut state = self.inner.state.lock();
        state.failing.clear();
        state.timing_out.clear();
        state.fail_reset = false;
        state.stuck_in_boot = false;
        state.fail_dump = false;
    }

    /// Pretend `count` commands are queued in the channel.
    pub fn queue_pending(&self, count: usize) {
        self.inner.state.lock().pending += count;
    }

    /// Deliver an arbitrary event, bypassing the generators.
    pub fn inject_event(&self, event: HubEvent) {
        let _ = self.inner.tx.send(event);
    }

    fn reject(&self, state: &SimState, command: &HubCommand) -> Result<(), HubError> {
        if state.timing_out.contains(&command.opcode) {
            return Err(HubError::Timeout {
                opcode: command.opcode,
            });
        }
        if state.failing.contains(&(command.opcode, command.sensor))
            || state.failing.contains(&(command.opcode, None))
        {
            return Err(HubError::CommandFailed {
                opcode: command.opcode,
                details: "simulated failure".to_string(),
            });
        }
        Ok(())
    }

    fn present_sensor(state: &SimState, command: &HubCommand) -> Result<SensorType, HubError> {
        match command.sensor {
            Some(sensor) if state.is_probed(sensor) => Ok(sensor),
            Some(sensor) => Err(HubError::CommandFailed {
                opcode: command.opcode,
                details: format!("{sensor} is not present"),
            }),
            None => Err(HubError::Malformed {
                opcode: command.opcode,
                details: "command requires a sensor".to_string(),
            }),
        }
    }
}

#[async_trait]
impl Transport for SimHub {
    async fn send_command(&self, command: HubCommand) -> Result<HubResponse, HubError> {
        tokio::task::yield_now().await;

        let mut flush_event = None;
        let response = {
            let mut state = self.inner.state.lock();
            state.commands.push(command.clone());
            self.reject(&state, &command)?;

            match command.opcode {
                Opcode::Enable | Opcode::ChangeDelay => {
                    let sensor = Self::present_sensor(&state, &command)?;
                    let config = command.sensor_config().ok_or_else(|| HubError::Malformed {
                        opcode: command.opcode,
                        details: "missing period/latency payload".to_string(),
                    })?;
                    state.stop(sensor);
                    let generator = spawn_generator(Arc::downgrade(&self.inner), sensor, config);
                    state.active.insert(sensor, ActiveSensor { config, generator });
                    record_timing(&mut state.stats_mut(sensor).open, 120 + u32::from(sensor.raw()));
                    HubResponse::Ack
                }
                Opcode::Disable => {
                    let sensor = Self::present_sensor(&state, &command)?;
                    if state.stop(sensor) {
                        record_timing(&mut state.stats_mut(sensor).close, 80 + u32::from(sensor.raw()));
                    }
                    HubResponse::Ack
                }
                Opcode::Flush => {
                    let sensor = Self::present_sensor(&state, &command)?;
                    if state.unanswered_flush & sensor.bit() == 0 {
                        let ts = state.stamp(sensor, self.inner.now_ns());
                        flush_event = Some(HubEvent::flush_complete(sensor, ts));
                    }
                    HubResponse::Ack
                }
                Opcode::SystemCheck => {
                    state.stats.clear();
                    HubResponse::Ack
                }
                Opcode::GetScanningInfo => HubResponse::Scanning {
                    probe_bitmap: state.probe_bitmap(),
                },
                Opcode::GetFirmwareVersion => HubResponse::Firmware {
                    version: self.inner.firmware_version,
                },
                Opcode::GetCapabilities => HubResponse::Capabilities(
                    state
                        .capabilities
                        .iter()
                        .map(|(sensor, min_period_us)| SensorCapability {
                            sensor: *sensor,
                            min_period_us: *min_period_us,
                        })
                        .collect(),
                ),
                Opcode::GetOperationStats => {
                    HubResponse::OperationStats(state.stats.values().copied().collect())
                }
                Opcode::SuspendStatus
                | Opcode::SpecialMode
                | Opcode::PushCalibration
                | Opcode::SetPosition => HubResponse::Ack,
            }
        };

        if let Some(event) = flush_event {
            let _ = self.inner.tx.send(event);
        }
        Ok(response)
    }

    fn discard_pending(&self) -> usize {
        std::mem::take(&mut self.inner.state.lock().pending)
    }

    fn event_stream(&self) -> BoxStream<'static, HubEvent> {
        match self.inner.rx.lock().take() {
            Some(rx) => stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (event, rx))
            })
            .boxed(),
            None => stream::empty().boxed(),
        }
    }
}

impl Platform for SimHub {
    fn reset_hub(&self) -> Result<(), HubError> {
        let mut state = self.inner.state.lock();
        if state.fail_reset {
            return Err(HubError::ResetFailed("simulated reset failure".to_string()));
        }
        let sensors: Vec<_> = state.active.keys().copied().collect();
        for sensor in sensors {
            state.stop(sensor);
        }
        state.resets += 1;
        debug!(resets = state.resets, "simulated hub reset");
        Ok(())
    }

    fn is_hub_alive(&self) -> bool {
        let state = self.inner.state.lock();
        state.probe_bitmap() != 0 && !state.fail_reset && !state.stuck_in_boot
    }

    fn stay_awake(&self, hold: bool) {
        self.inner.state.lock().awake = hold;
    }

    fn read_memory_dump(&self) -> Result<Vec<u8>, HubError> {
        let state = self.inner.state.lock();
        if state.fail_dump {
            return Err(HubError::CommandFailed {
                opcode: Opcode::GetScanningInfo,
                details: "simulated dump failure".to_string(),
            });
        }
        let mut image = b"SIMHUB".to_vec();
        image.extend_from_slice(&state.resets.to_le_bytes());
        image.extend_from_slice(&state.probe_bitmap().to_le_bytes());
        Ok(image)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimHub builder
// ────────────────────────────────────────────────────────────────────────────

/// Builder for [`SimHub`].  Call the `with_*` methods to declare which
/// sensors the simulated hub reports as present, then [`build`][Self::build].
#[derive(Default)]
pub struct SimHubBuilder {
    capabilities: BTreeMap<SensorType, u32>,
    firmware_version: u32,
}

impl SimHubBuilder {
    /// Declare `sensor` present with the given fastest period.
    pub fn with_sensor(mut self, sensor: SensorType, min_period_us: u32) -> Self {
        self.capabilities.insert(sensor, min_period_us);
        self
    }

    /// Accelerometer, magnetometer, gyroscope and their derived types.
    pub fn with_motion_sensors(self) -> Self {
        self.with_sensor(SensorType::ACCELEROMETER, 5_000)
            .with_sensor(SensorType::MAGNETOMETER, 10_000)
            .with_sensor(SensorType::GYROSCOPE, 5_000)
            .with_sensor(SensorType::MAGNETOMETER_UNCALIBRATED, 10_000)
            .with_sensor(SensorType::GAME_ROTATION_VECTOR, 5_000)
            .with_sensor(SensorType::GYROSCOPE_UNCALIBRATED, 5_000)
    }

    /// Barometer and light sensor.
    pub fn with_environment_sensors(self) -> Self {
        self.with_sensor(SensorType::PRESSURE, 100_000)
            .with_sensor(SensorType::LIGHT, 200_000)
    }

    pub fn with_firmware_version(mut self, version: u32) -> Self {
        self.firmware_version = version;
        self
    }

    /// Consume the builder.  Must be called inside a Tokio runtime before the
    /// first sensor is enabled.
    pub fn build(self) -> SimHub {
        let (tx, rx) = mpsc::unbounded_channel();
        SimHub {
            inner: Arc::new(SimInner {
                epoch: Instant::now(),
                firmware_version: self.firmware_version,
                state: Mutex::new(SimState {
                    capabilities: self.capabilities,
                    ..SimState::default()
                }),
                tx,
                rx: Mutex::new(Some(rx)),
            }),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stub storage and notifier
// ────────────────────────────────────────────────────────────────────────────

/// In-memory calibration storage.
#[derive(Default)]
pub struct SimStorage {
    ready: Mutex<bool>,
    items: Mutex<Vec<CalibrationItem>>,
}

impl SimStorage {
    pub fn new(ready: bool, items: Vec<CalibrationItem>) -> Self {
        Self {
            ready: Mutex::new(ready),
            items: Mutex::new(items),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        *self.ready.lock() = ready;
    }
}

impl CalibrationStorage for SimStorage {
    fn is_ready(&self) -> bool {
        *self.ready.lock()
    }

    fn load_all(&self) -> Result<Vec<CalibrationItem>, HubError> {
        Ok(self.items.lock().clone())
    }
}

/// Notifier that records everything it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().clone()
    }

    /// Number of `ResetOccurred` notifications seen so far.
    pub fn reset_count(&self) -> usize {
        self.seen
            .lock()
            .iter()
            .filter(|n| matches!(n, Notification::ResetOccurred { .. }))
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn broadcast(&self, notification: Notification) {
        self.seen.lock().push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shub_types::EventKind;

    async fn enable(hub: &SimHub, sensor: SensorType, period_ms: u32) {
        hub.send_command(HubCommand::configure(
            Opcode::Enable,
            sensor,
            SensorConfig::new(period_ms, 0),
        ))
        .await
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn enabled_sensor_emits_at_its_period() {
        let hub = SimHub::builder().with_motion_sensors().build();
        let mut events = hub.event_stream();
        enable(&hub, SensorType::ACCELEROMETER, 10).await;

        let first = events.next().await.unwrap();
        let second = events.next().await.unwrap();
        assert_eq!(first.sensor, SensorType::ACCELEROMETER);
        assert_eq!(first.kind, EventKind::Data);
        assert_eq!(second.timestamp_ns - first.timestamp_ns, 10_000_000);
        assert_eq!(first.payload.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_sensor_produces_nothing() {
        let hub = SimHub::builder().with_motion_sensors().build();
        let mut events = hub.event_stream();
        hub.set_silent(SensorType::GYROSCOPE, true);
        enable(&hub, SensorType::GYROSCOPE, 10).await;

        let got = tokio::time::timeout(Duration::from_millis(100), events.next()).await;
        assert!(got.is_err(), "silent sensor must not emit");
    }

    #[tokio::test(start_paused = true)]
    async fn flush_is_answered_with_marker() {
        let hub = SimHub::builder().with_motion_sensors().build();
        let mut events = hub.event_stream();
        hub.send_command(HubCommand::for_sensor(Opcode::Flush, SensorType::MAGNETOMETER))
            .await
            .unwrap();
        let marker = events.next().await.unwrap();
        assert_eq!(marker.kind, EventKind::FlushComplete);
        assert_eq!(marker.sensor, SensorType::MAGNETOMETER);
    }

    #[tokio::test]
    async fn absent_sensor_cannot_be_enabled() {
        let hub = SimHub::builder().with_motion_sensors().build();
        let result = hub
            .send_command(HubCommand::configure(
                Opcode::Enable,
                SensorType::PROXIMITY,
                SensorConfig::new(10, 0),
            ))
            .await;
        assert!(matches!(result, Err(HubError::CommandFailed { .. })));
    }

    #[tokio::test]
    async fn reset_drops_active_sensors() {
        let hub = SimHub::builder().with_motion_sensors().build();
        enable(&hub, SensorType::ACCELEROMETER, 10).await;
        enable(&hub, SensorType::GYROSCOPE, 10).await;
        assert_eq!(hub.enabled_sensors().len(), 2);

        hub.reset_hub().unwrap();
        assert!(hub.enabled_sensors().is_empty());
        assert_eq!(hub.reset_count(), 1);

        hub.set_reset_failure(true);
        assert!(matches!(hub.reset_hub(), Err(HubError::ResetFailed(_))));
        assert_eq!(hub.reset_count(), 1);
        hub.clear_failures();

        hub.set_stuck_in_boot(true);
        hub.reset_hub().unwrap();
        assert!(!hub.is_hub_alive());
        hub.set_stuck_in_boot(false);
        assert!(hub.is_hub_alive());
    }

    #[tokio::test]
    async fn injected_failures_surface_as_errors() {
        let hub = SimHub::builder().with_motion_sensors().build();
        hub.time_out_command(Opcode::GetFirmwareVersion);
        hub.fail_command(Opcode::Flush, Some(SensorType::GYROSCOPE));

        let timeout = hub.send_command(HubCommand::new(Opcode::GetFirmwareVersion)).await;
        assert!(matches!(timeout, Err(HubError::Timeout { .. })));
        let failed = hub
            .send_command(HubCommand::for_sensor(Opcode::Flush, SensorType::GYROSCOPE))
            .await;
        assert!(matches!(failed, Err(HubError::CommandFailed { .. })));
        let ok = hub
            .send_command(HubCommand::for_sensor(Opcode::Flush, SensorType::ACCELEROMETER))
            .await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn discard_pending_empties_the_queue() {
        let hub = SimHub::builder().build();
        hub.queue_pending(3);
        assert_eq!(hub.discard_pending(), 3);
        assert_eq!(hub.discard_pending(), 0);
    }

    #[tokio::test]
    async fn scanning_info_reports_probed_sensors() {
        let hub = SimHub::builder()
            .with_sensor(SensorType::ACCELEROMETER, 5_000)
            .with_sensor(SensorType::PRESSURE, 100_000)
            .build();
        let resp = hub.send_command(HubCommand::new(Opcode::GetScanningInfo)).await.unwrap();
        assert_eq!(
            resp,
            HubResponse::Scanning {
                probe_bitmap: SensorType::ACCELEROMETER.bit() | SensorType::PRESSURE.bit()
            }
        );
    }
}
