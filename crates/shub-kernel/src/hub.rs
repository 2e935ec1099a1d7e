//! [`SensorHub`] – the context object that owns the whole recovery core.
//!
//! One `SensorHub` is built per physical hub.  It owns the sensor table, the
//! counters, the reset record and the dump capture, and runs three
//! long-lived Tokio tasks once [`SensorHub::start`] is called:
//!
//! - the event pump, draining [`Transport::event_stream`] into the table
//!   and the installed [`EventTap`];
//! - the reset supervisor worker (see [`crate::supervisor`]);
//! - the health monitor tick (see [`crate::health`]).
//!
//! Handles are cheap to clone; every clone talks to the same hub.
//!
//! # Example
//!
//! ```rust
//! use shub_hal::SimHub;
//! use shub_kernel::SensorHub;
//! use shub_types::{SensorConfig, SensorType};
//!
//! # tokio_test_block_on(async {
//! let sim = SimHub::builder().with_motion_sensors().build();
//! let hub = SensorHub::builder().with_sim(sim.clone()).build().expect("sim hub");
//! hub.start().await.expect("probe must succeed");
//!
//! hub.enable_sensor(SensorType::ACCELEROMETER, SensorConfig::new(10, 0))
//!     .await
//!     .expect("enable");
//! assert_eq!(sim.enabled_sensors(), vec![SensorType::ACCELEROMETER]);
//! hub.stop();
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use parking_lot::{Mutex, RwLock};
use shub_hal::{
    CalibrationStorage, NoCalibrationStorage, Notifier, NullNotifier, Platform, SensorRegistry,
    SimHub, Transport,
};
use shub_types::{
    BoardConfig, CounterSnapshot, EventKind, HubCommand, HubError, HubEvent, HubResponse,
    MAX_SENSOR_TYPES, Notification, Opcode, OperationStats, ResetReason, ResetRecord,
    SensorCapability, SensorConfig, SensorType, SuspendStatus, sensors_in,
};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::counters::{Counters, FailureStreak};
use crate::dump::{DumpCapture, DumpInfo, DumpStore, FileDumpStore, MemoryDumpStore};
use crate::health::{self, HealthMonitor};
use crate::state_table::{SensorStateTable, StateSnapshot};
use crate::supervisor::{self, HubPhase, PhaseCell, ResetSupervisor, ResetTicket};

/// Observer of every inbound hub event, installed by diagnostics code.
///
/// Called on the event-pump task; implementations must not block.
pub trait EventTap: Send + Sync {
    fn on_event(&self, event: &HubEvent);
}

// ────────────────────────────────────────────────────────────────────────────
// Shared context
// ────────────────────────────────────────────────────────────────────────────

pub(crate) struct HubContext {
    pub(crate) config: BoardConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) platform: Arc<dyn Platform>,
    pub(crate) storage: Arc<dyn CalibrationStorage>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) registry: SensorRegistry,
    pub(crate) table: SensorStateTable,
    pub(crate) counters: Counters,
    pub(crate) streak: FailureStreak,
    pub(crate) phase: PhaseCell,
    pub(crate) supervisor: ResetSupervisor,
    pub(crate) health: HealthMonitor,
    pub(crate) health_rearm: Notify,
    pub(crate) dumps: DumpCapture,
    pub(crate) last_reset: Mutex<Option<ResetRecord>>,
    pub(crate) firmware_version: Mutex<Option<u32>>,
    pub(crate) suspend_status: Mutex<Option<SuspendStatus>>,
    pub(crate) special_mode: Mutex<Option<u8>>,
    pub(crate) last_samples: RwLock<HashMap<SensorType, Vec<u8>>>,
    pub(crate) tap: RwLock<Option<Arc<dyn EventTap>>>,
    pub(crate) campaign_held: AtomicBool,
    /// One lock per sensor slot, held across a single enable/disable/re-arm.
    pub(crate) op_locks: Vec<tokio::sync::Mutex<()>>,
    epoch: Instant,
    shutdown: watch::Sender<bool>,
}

impl HubContext {
    /// Host monotonic time since the context was built, ns.
    pub(crate) fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    pub(crate) fn campaign_active(&self) -> bool {
        self.campaign_held.load(Ordering::Acquire)
    }

    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    fn deliver(&self, event: HubEvent) {
        if self.table.is_unreported(event.sensor) {
            self.counters.bump_com_fail();
            warn!(sensor = %event.sensor, kind = ?event.kind, "event from a sensor the hub never reported; dropped");
            return;
        }
        self.table.record_event(event.sensor, self.now_ns());
        if event.kind == EventKind::Data {
            self.last_samples
                .write()
                .insert(event.sensor, event.payload.clone());
        }
        let tap = self.tap.read().clone();
        if let Some(tap) = tap {
            tap.on_event(&event);
        }
    }

    /// Fetch probe bitmap and firmware version.  Failures are logged.
    pub(crate) async fn refresh_hub_info(&self) -> Result<(), HubError> {
        let probe = match self.command(HubCommand::new(Opcode::GetScanningInfo)).await? {
            HubResponse::Scanning { probe_bitmap } => probe_bitmap,
            other => {
                return Err(HubError::Malformed {
                    opcode: Opcode::GetScanningInfo,
                    details: format!("unexpected response {other:?}"),
                });
            }
        };
        self.table.set_probe_bitmap(probe);

        match self.command(HubCommand::new(Opcode::GetFirmwareVersion)).await {
            Ok(HubResponse::Firmware { version }) => {
                *self.firmware_version.lock() = Some(version);
                info!(probe = format_args!("{probe:#x}"), version, "hub info refreshed");
            }
            Ok(other) => warn!(?other, "unexpected firmware version response"),
            Err(e) => warn!(error = %e, "firmware version unavailable"),
        }
        Ok(())
    }
}

async fn pump_events(
    ctx: Arc<HubContext>,
    mut events: BoxStream<'static, HubEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            next = events.next() => match next {
                Some(event) => ctx.deliver(event),
                None => {
                    warn!("hub event stream closed");
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }
    debug!("event pump stopped");
}

// ────────────────────────────────────────────────────────────────────────────
// Status view
// ────────────────────────────────────────────────────────────────────────────

/// Per-sensor line of [`HubStatus`].
#[derive(Debug, Clone)]
pub struct SensorStatus {
    pub sensor: SensorType,
    pub name: String,
    pub config: SensorConfig,
    /// Time since the last event arrived, ms.
    pub silent_for_ms: u64,
    /// Formatted last data sample, if any arrived.
    pub last_sample: Option<String>,
}

/// Read-only debug snapshot of the hub.
#[derive(Debug, Clone)]
pub struct HubStatus {
    pub board: String,
    pub phase: HubPhase,
    pub firmware_version: Option<u32>,
    pub probe_bitmap: u64,
    pub enabled_bitmap: u64,
    pub counters: CounterSnapshot,
    pub last_reset: Option<ResetRecord>,
    pub last_dump: Option<DumpInfo>,
    pub campaign_active: bool,
    pub sensors: Vec<SensorStatus>,
}

// ────────────────────────────────────────────────────────────────────────────
// SensorHub
// ────────────────────────────────────────────────────────────────────────────

/// Handle to one supervised hub.
#[derive(Clone)]
pub struct SensorHub {
    ctx: Arc<HubContext>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl SensorHub {
    pub fn builder() -> SensorHubBuilder {
        SensorHubBuilder::default()
    }

    /// Spawn the event pump, the supervisor and the health tick, then probe
    /// the hub.
    ///
    /// # Errors
    ///
    /// Returns the probe failure; the background tasks keep running and the
    /// next reset retries the probe.
    pub async fn start(&self) -> Result<(), HubError> {
        {
            let mut tasks = self.tasks.lock();
            if !tasks.is_empty() {
                return Err(HubError::Busy("hub already started".to_string()));
            }
            let events = self.ctx.transport.event_stream();
            tasks.push(tokio::spawn(pump_events(
                Arc::clone(&self.ctx),
                events,
                self.ctx.shutdown_signal(),
            )));
            tasks.push(tokio::spawn(supervisor::run(Arc::clone(&self.ctx))));
            tasks.push(tokio::spawn(health::run(Arc::clone(&self.ctx))));
        }
        info!(board = %self.ctx.config.name, "sensor hub started");
        self.ctx.refresh_hub_info().await
    }

    /// Signal every background task to exit.
    pub fn stop(&self) {
        let _ = self.ctx.shutdown.send(true);
        self.tasks.lock().clear();
        info!("sensor hub stopped");
    }

    // ── Sensor operations ───────────────────────────────────────────────────

    /// Enable `sensor`, or re-arm it with a new configuration when it is
    /// already enabled.
    ///
    /// The table records the request even when the hub rejects it; the next
    /// reset re-applies it.
    pub async fn enable_sensor(&self, sensor: SensorType, config: SensorConfig) -> Result<(), HubError> {
        self.ctx.enable(sensor, config).await
    }

    pub async fn disable_sensor(&self, sensor: SensorType) -> Result<(), HubError> {
        self.ctx.disable(sensor).await
    }

    /// Ask the hub to drain `sensor`'s batch; a `FlushComplete` event follows.
    pub async fn flush(&self, sensor: SensorType) -> Result<(), HubError> {
        self.ctx.flush(sensor).await
    }

    /// Forward the host suspend state and remember it for resync.
    pub async fn set_suspend_status(&self, status: SuspendStatus) -> Result<(), HubError> {
        *self.ctx.suspend_status.lock() = Some(status);
        self.ctx.notifier.broadcast(Notification::SuspendStatusChanged(status));
        self.ctx
            .command(HubCommand::new(Opcode::SuspendStatus).with_sub_command(status.code()))
            .await
            .map(|_| ())
    }

    /// Put the hub in a vendor special mode and remember it for resync.
    pub async fn set_special_mode(&self, mode: u8) -> Result<(), HubError> {
        *self.ctx.special_mode.lock() = Some(mode);
        self.ctx
            .command(HubCommand::new(Opcode::SpecialMode).with_sub_command(mode))
            .await
            .map(|_| ())
    }

    /// Send a raw command through the accounting wrapper.
    pub async fn send_command(&self, command: HubCommand) -> Result<HubResponse, HubError> {
        self.ctx.command(command).await
    }

    /// Fastest supported period of every present sensor.
    pub async fn capabilities(&self) -> Result<Vec<SensorCapability>, HubError> {
        match self.ctx.command(HubCommand::new(Opcode::GetCapabilities)).await? {
            HubResponse::Capabilities(caps) => Ok(caps),
            other => Err(HubError::Malformed {
                opcode: Opcode::GetCapabilities,
                details: format!("unexpected response {other:?}"),
            }),
        }
    }

    /// Hub-measured open/read/close timings.
    pub async fn operation_stats(&self) -> Result<Vec<OperationStats>, HubError> {
        match self.ctx.command(HubCommand::new(Opcode::GetOperationStats)).await? {
            HubResponse::OperationStats(stats) => Ok(stats),
            other => Err(HubError::Malformed {
                opcode: Opcode::GetOperationStats,
                details: format!("unexpected response {other:?}"),
            }),
        }
    }

    // ── Reset ───────────────────────────────────────────────────────────────

    /// Run (or join) a reset sequence and wait for its outcome.
    ///
    /// # Errors
    ///
    /// Only a failing platform reset primitive is reported.
    pub async fn reset(&self, reason: ResetReason) -> Result<(), HubError> {
        self.request_reset(reason).wait().await
    }

    /// Queue a reset without waiting.  Drop the ticket to fire and forget.
    pub fn request_reset(&self, reason: ResetReason) -> ResetTicket {
        self.ctx.supervisor.request(reason)
    }

    pub fn phase(&self) -> HubPhase {
        self.ctx.phase.get()
    }

    pub fn last_reset(&self) -> Option<ResetRecord> {
        self.ctx.last_reset.lock().clone()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.ctx.counters.snapshot()
    }

    pub fn last_dump(&self) -> Option<DumpInfo> {
        self.ctx.dumps.last()
    }

    // ── Table access ────────────────────────────────────────────────────────

    pub fn probe_bitmap(&self) -> u64 {
        self.ctx.table.probe_bitmap()
    }

    pub fn enabled_bitmap(&self) -> u64 {
        self.ctx.table.enabled_bitmap()
    }

    pub fn sensor_config(&self, sensor: SensorType) -> Option<SensorConfig> {
        self.ctx.table.config(sensor)
    }

    pub fn state_snapshot(&self) -> StateSnapshot {
        self.ctx.table.snapshot()
    }

    /// Overwrite the table with `snapshot` without touching the hub.  The
    /// caller follows up with a reset to push it.
    pub fn restore_state(&self, snapshot: &StateSnapshot) {
        self.ctx.table.restore(snapshot, self.ctx.now_ns());
    }

    pub fn registry(&self) -> &SensorRegistry {
        &self.ctx.registry
    }

    pub fn config(&self) -> &BoardConfig {
        &self.ctx.config
    }

    /// Downstream notifier shared with diagnostics code.
    pub fn notifier(&self) -> Arc<dyn Notifier> {
        Arc::clone(&self.ctx.notifier)
    }

    // ── Diagnostics hooks ───────────────────────────────────────────────────

    /// Install `tap`, replacing any previous one.
    pub fn install_tap(&self, tap: Arc<dyn EventTap>) {
        *self.ctx.tap.write() = Some(tap);
    }

    pub fn remove_tap(&self) {
        *self.ctx.tap.write() = None;
    }

    /// Keep the health monitor and command escalation from resetting the hub
    /// until the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// [`HubError::Busy`] if another hold is alive.
    pub fn hold_campaign(&self) -> Result<CampaignHold, HubError> {
        if self.ctx.campaign_held.swap(true, Ordering::AcqRel) {
            return Err(HubError::Busy("a diagnostic campaign already holds the hub".to_string()));
        }
        Ok(CampaignHold {
            ctx: Arc::clone(&self.ctx),
        })
    }

    /// Debug read-only view of the whole hub.
    pub fn status(&self) -> HubStatus {
        let ctx = &self.ctx;
        let now = ctx.now_ns();
        let samples = ctx.last_samples.read();
        let enabled = ctx.table.enabled_bitmap();
        let sensors = sensors_in(enabled)
            .map(|sensor| {
                let state = ctx.table.state(sensor);
                SensorStatus {
                    sensor,
                    name: ctx.registry.name_of(sensor),
                    config: state.config,
                    silent_for_ms: now.saturating_sub(state.last_event_ns) / 1_000_000,
                    last_sample: samples
                        .get(&sensor)
                        .map(|payload| ctx.registry.describe(sensor, payload)),
                }
            })
            .collect();

        HubStatus {
            board: ctx.config.name.clone(),
            phase: ctx.phase.get(),
            firmware_version: *ctx.firmware_version.lock(),
            probe_bitmap: ctx.table.probe_bitmap(),
            enabled_bitmap: enabled,
            counters: ctx.counters.snapshot(),
            last_reset: ctx.last_reset.lock().clone(),
            last_dump: ctx.dumps.last(),
            campaign_active: ctx.campaign_active(),
            sensors,
        }
    }

    /// Run one health inspection right now, outside the periodic tick.
    /// Returns whether a reset was requested.
    pub fn check_health(&self) -> bool {
        health::tick(&self.ctx)
    }
}

/// Guard returned by [`SensorHub::hold_campaign`].
pub struct CampaignHold {
    ctx: Arc<HubContext>,
}

impl Drop for CampaignHold {
    fn drop(&mut self) {
        self.ctx.campaign_held.store(false, Ordering::Release);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Builder
// ────────────────────────────────────────────────────────────────────────────

/// Assembles a [`SensorHub`] from its collaborators.
///
/// Transport and platform are mandatory; [`with_sim`][Self::with_sim] sets
/// both.  Storage, notifier and registry fall back to inert defaults.
#[derive(Default)]
pub struct SensorHubBuilder {
    config: BoardConfig,
    transport: Option<Arc<dyn Transport>>,
    platform: Option<Arc<dyn Platform>>,
    storage: Option<Arc<dyn CalibrationStorage>>,
    notifier: Option<Arc<dyn Notifier>>,
    registry: Option<SensorRegistry>,
    dump_store: Option<Arc<dyn DumpStore>>,
}

impl SensorHubBuilder {
    pub fn with_config(mut self, config: BoardConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_platform(mut self, platform: Arc<dyn Platform>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Use one simulated hub as both transport and platform.
    pub fn with_sim(self, sim: SimHub) -> Self {
        let sim = Arc::new(sim);
        self.with_transport(sim.clone()).with_platform(sim)
    }

    pub fn with_storage(mut self, storage: Arc<dyn CalibrationStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_registry(mut self, registry: SensorRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Override the dump destination.  Defaults to a [`FileDumpStore`] in
    /// `config.dump_dir`, or memory when no directory is configured.
    pub fn with_dump_store(mut self, store: Arc<dyn DumpStore>) -> Self {
        self.dump_store = Some(store);
        self
    }

    /// Build the hub.
    ///
    /// # Errors
    ///
    /// [`HubError::InvalidConfig`] when transport or platform is missing or
    /// the board config fails [`BoardConfig::validate`].
    pub fn build(self) -> Result<SensorHub, HubError> {
        self.config.validate()?;
        let transport = self
            .transport
            .ok_or_else(|| HubError::InvalidConfig("no transport configured".to_string()))?;
        let platform = self
            .platform
            .ok_or_else(|| HubError::InvalidConfig("no platform configured".to_string()))?;
        let dump_store = self.dump_store.unwrap_or_else(|| match &self.config.dump_dir {
            Some(dir) => Arc::new(FileDumpStore::new(dir.clone())) as Arc<dyn DumpStore>,
            None => Arc::new(MemoryDumpStore::default()),
        });
        let (shutdown, _) = watch::channel(false);

        let ctx = HubContext {
            health: HealthMonitor::from_config(&self.config),
            streak: FailureStreak::new(self.config.com_fail_reset_threshold),
            transport,
            platform,
            storage: self.storage.unwrap_or_else(|| Arc::new(NoCalibrationStorage)),
            notifier: self.notifier.unwrap_or_else(|| Arc::new(NullNotifier)),
            registry: self.registry.unwrap_or_else(SensorRegistry::with_defaults),
            table: SensorStateTable::new(),
            counters: Counters::default(),
            phase: PhaseCell::default(),
            supervisor: ResetSupervisor::default(),
            health_rearm: Notify::new(),
            dumps: DumpCapture::new(dump_store),
            last_reset: Mutex::new(None),
            firmware_version: Mutex::new(None),
            suspend_status: Mutex::new(None),
            special_mode: Mutex::new(None),
            last_samples: RwLock::new(HashMap::new()),
            tap: RwLock::new(None),
            campaign_held: AtomicBool::new(false),
            op_locks: (0..MAX_SENSOR_TYPES).map(|_| tokio::sync::Mutex::new(())).collect(),
            epoch: Instant::now(),
            shutdown,
            config: self.config,
        };
        Ok(SensorHub {
            ctx: Arc::new(ctx),
            tasks: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shub_hal::RecordingNotifier;
    use std::time::Duration;

    struct CountingTap(Mutex<Vec<HubEvent>>);

    impl EventTap for CountingTap {
        fn on_event(&self, event: &HubEvent) {
            self.0.lock().push(event.clone());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_probes_hub() {
        let sim = SimHub::builder()
            .with_motion_sensors()
            .with_firmware_version(7)
            .build();
        let hub = SensorHub::builder().with_sim(sim).build().unwrap();
        hub.start().await.unwrap();

        let status = hub.status();
        assert_eq!(status.firmware_version, Some(7));
        assert!(status.probe_bitmap & SensorType::ACCELEROMETER.bit() != 0);
        assert!(hub.start().await.is_err(), "second start must be rejected");
        hub.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn events_reach_table_and_tap() {
        let sim = SimHub::builder().with_motion_sensors().build();
        let hub = SensorHub::builder().with_sim(sim.clone()).build().unwrap();
        hub.start().await.unwrap();
        let tap = Arc::new(CountingTap(Mutex::new(Vec::new())));
        hub.install_tap(tap.clone());

        hub.enable_sensor(SensorType::GYROSCOPE, SensorConfig::new(10, 0))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(55)).await;

        let seen = tap.0.lock().len();
        assert!(seen >= 4, "expected several events, got {seen}");
        let status = hub.status();
        let gyro = &status.sensors[0];
        assert_eq!(gyro.sensor, SensorType::GYROSCOPE);
        assert_eq!(gyro.name, "gyroscope");
        assert!(gyro.last_sample.is_some());
        assert!(gyro.silent_for_ms < 10);

        hub.remove_tap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(tap.0.lock().len(), seen);
        hub.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn suspend_status_is_broadcast_and_forwarded() {
        let sim = SimHub::builder().with_motion_sensors().build();
        let notifier = Arc::new(RecordingNotifier::default());
        let hub = SensorHub::builder()
            .with_sim(sim.clone())
            .with_notifier(notifier.clone())
            .build()
            .unwrap();
        hub.start().await.unwrap();

        hub.set_suspend_status(SuspendStatus::Suspend).await.unwrap();
        assert_eq!(
            notifier.notifications(),
            vec![Notification::SuspendStatusChanged(SuspendStatus::Suspend)]
        );
        let sent = sim.commands_with(Opcode::SuspendStatus);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].sub_command, SuspendStatus::Suspend.code());
        hub.stop();
    }

    #[tokio::test]
    async fn campaign_hold_is_exclusive() {
        let hub = SensorHub::builder()
            .with_sim(SimHub::builder().build())
            .build()
            .unwrap();
        let hold = hub.hold_campaign().unwrap();
        assert!(hub.status().campaign_active);
        assert!(matches!(hub.hold_campaign(), Err(HubError::Busy(_))));
        drop(hold);
        assert!(!hub.status().campaign_active);
        assert!(hub.hold_campaign().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn events_from_unreported_sensors_are_dropped_and_counted() {
        let sim = SimHub::builder().with_motion_sensors().build();
        let hub = SensorHub::builder().with_sim(sim.clone()).build().unwrap();
        hub.start().await.unwrap();
        let tap = Arc::new(CountingTap(Mutex::new(Vec::new())));
        hub.install_tap(tap.clone());
        hub.enable_sensor(SensorType::GYROSCOPE, SensorConfig::new(10, 0))
            .await
            .unwrap();

        let stray = SensorType::new(63).unwrap();
        sim.inject_event(HubEvent::data(stray, 1, vec![1, 2]));
        sim.inject_event(HubEvent::flush_complete(SensorType::PROXIMITY, 2));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(hub.counters().com_fail, 2);
        assert!(tap.0.lock().iter().all(|e| e.sensor == SensorType::GYROSCOPE));
        // The pump keeps running.
        let status = hub.status();
        assert_eq!(status.sensors.len(), 1);
        assert!(status.sensors[0].silent_for_ms < 10, "gyroscope went silent");
        hub.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn commands_for_unreported_sensors_are_rejected() {
        let sim = SimHub::builder().with_motion_sensors().build();
        let hub = SensorHub::builder().with_sim(sim.clone()).build().unwrap();
        hub.start().await.unwrap();
        sim.clear_command_log();

        let stray = SensorType::new(63).unwrap();
        assert!(matches!(
            hub.enable_sensor(stray, SensorConfig::new(10, 0)).await,
            Err(HubError::InvalidConfig(_))
        ));
        assert!(matches!(hub.disable_sensor(stray).await, Err(HubError::InvalidConfig(_))));
        assert!(matches!(hub.flush(stray).await, Err(HubError::InvalidConfig(_))));
        assert!(sim.commands().is_empty());
        hub.stop();
    }

    #[test]
    fn builder_rejects_zero_health_period() {
        let config = BoardConfig {
            health_period_ms: 0,
            ..BoardConfig::default()
        };
        let result = SensorHub::builder()
            .with_config(config)
            .with_sim(SimHub::builder().build())
            .build();
        assert!(matches!(result, Err(HubError::InvalidConfig(_))));
    }

    #[test]
    fn builder_requires_transport() {
        let result = SensorHub::builder().build();
        assert!(matches!(result, Err(HubError::InvalidConfig(_))));
    }
}
