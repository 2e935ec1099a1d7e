//! Reset/recovery supervisor.
//!
//! All reset requests funnel through a single-slot queue owned by one worker
//! task, so two sequences never run at the same time:
//!
//! - a request arriving while another one is still queued replaces it (the
//!   newest reason wins, both callers get the outcome);
//! - a request arriving while a sequence executes joins that sequence;
//! - an executing sequence is never cancelled.
//!
//! The sequence itself ([`run_sequence`]) moves the hub through
//! `Idle → Resetting → Resyncing → Idle`, reprograms everything the host had
//! configured and finally re-arms the health monitor.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use shub_hal::Platform;
use shub_types::{
    CalibrationItem, HubCommand, HubError, Notification, Opcode, ResetReason, ResetRecord,
};
use tokio::sync::{Notify, oneshot};
use tracing::{debug, error, info, instrument, warn};

use crate::hub::HubContext;
use crate::state_table::StateSnapshot;

/// Settle intervals to wait for the hub to answer after a reset.
const ALIVE_POLLS: u32 = 10;

// ────────────────────────────────────────────────────────────────────────────
// Phase tracking
// ────────────────────────────────────────────────────────────────────────────

/// Where the hub is in the reset cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HubPhase {
    Idle = 0,
    Resetting = 1,
    Resyncing = 2,
}

#[derive(Default)]
pub(crate) struct PhaseCell(AtomicU8);

impl PhaseCell {
    pub(crate) fn get(&self) -> HubPhase {
        match self.0.load(Ordering::Acquire) {
            1 => HubPhase::Resetting,
            2 => HubPhase::Resyncing,
            _ => HubPhase::Idle,
        }
    }

    fn set(&self, phase: HubPhase) {
        self.0.store(phase as u8, Ordering::Release);
    }
}

/// Busy guard: phase is back to `Idle` on every exit path.
struct PhaseGuard<'a>(&'a PhaseCell);

impl<'a> PhaseGuard<'a> {
    fn enter(cell: &'a PhaseCell) -> Self {
        cell.set(HubPhase::Resetting);
        Self(cell)
    }

    fn advance(&self, phase: HubPhase) {
        self.0.set(phase);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.0.set(HubPhase::Idle);
    }
}

/// Suspend-inhibit hold for the duration of one sequence.
struct AwakeHold(Arc<dyn Platform>);

impl AwakeHold {
    fn acquire(platform: Arc<dyn Platform>) -> Self {
        platform.stay_awake(true);
        Self(platform)
    }
}

impl Drop for AwakeHold {
    fn drop(&mut self) {
        self.0.stay_awake(false);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Single-slot request queue
// ────────────────────────────────────────────────────────────────────────────

type Waiter = oneshot::Sender<Result<(), HubError>>;

struct PendingReset {
    reason: ResetReason,
    waiters: Vec<Waiter>,
}

#[derive(Default)]
struct ResetSlot {
    queued: Option<PendingReset>,
    running: Option<PendingReset>,
}

/// Request side of the supervisor.
#[derive(Default)]
pub(crate) struct ResetSupervisor {
    slot: Mutex<ResetSlot>,
    wake: Notify,
}

impl ResetSupervisor {
    pub(crate) fn request(&self, reason: ResetReason) -> ResetTicket {
        let (tx, rx) = oneshot::channel();
        let mut slot = self.slot.lock();
        if let Some(running) = slot.running.as_mut() {
            debug!(%reason, running = %running.reason, "reset request joins running sequence");
            running.waiters.push(tx);
        } else if let Some(queued) = slot.queued.as_mut() {
            debug!(%reason, replaced = %queued.reason, "queued reset replaced");
            queued.reason = reason;
            queued.waiters.push(tx);
        } else {
            slot.queued = Some(PendingReset {
                reason,
                waiters: vec![tx],
            });
            self.wake.notify_one();
        }
        ResetTicket { rx }
    }

    /// A reset is queued or executing.
    pub(crate) fn is_busy(&self) -> bool {
        let slot = self.slot.lock();
        slot.queued.is_some() || slot.running.is_some()
    }

    fn has_queued(&self) -> bool {
        self.slot.lock().queued.is_some()
    }

    /// Move the queued request into the running slot.
    fn begin(&self) -> Option<ResetReason> {
        let mut slot = self.slot.lock();
        let job = slot.queued.take()?;
        let reason = job.reason;
        slot.running = Some(job);
        Some(reason)
    }

    fn finish(&self, outcome: &Result<(), HubError>) {
        let waiters = self
            .slot
            .lock()
            .running
            .take()
            .map(|job| job.waiters)
            .unwrap_or_default();
        for waiter in waiters {
            // The caller may have dropped its ticket.
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Completion handle of a reset request.
pub struct ResetTicket {
    rx: oneshot::Receiver<Result<(), HubError>>,
}

impl ResetTicket {
    /// Wait for the sequence this request ended up in.
    ///
    /// # Errors
    ///
    /// The sequence outcome, or [`HubError::Channel`] when the supervisor
    /// stopped before serving the request.
    pub async fn wait(self) -> Result<(), HubError> {
        self.rx
            .await
            .map_err(|_| HubError::Channel("reset supervisor stopped".to_string()))?
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Worker
// ────────────────────────────────────────────────────────────────────────────

pub(crate) async fn run(ctx: Arc<HubContext>) {
    let mut shutdown = ctx.shutdown_signal();
    let delay = ctx.config.reset_schedule_delay();
    loop {
        if !ctx.supervisor.has_queued() {
            tokio::select! {
                _ = ctx.supervisor.wake.notified() => {}
                _ = shutdown.changed() => break,
            }
        }
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }
        let Some(reason) = ctx.supervisor.begin() else {
            continue;
        };
        let outcome = run_sequence(&ctx, reason).await;
        ctx.supervisor.finish(&outcome);
    }
    debug!("reset supervisor stopped");
}

/// One full reset-and-resync pass.
#[instrument(skip(ctx))]
pub(crate) async fn run_sequence(ctx: &HubContext, reason: ResetReason) -> Result<(), HubError> {
    let phase = PhaseGuard::enter(&ctx.phase);
    let _awake = AwakeHold::acquire(Arc::clone(&ctx.platform));

    *ctx.last_reset.lock() = Some(ResetRecord {
        timestamp_ns: ctx.now_ns(),
        wall_clock: Utc::now(),
        reason,
    });
    ctx.counters.bump_reset();

    let snapshot = ctx.table.snapshot();
    let discarded = ctx.transport.discard_pending();
    info!(
        enabled = format_args!("{:#x}", snapshot.enabled),
        discarded, "hub reset started"
    );

    if reason.is_crash() {
        capture_dump(ctx, reason).await;
    }

    let platform = Arc::clone(&ctx.platform);
    let outcome = tokio::task::spawn_blocking(move || platform.reset_hub())
        .await
        .unwrap_or_else(|e| Err(HubError::ResetFailed(format!("reset task aborted: {e}"))));
    if let Err(e) = outcome {
        error!(error = %e, "platform reset failed; resync skipped");
        if !reason.is_crash() {
            capture_dump(ctx, reason).await;
        }
        return Err(match e {
            HubError::ResetFailed(_) => e,
            other => HubError::ResetFailed(other.to_string()),
        });
    }
    if !wait_until_alive(ctx).await {
        error!("hub did not come back after reset; resync skipped");
        if !reason.is_crash() {
            capture_dump(ctx, reason).await;
        }
        return Err(HubError::ResetFailed("hub not alive after reset".to_string()));
    }

    phase.advance(HubPhase::Resyncing);
    if let Err(e) = ctx.refresh_hub_info().await {
        warn!(error = %e, "scanning info unavailable after reset");
    }
    sync_calibration(ctx).await;
    reissue_modes(ctx).await;
    reenable_all(ctx, &snapshot).await;

    ctx.streak.record_success();
    ctx.notifier.broadcast(Notification::ResetOccurred { reason });
    ctx.health_rearm.notify_one();
    info!(counters = ?ctx.counters.snapshot(), "hub reset complete");
    Ok(())
}

/// Poll the platform once per settle interval until the hub answers again.
async fn wait_until_alive(ctx: &HubContext) -> bool {
    let settle = ctx.config.reset_settle();
    for attempt in 0..ALIVE_POLLS {
        let platform = Arc::clone(&ctx.platform);
        let alive = tokio::task::spawn_blocking(move || platform.is_hub_alive())
            .await
            .unwrap_or(false);
        if alive {
            debug!(attempt, "hub alive after reset");
            return true;
        }
        tokio::time::sleep(settle).await;
    }
    false
}

async fn capture_dump(ctx: &HubContext, reason: ResetReason) {
    if let Some(info) = ctx.dumps.capture(Arc::clone(&ctx.platform), reason).await {
        ctx.notifier.broadcast(Notification::DumpCaptured {
            reason,
            path: info.location,
        });
    }
}

/// Push stored calibration and board positions.  Each item stands alone.
async fn sync_calibration(ctx: &HubContext) {
    if !ctx.storage.is_ready() {
        info!("calibration storage not ready; calibration sync deferred");
        return;
    }
    let mut items: Vec<CalibrationItem> = match ctx.storage.load_all() {
        Ok(items) => items,
        Err(e) => {
            warn!(error = %e, "stored calibration unreadable");
            Vec::new()
        }
    };
    items.extend(ctx.config.position_items());

    let mut pushed = 0usize;
    for item in &items {
        match ctx.command(item.command()).await {
            Ok(_) => pushed += 1,
            Err(e) => warn!(sensor = %item.sensor, kind = ?item.kind, error = %e, "calibration item skipped"),
        }
    }
    info!(pushed, total = items.len(), "calibration synced");
}

async fn reissue_modes(ctx: &HubContext) {
    let suspend = *ctx.suspend_status.lock();
    if let Some(status) = suspend {
        let command = HubCommand::new(Opcode::SuspendStatus).with_sub_command(status.code());
        if let Err(e) = ctx.command(command).await {
            warn!(?status, error = %e, "suspend status not restored");
        }
    }
    let mode = *ctx.special_mode.lock();
    if let Some(mode) = mode {
        let command = HubCommand::new(Opcode::SpecialMode).with_sub_command(mode);
        if let Err(e) = ctx.command(command).await {
            warn!(mode, error = %e, "special mode not restored");
        }
    }
}

/// Re-enable every snapshot sensor, lowest type first.
async fn reenable_all(ctx: &HubContext, snapshot: &StateSnapshot) {
    let settle = ctx.config.reset_settle();
    for (sensor, config) in &snapshot.configs {
        if let Err(e) = ctx.reenable(*sensor, *config).await {
            warn!(%sensor, error = %e, "sensor not re-enabled");
        }
        tokio::time::sleep(settle).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use shub_hal::{RecordingNotifier, SimHub, SimStorage, Transport};
    use shub_types::{BoardConfig, CalibrationKind, SensorConfig, SensorType, SuspendStatus};

    use super::*;
    use crate::SensorHub;

    async fn started(sim: &SimHub, notifier: Arc<RecordingNotifier>) -> SensorHub {
        let hub = SensorHub::builder()
            .with_sim(sim.clone())
            .with_notifier(notifier)
            .build()
            .unwrap();
        hub.start().await.unwrap();
        hub
    }

    #[tokio::test(start_paused = true)]
    async fn reset_restores_enabled_set_in_ascending_order() {
        let sim = SimHub::builder().with_motion_sensors().build();
        let notifier = Arc::new(RecordingNotifier::default());
        let hub = started(&sim, notifier.clone()).await;
        hub.enable_sensor(SensorType::GYROSCOPE, SensorConfig::new(5, 0))
            .await
            .unwrap();
        hub.enable_sensor(SensorType::ACCELEROMETER, SensorConfig::new(20, 100))
            .await
            .unwrap();
        sim.clear_command_log();

        hub.reset(ResetReason::KernelSysfs).await.unwrap();

        let order: Vec<_> = sim
            .commands_with(Opcode::Enable)
            .iter()
            .filter_map(|c| c.sensor)
            .collect();
        assert_eq!(order, vec![SensorType::ACCELEROMETER, SensorType::GYROSCOPE]);
        assert_eq!(
            sim.active_config(SensorType::ACCELEROMETER),
            Some(SensorConfig::new(20, 100))
        );
        assert_eq!(sim.reset_count(), 1);
        assert_eq!(hub.counters().reset, 1);
        assert_eq!(hub.last_reset().unwrap().reason, ResetReason::KernelSysfs);
        assert_eq!(
            notifier.notifications(),
            vec![Notification::ResetOccurred {
                reason: ResetReason::KernelSysfs
            }]
        );
        assert_eq!(hub.phase(), HubPhase::Idle);
        assert!(!sim.is_awake());
        hub.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_back_resets_leave_identical_state() {
        let sim = SimHub::builder().with_motion_sensors().build();
        let hub = started(&sim, Arc::new(RecordingNotifier::default())).await;
        hub.enable_sensor(SensorType::ACCELEROMETER, SensorConfig::new(10, 0))
            .await
            .unwrap();
        hub.enable_sensor(SensorType::MAGNETOMETER, SensorConfig::new(50, 2000))
            .await
            .unwrap();

        hub.reset(ResetReason::KernelSysfs).await.unwrap();
        let table_once = hub.state_snapshot();
        let hub_once: Vec<_> = sim
            .enabled_sensors()
            .into_iter()
            .map(|s| (s, sim.active_config(s)))
            .collect();

        hub.reset(ResetReason::KernelSysfs).await.unwrap();
        let hub_twice: Vec<_> = sim
            .enabled_sensors()
            .into_iter()
            .map(|s| (s, sim.active_config(s)))
            .collect();

        assert_eq!(hub.state_snapshot(), table_once);
        assert_eq!(hub_twice, hub_once);
        assert_eq!(sim.reset_count(), 2);
        hub.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn queued_request_is_replaced_and_runs_once() {
        let sim = SimHub::builder().with_motion_sensors().build();
        let notifier = Arc::new(RecordingNotifier::default());
        let hub = started(&sim, notifier.clone()).await;

        let first = hub.request_reset(ResetReason::KernelSysfs);
        let second = hub.request_reset(ResetReason::NoEvent);
        first.wait().await.unwrap();
        second.wait().await.unwrap();

        assert_eq!(sim.reset_count(), 1);
        assert_eq!(notifier.reset_count(), 1);
        assert_eq!(hub.counters().reset, 1);
        assert_eq!(hub.last_reset().unwrap().reason, ResetReason::NoEvent);
        hub.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn request_during_sequence_joins_it() {
        let sim = SimHub::builder().with_motion_sensors().build();
        let notifier = Arc::new(RecordingNotifier::default());
        let hub = started(&sim, notifier.clone()).await;
        hub.enable_sensor(SensorType::ACCELEROMETER, SensorConfig::new(10, 0))
            .await
            .unwrap();

        let running = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.reset(ResetReason::KernelSysfs).await })
        };
        while hub.phase() == HubPhase::Idle {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        hub.reset(ResetReason::NoEvent).await.unwrap();
        running.await.unwrap().unwrap();

        assert_eq!(sim.reset_count(), 1);
        assert_eq!(notifier.reset_count(), 1);
        assert_eq!(hub.last_reset().unwrap().reason, ResetReason::KernelSysfs);
        hub.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reset_primitive_aborts_without_resync() {
        let sim = SimHub::builder().with_motion_sensors().build();
        let notifier = Arc::new(RecordingNotifier::default());
        let hub = started(&sim, notifier.clone()).await;
        hub.enable_sensor(SensorType::ACCELEROMETER, SensorConfig::new(10, 0))
            .await
            .unwrap();
        sim.set_reset_failure(true);
        sim.clear_command_log();

        let result = hub.reset(ResetReason::KernelSysfs).await;

        assert!(matches!(result, Err(HubError::ResetFailed(_))));
        assert!(sim.commands().is_empty(), "no resync after a failed reset");
        assert_eq!(notifier.reset_count(), 0);
        assert!(matches!(
            notifier.notifications().as_slice(),
            [Notification::DumpCaptured { .. }]
        ));
        assert_eq!(hub.last_dump().unwrap().reason, ResetReason::KernelSysfs);
        assert_eq!(hub.phase(), HubPhase::Idle);
        assert!(!sim.is_awake());

        sim.clear_failures();
        hub.reset(ResetReason::KernelSysfs).await.unwrap();
        assert_eq!(hub.counters().reset, 2);
        hub.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn hub_that_never_comes_back_is_not_resynced() {
        let sim = SimHub::builder().with_motion_sensors().build();
        let notifier = Arc::new(RecordingNotifier::default());
        let hub = started(&sim, notifier.clone()).await;
        hub.enable_sensor(SensorType::GYROSCOPE, SensorConfig::new(10, 0))
            .await
            .unwrap();
        sim.set_stuck_in_boot(true);
        sim.clear_command_log();

        let result = hub.reset(ResetReason::NoEvent).await;

        assert!(matches!(result, Err(HubError::ResetFailed(_))));
        assert_eq!(sim.reset_count(), 1);
        assert!(sim.commands_with(Opcode::Enable).is_empty());
        assert_eq!(notifier.reset_count(), 0);
        assert_eq!(hub.phase(), HubPhase::Idle);

        sim.set_stuck_in_boot(false);
        hub.reset(ResetReason::NoEvent).await.unwrap();
        assert_eq!(sim.enabled_sensors(), vec![SensorType::GYROSCOPE]);
        hub.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn crash_reason_dumps_before_reset() {
        let sim = SimHub::builder().with_motion_sensors().build();
        let notifier = Arc::new(RecordingNotifier::default());
        let hub = started(&sim, notifier.clone()).await;

        hub.reset(ResetReason::McuCrashed).await.unwrap();

        let dump = hub.last_dump().unwrap();
        assert_eq!(dump.reason, ResetReason::McuCrashed);
        let seen = notifier.notifications();
        assert!(matches!(seen[0], Notification::DumpCaptured { .. }));
        assert!(matches!(
            seen[1],
            Notification::ResetOccurred {
                reason: ResetReason::McuCrashed
            }
        ));
        hub.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_calibration_item_does_not_block_the_rest() {
        let sim = SimHub::builder().with_motion_sensors().build();
        let storage = Arc::new(SimStorage::new(
            true,
            vec![
                CalibrationItem {
                    sensor: SensorType::ACCELEROMETER,
                    kind: CalibrationKind::Offsets,
                    data: vec![1, 2, 3],
                },
                CalibrationItem {
                    sensor: SensorType::GYROSCOPE,
                    kind: CalibrationKind::Offsets,
                    data: vec![4, 5, 6],
                },
            ],
        ));
        let hub = SensorHub::builder()
            .with_sim(sim.clone())
            .with_storage(storage)
            .build()
            .unwrap();
        hub.start().await.unwrap();
        sim.fail_command(Opcode::PushCalibration, Some(SensorType::ACCELEROMETER));

        hub.reset(ResetReason::KernelSysfs).await.unwrap();

        assert_eq!(sim.commands_with(Opcode::PushCalibration).len(), 2);
        assert_eq!(
            sim.commands_with(Opcode::SetPosition).len(),
            BoardConfig::default().positions.len()
        );
        assert_eq!(hub.counters().com_fail, 1);
        hub.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn calibration_is_deferred_when_storage_not_ready() {
        let sim = SimHub::builder().with_motion_sensors().build();
        let hub = SensorHub::builder()
            .with_sim(sim.clone())
            .with_storage(Arc::new(SimStorage::new(false, Vec::new())))
            .build()
            .unwrap();
        hub.start().await.unwrap();

        hub.reset(ResetReason::KernelSysfs).await.unwrap();

        assert!(sim.commands_with(Opcode::PushCalibration).is_empty());
        assert!(sim.commands_with(Opcode::SetPosition).is_empty());
        hub.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn reset_discards_pending_and_reissues_modes() {
        let sim = SimHub::builder().with_motion_sensors().build();
        let hub = started(&sim, Arc::new(RecordingNotifier::default())).await;
        hub.set_suspend_status(SuspendStatus::Suspend).await.unwrap();
        hub.set_special_mode(3).await.unwrap();
        sim.queue_pending(4);
        sim.clear_command_log();

        hub.reset(ResetReason::KernelSysfs).await.unwrap();

        assert_eq!(sim.discard_pending(), 0);
        let suspend = sim.commands_with(Opcode::SuspendStatus);
        assert_eq!(suspend.len(), 1);
        assert_eq!(suspend[0].sub_command, SuspendStatus::Suspend.code());
        assert_eq!(sim.commands_with(Opcode::SpecialMode)[0].sub_command, 3);
        hub.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_supervisor_releases_waiters() {
        let sim = SimHub::builder().with_motion_sensors().build();
        let hub = SensorHub::builder().with_sim(sim).build().unwrap();
        let ticket = hub.request_reset(ResetReason::KernelSysfs);
        drop(hub);
        assert!(matches!(ticket.wait().await, Err(HubError::Channel(_))));
    }
}
