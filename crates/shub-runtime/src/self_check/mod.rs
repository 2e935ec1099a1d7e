//! [`SelfCheckEngine`] – engineering stress campaign against the sensor hub.
//!
//! A campaign snapshots the sensor table, runs four phases in a fixed order
//! (system, comm, event timing, timestamp ordering), then writes the
//! snapshot back and resets the hub so the pre-campaign sensor set comes back
//! exactly.  While it runs the hub's health monitor and command escalation
//! stand down, and a second campaign is refused.
//!
//! A *baseline* check resets the hub first and only starts the campaign once
//! the system reports ready again ([`SelfCheckEngine::on_system_ready`]).

pub mod params;
pub mod report;
pub mod stats;

mod phases;
mod tap;

use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use shub_kernel::SensorHub;
use shub_types::{Notification, ResetReason, SensorType, sensors_in};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::SelfCheckError;
use params::{CheckParams, CheckRequest};
use phases::Campaign;
use report::{CommResult, SelfCheckReport, SensorReport};
use tap::CheckTap;

// ────────────────────────────────────────────────────────────────────────────
// Campaign state
// ────────────────────────────────────────────────────────────────────────────

/// Where the engine is.  Held in one cell so the "resetting" and
/// "self-checking" flags can never be observed half-updated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CampaignState {
    #[default]
    Idle,
    /// Baseline reset issued; the campaign starts on system ready.
    Resetting,
    SelfChecking {
        /// The ordering phase is collecting timestamps.
        ordering: bool,
    },
}

#[derive(Debug, Default)]
pub(crate) struct CampaignCell(Mutex<CampaignState>);

impl CampaignCell {
    fn get(&self) -> CampaignState {
        *self.0.lock()
    }

    fn try_begin(&self) -> Result<(), SelfCheckError> {
        self.transition(CampaignState::SelfChecking { ordering: false })
    }

    fn try_begin_baseline(&self) -> Result<(), SelfCheckError> {
        self.transition(CampaignState::Resetting)
    }

    fn transition(&self, to: CampaignState) -> Result<(), SelfCheckError> {
        let mut state = self.0.lock();
        if *state != CampaignState::Idle {
            return Err(SelfCheckError::AlreadyRunning);
        }
        *state = to;
        Ok(())
    }

    fn set_ordering(&self, on: bool) {
        if let CampaignState::SelfChecking { ordering } = &mut *self.0.lock() {
            *ordering = on;
        }
    }

    fn is_ordering(&self) -> bool {
        matches!(self.get(), CampaignState::SelfChecking { ordering: true })
    }

    fn clear(&self) {
        *self.0.lock() = CampaignState::Idle;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────────────────────────────────────

/// Runs self-check campaigns against one [`SensorHub`].  Cheap to clone.
#[derive(Clone)]
pub struct SelfCheckEngine {
    hub: SensorHub,
    state: Arc<CampaignCell>,
    last_report: Arc<Mutex<Option<SelfCheckReport>>>,
    pending_baseline: Arc<Mutex<Option<CheckRequest>>>,
}

impl SelfCheckEngine {
    pub fn new(hub: SensorHub) -> Self {
        Self {
            hub,
            state: Arc::new(CampaignCell::default()),
            last_report: Arc::new(Mutex::new(None)),
            pending_baseline: Arc::new(Mutex::new(None)),
        }
    }

    pub fn state(&self) -> CampaignState {
        self.state.get()
    }

    /// Report of the most recent finished campaign.
    pub fn last_report(&self) -> Option<SelfCheckReport> {
        self.last_report.lock().clone()
    }

    /// Start a campaign in the background.
    ///
    /// # Errors
    ///
    /// [`SelfCheckError::AlreadyRunning`] while another campaign or a
    /// baseline reset is in progress.
    pub fn run_system_check(
        &self,
        request: CheckRequest,
    ) -> Result<JoinHandle<SelfCheckReport>, SelfCheckError> {
        self.state.try_begin()?;
        let params = CheckParams::normalize(request, &self.hub.config().self_check);
        let engine = self.clone();
        Ok(tokio::spawn(async move { engine.campaign(params).await }))
    }

    /// Textual entry point: `"<delay_us>,<iterations>"`.
    pub fn write_request(&self, text: &str) -> Result<JoinHandle<SelfCheckReport>, SelfCheckError> {
        let request = text.parse().unwrap_or_default();
        self.run_system_check(request)
    }

    /// Reset the hub, then run a campaign once the system is ready again.
    ///
    /// The returned task yields `None` when the reset failed and the
    /// campaign was dropped.
    pub fn request_baseline_check(
        &self,
        request: CheckRequest,
    ) -> Result<JoinHandle<Option<SelfCheckReport>>, SelfCheckError> {
        self.state.try_begin_baseline()?;
        *self.pending_baseline.lock() = Some(request);
        info!("baseline self-check: resetting hub first");

        let engine = self.clone();
        Ok(tokio::spawn(async move {
            match engine.hub.reset(ResetReason::KernelSysfs).await {
                Ok(()) => match engine.on_system_ready() {
                    Some(handle) => handle.await.ok(),
                    None => None,
                },
                Err(e) => {
                    warn!(error = %e, "baseline reset failed; self-check dropped");
                    engine.pending_baseline.lock().take();
                    engine.state.clear();
                    None
                }
            }
        }))
    }

    /// Start the pending baseline campaign, if any.  Fires at most once per
    /// baseline request.
    pub fn on_system_ready(&self) -> Option<JoinHandle<SelfCheckReport>> {
        let request = self.pending_baseline.lock().take()?;
        self.state.clear();
        match self.run_system_check(request) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "baseline self-check could not start");
                None
            }
        }
    }

    async fn campaign(&self, params: CheckParams) -> SelfCheckReport {
        let hub = &self.hub;
        let started = Instant::now();
        let hold = match hub.hold_campaign() {
            Ok(hold) => Some(hold),
            Err(e) => {
                warn!(error = %e, "could not hold the hub; running unprotected");
                None
            }
        };
        let snapshot = hub.state_snapshot();
        let probed: Vec<SensorType> = sensors_in(hub.probe_bitmap()).collect();
        let seed = hub
            .config()
            .self_check
            .seed
            .unwrap_or_else(|| rand::thread_rng().r#gen());
        info!(
            seed,
            delay_us = params.delay_us,
            iterations = params.iterations,
            sensors = probed.len(),
            "self-check started"
        );

        let tap = Arc::new(CheckTap::new(Arc::clone(&self.state)));
        hub.install_tap(tap.clone());

        let hub_stats = {
            let mut campaign = Campaign::new(hub, params, &tap, &self.state, probed.clone(), seed);
            campaign.load_capabilities().await;
            let hub_stats = campaign.system_test().await;
            campaign.comm_test().await;
            campaign.event_test().await;
            campaign.order_test().await;
            hub_stats
        };
        hub.remove_tap();

        hub.restore_state(&snapshot);
        let reset_ok = match hub.reset(ResetReason::KernelSysfs).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "post-campaign reset failed");
                false
            }
        };
        let restored = reset_ok && hub.state_snapshot() == snapshot;
        drop(hold);

        let sensors = probed
            .into_iter()
            .map(|sensor| SensorReport {
                sensor,
                name: hub.registry().name_of(sensor),
                comm: CommResult {
                    responses: tap.responses(sensor),
                    expected: params.iterations,
                },
                event: tap.event_summary(sensor),
                hub_stats: hub_stats.get(&sensor).copied(),
                order: tap.order_summary(sensor),
            })
            .collect();
        let report = SelfCheckReport {
            params,
            seed,
            duration_ms: started.elapsed().as_millis() as u64,
            restored,
            sensors,
        };

        report.log();
        *self.last_report.lock() = Some(report.clone());
        hub.notifier().broadcast(Notification::SelfCheckComplete {
            passed: report.passed(),
            failed: report.failed(),
        });
        self.state.clear();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shub_hal::SimHub;
    use shub_middleware::{EventBus, Topic};
    use shub_types::{BoardConfig, SelfCheckDefaults, SensorConfig};

    fn quick_config() -> BoardConfig {
        BoardConfig {
            self_check: SelfCheckDefaults {
                system_cycles: 1,
                event_window_ms: 500,
                order_warmup_ms: 50,
                order_inner_steps: 5,
                order_max_sleep_ms: 5,
                seed: Some(7),
                ..SelfCheckDefaults::default()
            },
            ..BoardConfig::default()
        }
    }

    async fn engine_with(sim: &SimHub, bus: Arc<EventBus>) -> (SensorHub, SelfCheckEngine) {
        let hub = SensorHub::builder()
            .with_config(quick_config())
            .with_sim(sim.clone())
            .with_notifier(bus)
            .build()
            .unwrap();
        hub.start().await.unwrap();
        (hub.clone(), SelfCheckEngine::new(hub))
    }

    fn full_sim() -> SimHub {
        SimHub::builder()
            .with_motion_sensors()
            .with_environment_sensors()
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn campaign_restores_the_pre_campaign_sensor_set() {
        let sim = full_sim();
        let (hub, engine) = engine_with(&sim, Arc::new(EventBus::default())).await;
        hub.enable_sensor(SensorType::ACCELEROMETER, SensorConfig::new(20, 0))
            .await
            .unwrap();
        hub.enable_sensor(SensorType::PRESSURE, SensorConfig::new(100, 1000))
            .await
            .unwrap();
        let before = hub.state_snapshot();

        let report = engine
            .run_system_check(CheckRequest::new(100, 3))
            .unwrap()
            .await
            .unwrap();

        assert!(report.restored);
        assert_eq!(hub.state_snapshot(), before);
        assert_eq!(
            sim.enabled_sensors(),
            vec![SensorType::ACCELEROMETER, SensorType::PRESSURE]
        );
        assert_eq!(
            sim.active_config(SensorType::ACCELEROMETER),
            Some(SensorConfig::new(20, 0))
        );
        assert_eq!(
            sim.active_config(SensorType::PRESSURE),
            Some(SensorConfig::new(100, 1000))
        );
        assert_eq!(engine.state(), CampaignState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn well_behaved_hub_passes_every_phase() {
        let sim = full_sim();
        let bus = Arc::new(EventBus::default());
        let mut diagnostics = bus.subscribe_to(Topic::Diagnostics);
        let (_hub, engine) = engine_with(&sim, bus).await;

        let report = engine
            .run_system_check(CheckRequest::new(100, 3))
            .unwrap()
            .await
            .unwrap();

        assert_eq!(report.seed, 7);
        assert_eq!(report.params, CheckParams { delay_us: 100, iterations: 3 });
        assert_eq!(report.sensors.len(), 8);
        for s in &report.sensors {
            assert_eq!(s.comm.responses, 3, "{} answered {} flushes", s.name, s.comm.responses);
            assert!(s.hub_stats.is_some(), "{} has no hub timing", s.name);
        }
        assert_eq!(report.failed(), 0);

        let acc = report.sensor(SensorType::ACCELEROMETER).unwrap();
        let timing = acc.event.unwrap();
        assert!(timing.count > 0);
        assert_eq!(timing.rms_us, 0);

        for sensor in phases::ORDER_SENSORS {
            let order = report.sensor(sensor).unwrap().order.unwrap();
            assert!(order.valid > 0, "{sensor} produced no ordered samples");
            assert_eq!(order.violations, 0);
        }
        assert!(report.sensor(SensorType::PRESSURE).unwrap().order.is_none());

        let event = diagnostics.recv().await.unwrap();
        assert_eq!(
            event.payload,
            Notification::SelfCheckComplete { passed: 8, failed: 0 }
        );
        assert_eq!(engine.last_report().unwrap().seed, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_flushes_fail_only_that_sensor() {
        let sim = full_sim();
        sim.set_flush_unanswered(SensorType::LIGHT, true);
        let (_hub, engine) = engine_with(&sim, Arc::new(EventBus::default())).await;

        let report = engine.write_request("100,2").unwrap().await.unwrap();

        let light = report.sensor(SensorType::LIGHT).unwrap();
        assert_eq!(light.comm, CommResult { responses: 0, expected: 2 });
        assert_eq!(report.failed(), 1);
        assert_eq!(report.passed(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn second_campaign_is_refused_while_one_runs() {
        let sim = full_sim();
        let (_hub, engine) = engine_with(&sim, Arc::new(EventBus::default())).await;

        let running = engine.run_system_check(CheckRequest::new(100, 2)).unwrap();
        assert!(matches!(engine.state(), CampaignState::SelfChecking { .. }));
        assert_eq!(
            engine.run_system_check(CheckRequest::default()).unwrap_err(),
            SelfCheckError::AlreadyRunning
        );
        assert_eq!(
            engine.request_baseline_check(CheckRequest::default()).unwrap_err(),
            SelfCheckError::AlreadyRunning
        );

        running.await.unwrap();
        assert_eq!(engine.state(), CampaignState::Idle);
        engine
            .run_system_check(CheckRequest::new(100, 1))
            .unwrap()
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn baseline_check_resets_first_and_runs_once() {
        let sim = SimHub::builder().with_motion_sensors().build();
        let (hub, engine) = engine_with(&sim, Arc::new(EventBus::default())).await;
        let resets_before = hub.counters().reset;

        let handle = engine
            .request_baseline_check(CheckRequest::new(100, 2))
            .unwrap();
        assert_eq!(engine.state(), CampaignState::Resetting);
        assert_eq!(
            engine.run_system_check(CheckRequest::default()).unwrap_err(),
            SelfCheckError::AlreadyRunning
        );

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.failed(), 0);
        // Baseline reset plus the closing restore reset.
        assert_eq!(hub.counters().reset, resets_before + 2);
        assert!(engine.on_system_ready().is_none());
        assert_eq!(engine.state(), CampaignState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_baseline_reset_drops_the_campaign() {
        let sim = SimHub::builder().with_motion_sensors().build();
        let (_hub, engine) = engine_with(&sim, Arc::new(EventBus::default())).await;
        sim.set_reset_failure(true);

        let outcome = engine
            .request_baseline_check(CheckRequest::default())
            .unwrap()
            .await
            .unwrap();

        assert!(outcome.is_none());
        assert!(engine.last_report().is_none());
        assert_eq!(engine.state(), CampaignState::Idle);
        assert!(engine.on_system_ready().is_none());
    }

    #[test]
    fn campaign_cell_transitions() {
        let cell = CampaignCell::default();
        cell.set_ordering(true);
        assert_eq!(cell.get(), CampaignState::Idle);

        cell.try_begin().unwrap();
        assert!(!cell.is_ordering());
        cell.set_ordering(true);
        assert!(cell.is_ordering());
        assert_eq!(cell.try_begin_baseline(), Err(SelfCheckError::AlreadyRunning));

        cell.clear();
        cell.try_begin_baseline().unwrap();
        assert!(!cell.is_ordering());
    }
}
