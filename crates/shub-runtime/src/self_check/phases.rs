//! The four stress phases.  None of them aborts early: every failure is
//! logged and shows up in the report instead.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shub_kernel::SensorHub;
use shub_types::{
    HubCommand, Opcode, OperationStats, SelfCheckDefaults, SensorConfig, SensorType,
};
use tracing::{debug, info, warn};

use super::CampaignCell;
use super::params::CheckParams;
use super::tap::{CheckTap, Collect};

/// Sensors exercised together by the ordering phase.
pub(super) const ORDER_SENSORS: [SensorType; 3] = [
    SensorType::ACCELEROMETER,
    SensorType::MAGNETOMETER,
    SensorType::GYROSCOPE,
];

/// Period used when the hub does not advertise a sensor's fastest rate.
const FALLBACK_PERIOD_MS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Round {
    /// Fastest rate, latency 0 or 5000 ms.
    FixedRate,
    /// Rate 1–9× the fastest period, latency 0–5000 ms in 1000 ms steps.
    RandomRate,
}

pub(super) struct Campaign<'a> {
    hub: &'a SensorHub,
    defaults: &'a SelfCheckDefaults,
    params: CheckParams,
    tap: &'a CheckTap,
    state: &'a CampaignCell,
    probed: Vec<SensorType>,
    fastest_ms: BTreeMap<SensorType, u32>,
    rng: StdRng,
}

impl<'a> Campaign<'a> {
    pub(super) fn new(
        hub: &'a SensorHub,
        params: CheckParams,
        tap: &'a CheckTap,
        state: &'a CampaignCell,
        probed: Vec<SensorType>,
        seed: u64,
    ) -> Self {
        Self {
            hub,
            defaults: &hub.config().self_check,
            params,
            tap,
            state,
            probed,
            fastest_ms: BTreeMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(self.defaults.enable_settle_ms)).await;
    }

    fn fastest(&self, sensor: SensorType) -> u32 {
        self.fastest_ms
            .get(&sensor)
            .copied()
            .unwrap_or(FALLBACK_PERIOD_MS)
    }

    async fn enable(&self, sensor: SensorType, config: SensorConfig) {
        if let Err(e) = self.hub.enable_sensor(sensor, config).await {
            debug!(%sensor, error = %e, "self-check enable failed");
        }
    }

    async fn disable(&self, sensor: SensorType) {
        if let Err(e) = self.hub.disable_sensor(sensor).await {
            debug!(%sensor, error = %e, "self-check disable failed");
        }
    }

    /// Read the hub's fastest period per sensor.
    pub(super) async fn load_capabilities(&mut self) {
        match self.hub.capabilities().await {
            Ok(caps) => {
                self.fastest_ms = caps
                    .into_iter()
                    .map(|c| (c.sensor, c.min_period_us.div_ceil(1000).max(1)))
                    .collect();
            }
            Err(e) => warn!(error = %e, "capability table unavailable; using fallback periods"),
        }
    }

    // ── Phase 1 ─────────────────────────────────────────────────────────────

    /// Cycle every probed sensor on and off, then read the hub's own
    /// per-operation timing table.
    pub(super) async fn system_test(&mut self) -> BTreeMap<SensorType, OperationStats> {
        info!(cycles = self.defaults.system_cycles, "self-check: system test");
        if let Err(e) = self.hub.send_command(HubCommand::new(Opcode::SystemCheck)).await {
            warn!(error = %e, "hub system check command failed");
        }
        for _ in 0..self.defaults.system_cycles {
            for &sensor in &self.probed {
                self.enable(sensor, SensorConfig::new(self.fastest(sensor), 0))
                    .await;
                self.settle().await;
                self.disable(sensor).await;
                self.settle().await;
            }
        }

        match self.hub.operation_stats().await {
            Ok(stats) => stats
                .into_iter()
                .inspect(|s| {
                    debug!(
                        sensor = %self.hub.registry().name_of(s.sensor),
                        open = ?s.open,
                        read = ?s.read,
                        close = ?s.close,
                        "hub operation timing"
                    );
                })
                .map(|s| (s.sensor, s))
                .collect(),
            Err(e) => {
                warn!(error = %e, "hub operation stats unavailable");
                BTreeMap::new()
            }
        }
    }

    // ── Phase 2 ─────────────────────────────────────────────────────────────

    /// Flush every probed sensor `iterations` times and count the markers.
    pub(super) async fn comm_test(&mut self) {
        info!(
            iterations = self.params.iterations,
            delay_us = self.params.delay_us,
            "self-check: comm test"
        );
        self.tap.collect(Collect::Flushes);
        for _ in 0..self.params.iterations {
            for &sensor in &self.probed {
                if let Err(e) = self.hub.flush(sensor).await {
                    debug!(%sensor, error = %e, "self-check flush failed");
                }
            }
            tokio::time::sleep(self.params.delay()).await;
        }
        self.settle().await;
        self.tap.collect(Collect::Nothing);
    }

    // ── Phase 3 ─────────────────────────────────────────────────────────────

    /// Run every probed sensor at its fastest rate and measure gap jitter.
    pub(super) async fn event_test(&mut self) {
        let window = Duration::from_millis(self.defaults.event_window_ms);
        info!(window_ms = self.defaults.event_window_ms, "self-check: event test");
        self.tap.collect(Collect::Timing);
        for &sensor in &self.probed {
            let period = self.fastest(sensor);
            self.tap.expect_gap(sensor, u64::from(period) * 1_000);
            self.enable(sensor, SensorConfig::new(period, 0)).await;
        }
        tokio::time::sleep(window).await;
        self.tap.collect(Collect::Nothing);
        for &sensor in &self.probed {
            self.disable(sensor).await;
        }
    }

    // ── Phase 4 ─────────────────────────────────────────────────────────────

    /// Randomly re-arm and flush the motion sensors while checking that
    /// every sensor's timestamps keep increasing.
    pub(super) async fn order_test(&mut self) {
        let sensors: Vec<SensorType> = ORDER_SENSORS
            .into_iter()
            .filter(|s| self.probed.contains(s))
            .collect();
        if sensors.is_empty() {
            info!("self-check: order test skipped, no motion sensors present");
            return;
        }
        info!(sensors = sensors.len(), iterations = self.params.iterations, "self-check: order test");

        self.state.set_ordering(true);
        for round in [Round::FixedRate, Round::RandomRate] {
            for _ in 0..self.params.iterations {
                self.order_iteration(round, &sensors).await;
            }
        }
        self.state.set_ordering(false);
    }

    async fn order_iteration(&mut self, round: Round, sensors: &[SensorType]) {
        for &sensor in sensors {
            let config = self.random_config(round, sensor);
            self.enable(sensor, config).await;
        }
        tokio::time::sleep(Duration::from_millis(self.defaults.order_warmup_ms)).await;

        for _ in 0..self.defaults.order_inner_steps {
            let sensor = sensors[self.rng.gen_range(0..sensors.len())];
            let config = self.random_config(round, sensor);
            self.enable(sensor, config).await;
            if let Err(e) = self.hub.flush(sensor).await {
                debug!(%sensor, error = %e, "self-check flush failed");
            }
            let pause = self.rng.gen_range(0..=self.defaults.order_max_sleep_ms);
            tokio::time::sleep(Duration::from_millis(pause)).await;
        }

        for &sensor in sensors {
            self.disable(sensor).await;
        }
    }

    fn random_config(&mut self, round: Round, sensor: SensorType) -> SensorConfig {
        let base = self.fastest(sensor);
        match round {
            Round::FixedRate => {
                let latency = if self.rng.gen_bool(0.5) { 5000 } else { 0 };
                SensorConfig::new(base, latency)
            }
            Round::RandomRate => {
                let factor = self.rng.gen_range(0..=9u32).max(1);
                let latency = 1000 * self.rng.gen_range(0..=5u32);
                SensorConfig::new(base * factor, latency)
            }
        }
    }
}
