//! Per-sensor hub operations and the command accounting wrapper.
//!
//! Every command the core sends goes through [`HubContext::command`], which
//! bumps `cnt_timeout`/`cnt_com_fail` on failure and escalates a streak of
//! failures into a reset.  Enable, disable and re-arm hold the sensor's
//! operation lock for the whole table-update-plus-round-trip so the health
//! path and diagnostics never interleave on one sensor.

use shub_types::{HubCommand, HubError, HubResponse, Opcode, ResetReason, SensorConfig, SensorType};
use tracing::{debug, warn};

use crate::hub::HubContext;
use crate::supervisor::HubPhase;

impl HubContext {
    pub(crate) async fn command(&self, command: HubCommand) -> Result<HubResponse, HubError> {
        let opcode = command.opcode;
        let sensor = command.sensor;
        match self.transport.send_command(command).await {
            Ok(response) => {
                self.streak.record_success();
                Ok(response)
            }
            Err(e) => {
                if e.is_timeout() {
                    self.counters.bump_timeout();
                } else {
                    self.counters.bump_com_fail();
                }
                warn!(?opcode, ?sensor, error = %e, "hub command failed");
                if self.streak.record_failure() {
                    self.escalate(&e);
                }
                Err(e)
            }
        }
    }

    fn escalate(&self, last: &HubError) {
        if self.phase.get() != HubPhase::Idle || self.campaign_active() {
            debug!(error = %last, "command failure streak ignored while hub is busy");
            return;
        }
        let reason = if last.is_timeout() {
            ResetReason::KernelTimeout
        } else {
            ResetReason::KernelComFail
        };
        warn!(%reason, threshold = self.config.com_fail_reset_threshold, "repeated command failures; requesting reset");
        drop(self.supervisor.request(reason));
    }

    fn check_present(&self, sensor: SensorType) -> Result<(), HubError> {
        if self.table.is_unreported(sensor) {
            return Err(HubError::InvalidConfig(format!("{sensor} is not present on the hub")));
        }
        Ok(())
    }

    pub(crate) async fn enable(&self, sensor: SensorType, config: SensorConfig) -> Result<(), HubError> {
        config.validate()?;
        self.check_present(sensor)?;
        let _op = self.op_locks[sensor.index()].lock().await;
        let opcode = if self.table.is_enabled(sensor) {
            Opcode::ChangeDelay
        } else {
            Opcode::Enable
        };
        self.table.enable(sensor, config, self.now_ns())?;
        self.command(HubCommand::configure(opcode, sensor, config))
            .await
            .map(|_| ())
    }

    pub(crate) async fn disable(&self, sensor: SensorType) -> Result<(), HubError> {
        self.check_present(sensor)?;
        let _op = self.op_locks[sensor.index()].lock().await;
        self.table.disable(sensor);
        self.command(HubCommand::for_sensor(Opcode::Disable, sensor))
            .await
            .map(|_| ())
    }

    pub(crate) async fn flush(&self, sensor: SensorType) -> Result<(), HubError> {
        self.check_present(sensor)?;
        self.command(HubCommand::for_sensor(Opcode::Flush, sensor))
            .await
            .map(|_| ())
    }

    /// Push a table entry back to a freshly reset hub.  The silence window
    /// restarts so the health monitor does not count the reset gap.
    pub(crate) async fn reenable(&self, sensor: SensorType, config: SensorConfig) -> Result<(), HubError> {
        let _op = self.op_locks[sensor.index()].lock().await;
        self.table.record_event(sensor, self.now_ns());
        self.command(HubCommand::configure(Opcode::Enable, sensor, config))
            .await
            .map(|_| ())
    }
}
