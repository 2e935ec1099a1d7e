use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Number of sensor-type slots the hub can address.  Every bitmap in the
/// subsystem is a `u64` indexed by [`SensorType`].
pub const MAX_SENSOR_TYPES: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// Sensor identity
// ─────────────────────────────────────────────────────────────────────────────

/// Hub-side sensor type identifier (bit position in every bitmap).
///
/// Always below [`MAX_SENSOR_TYPES`]: values are built through
/// [`SensorType::new`], `TryFrom<u8>` or the named constants, and
/// deserialisation goes through the same check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SensorType(u8);

impl SensorType {
    pub const ACCELEROMETER: Self = Self(1);
    pub const MAGNETOMETER: Self = Self(2);
    pub const GYROSCOPE: Self = Self(4);
    pub const LIGHT: Self = Self(5);
    pub const PRESSURE: Self = Self(6);
    pub const PROXIMITY: Self = Self(8);
    pub const GRAVITY: Self = Self(9);
    pub const LINEAR_ACCELERATION: Self = Self(10);
    pub const ROTATION_VECTOR: Self = Self(11);
    pub const MAGNETOMETER_UNCALIBRATED: Self = Self(14);
    pub const GAME_ROTATION_VECTOR: Self = Self(15);
    pub const GYROSCOPE_UNCALIBRATED: Self = Self(16);
    pub const SIGNIFICANT_MOTION: Self = Self(17);
    pub const STEP_DETECTOR: Self = Self(18);
    pub const STEP_COUNTER: Self = Self(19);
    pub const GEOMAGNETIC_ROTATION_VECTOR: Self = Self(20);

    /// Build a sensor type, rejecting values outside the bitmap.
    pub fn new(raw: u8) -> Option<Self> {
        ((raw as usize) < MAX_SENSOR_TYPES).then_some(Self(raw))
    }

    /// Wire value.
    pub fn raw(self) -> u8 {
        self.0
    }

    /// Slot index into per-sensor arrays.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Single-bit mask of this sensor inside a `u64` bitmap.
    pub fn bit(self) -> u64 {
        1u64 << self.0
    }

    /// Every addressable sensor type in ascending order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..MAX_SENSOR_TYPES as u8).map(Self)
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sensor#{}", self.0)
    }
}

impl TryFrom<u8> for SensorType {
    type Error = HubError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or_else(|| HubError::InvalidConfig(format!("sensor type {raw} out of range")))
    }
}

impl From<SensorType> for u8 {
    fn from(sensor: SensorType) -> Self {
        sensor.0
    }
}

impl FromStr for SensorType {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s
            .trim()
            .trim_start_matches("sensor#")
            .parse::<u8>()
            .map_err(|e| HubError::InvalidConfig(format!("bad sensor type '{s}': {e}")))?;
        Self::try_from(raw)
    }
}

/// Iterate the sensor types set in `bitmap`, lowest type first.
pub fn sensors_in(bitmap: u64) -> impl Iterator<Item = SensorType> {
    SensorType::all().filter(move |s| bitmap & s.bit() != 0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration of a single sensor
// ─────────────────────────────────────────────────────────────────────────────

/// Sampling period and batching latency requested for one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SensorConfig {
    pub sampling_period_ms: u32,
    /// `0` means un-batched delivery.
    pub max_latency_ms: u32,
}

impl SensorConfig {
    pub fn new(sampling_period_ms: u32, max_latency_ms: u32) -> Self {
        Self {
            sampling_period_ms,
            max_latency_ms,
        }
    }

    /// An enabled sensor must always carry a non-zero period.
    pub fn validate(&self) -> Result<(), HubError> {
        if self.sampling_period_ms == 0 {
            return Err(HubError::InvalidConfig(
                "sampling period must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_unbatched(&self) -> bool {
        self.max_latency_ms == 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reset bookkeeping
// ─────────────────────────────────────────────────────────────────────────────

/// Why a hub reset was requested.  Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResetReason {
    /// A vital sensor went silent.
    NoEvent,
    /// Hub commands kept timing out.
    KernelTimeout,
    /// Hub commands kept failing.
    KernelComFail,
    /// Manual request from the debug interface (also used by self-check).
    KernelSysfs,
    /// The hub reported its own firmware crash.
    McuCrashed,
    /// Unknown cause.
    #[default]
    HubCrashed,
}

impl ResetReason {
    /// Crash reasons warrant a memory dump before the hub is reset.
    pub fn is_crash(self) -> bool {
        matches!(self, ResetReason::McuCrashed | ResetReason::HubCrashed)
    }
}

impl fmt::Display for ResetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResetReason::NoEvent => "NO_EVENT",
            ResetReason::KernelTimeout => "KERNEL_TIMEOUT",
            ResetReason::KernelComFail => "KERNEL_COM_FAIL",
            ResetReason::KernelSysfs => "KERNEL_SYSFS",
            ResetReason::McuCrashed => "MCU_CRASHED",
            ResetReason::HubCrashed => "HUB_CRASHED",
        };
        f.write_str(s)
    }
}

/// The most recent reset.  Single slot, overwritten on every reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetRecord {
    /// Monotonic timestamp (ns since subsystem start).
    pub timestamp_ns: u64,
    pub wall_clock: DateTime<Utc>,
    pub reason: ResetReason,
}

/// Point-in-time copy of the diagnostic counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub reset: u64,
    pub timeout: u64,
    pub com_fail: u64,
    pub no_event_reset: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Hub traffic
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of an inbound hub event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// A regular sensor sample.
    Data,
    /// Completion marker answering a flush request.
    FlushComplete,
}

/// One event delivered by the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubEvent {
    pub sensor: SensorType,
    pub kind: EventKind,
    /// Hub-side monotonic timestamp in ns; `0` means "unknown".
    pub timestamp_ns: u64,
    pub payload: Vec<u8>,
}

impl HubEvent {
    pub fn data(sensor: SensorType, timestamp_ns: u64, payload: Vec<u8>) -> Self {
        Self {
            sensor,
            kind: EventKind::Data,
            timestamp_ns,
            payload,
        }
    }

    pub fn flush_complete(sensor: SensorType, timestamp_ns: u64) -> Self {
        Self {
            sensor,
            kind: EventKind::FlushComplete,
            timestamp_ns,
            payload: Vec::new(),
        }
    }
}

/// Command opcodes understood by the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Enable,
    Disable,
    ChangeDelay,
    Flush,
    SystemCheck,
    GetScanningInfo,
    GetFirmwareVersion,
    GetCapabilities,
    GetOperationStats,
    SuspendStatus,
    SpecialMode,
    PushCalibration,
    SetPosition,
}

/// A single outbound command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubCommand {
    pub opcode: Opcode,
    pub sensor: Option<SensorType>,
    pub sub_command: u8,
    pub payload: Vec<u8>,
}

impl HubCommand {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            sensor: None,
            sub_command: 0,
            payload: Vec::new(),
        }
    }

    pub fn for_sensor(opcode: Opcode, sensor: SensorType) -> Self {
        Self {
            sensor: Some(sensor),
            ..Self::new(opcode)
        }
    }

    pub fn with_sub_command(mut self, sub_command: u8) -> Self {
        self.sub_command = sub_command;
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    /// Enable (or re-arm with `Opcode::ChangeDelay`) carrying period and
    /// latency as two little-endian `u32`s.
    pub fn configure(opcode: Opcode, sensor: SensorType, config: SensorConfig) -> Self {
        let mut payload = Vec::with_capacity(8);
        payload.extend_from_slice(&config.sampling_period_ms.to_le_bytes());
        payload.extend_from_slice(&config.max_latency_ms.to_le_bytes());
        Self::for_sensor(opcode, sensor).with_payload(payload)
    }

    /// Inverse of [`HubCommand::configure`].
    pub fn sensor_config(&self) -> Option<SensorConfig> {
        let period = self.payload.get(0..4)?.try_into().ok()?;
        let latency = self.payload.get(4..8)?.try_into().ok()?;
        Some(SensorConfig::new(
            u32::from_le_bytes(period),
            u32::from_le_bytes(latency),
        ))
    }
}

/// Fastest rate a sensor supports, as advertised by the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorCapability {
    pub sensor: SensorType,
    pub min_period_us: u32,
}

/// Hub-measured timing of one driver operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimingStat {
    pub count: u32,
    pub sum_us: u64,
    pub min_us: u32,
    pub max_us: u32,
}

/// Hub-reported open/read/close timing for one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStats {
    pub sensor: SensorType,
    pub open: TimingStat,
    pub read: TimingStat,
    pub close: TimingStat,
}

/// Decoded reply to a [`HubCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HubResponse {
    Ack,
    Scanning { probe_bitmap: u64 },
    Firmware { version: u32 },
    Capabilities(Vec<SensorCapability>),
    OperationStats(Vec<OperationStats>),
}

/// Host suspend state forwarded to the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuspendStatus {
    Resume,
    Suspend,
}

impl SuspendStatus {
    pub fn code(self) -> u8 {
        match self {
            SuspendStatus::Resume => 0,
            SuspendStatus::Suspend => 1,
        }
    }
}

/// What a stored calibration item configures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationKind {
    Offsets,
    Position,
}

/// One independently pushed resync item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationItem {
    pub sensor: SensorType,
    pub kind: CalibrationKind,
    pub data: Vec<u8>,
}

impl CalibrationItem {
    pub fn command(&self) -> HubCommand {
        let opcode = match self.kind {
            CalibrationKind::Offsets => Opcode::PushCalibration,
            CalibrationKind::Position => Opcode::SetPosition,
        };
        HubCommand::for_sensor(opcode, self.sensor).with_payload(self.data.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Downstream notifications
// ─────────────────────────────────────────────────────────────────────────────

/// Notifications broadcast to subscribers of the subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Notification {
    ResetOccurred { reason: ResetReason },
    SuspendStatusChanged(SuspendStatus),
    DumpCaptured { reason: ResetReason, path: String },
    SelfCheckComplete { passed: usize, failed: usize },
}

/// Notification wrapper carried on the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "shub-kernel::supervisor"
    pub source: String,
    pub payload: Notification,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: Notification) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Board description
// ─────────────────────────────────────────────────────────────────────────────

/// Mounting position of a sensor on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardPosition {
    pub sensor: SensorType,
    pub position: u8,
}

/// Defaults for the self-check campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfCheckDefaults {
    #[serde(default = "default_check_delay_us")]
    pub delay_us: u32,
    #[serde(default = "default_check_iterations")]
    pub iterations: u32,
    #[serde(default = "default_system_cycles")]
    pub system_cycles: u32,
    #[serde(default = "default_enable_settle_ms")]
    pub enable_settle_ms: u64,
    #[serde(default = "default_event_window_ms")]
    pub event_window_ms: u64,
    #[serde(default = "default_order_warmup_ms")]
    pub order_warmup_ms: u64,
    #[serde(default = "default_order_inner_steps")]
    pub order_inner_steps: u32,
    #[serde(default = "default_order_max_sleep_ms")]
    pub order_max_sleep_ms: u64,
    /// Fixed RNG seed for the ordering phase; `None` draws from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_check_delay_us() -> u32 {
    500
}
fn default_check_iterations() -> u32 {
    50
}
fn default_system_cycles() -> u32 {
    5
}
fn default_enable_settle_ms() -> u64 {
    10
}
fn default_event_window_ms() -> u64 {
    1000
}
fn default_order_warmup_ms() -> u64 {
    2000
}
fn default_order_inner_steps() -> u32 {
    100
}
fn default_order_max_sleep_ms() -> u64 {
    10
}

impl Default for SelfCheckDefaults {
    fn default() -> Self {
        Self {
            delay_us: default_check_delay_us(),
            iterations: default_check_iterations(),
            system_cycles: default_system_cycles(),
            enable_settle_ms: default_enable_settle_ms(),
            event_window_ms: default_event_window_ms(),
            order_warmup_ms: default_order_warmup_ms(),
            order_inner_steps: default_order_inner_steps(),
            order_max_sleep_ms: default_order_max_sleep_ms(),
            seed: None,
        }
    }
}

/// Board description: every tunable the subsystem branches on, populated
/// once at start-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardConfig {
    #[serde(default = "default_board_name")]
    pub name: String,
    #[serde(default = "default_health_period_ms")]
    pub health_period_ms: u64,
    #[serde(default = "default_no_event_threshold_ms")]
    pub no_event_threshold_ms: u64,
    #[serde(default = "default_vital_sensors")]
    pub vital_sensors: Vec<SensorType>,
    /// Pause after each re-enable during resync.
    #[serde(default = "default_reset_settle_ms")]
    pub reset_settle_ms: u64,
    /// How long a queued reset waits before it starts (and can still be
    /// replaced by a newer request).
    #[serde(default)]
    pub reset_schedule_delay_ms: u64,
    #[serde(default = "default_com_fail_threshold")]
    pub com_fail_reset_threshold: u32,
    #[serde(default = "default_positions")]
    pub positions: Vec<BoardPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dump_dir: Option<PathBuf>,
    #[serde(default)]
    pub self_check: SelfCheckDefaults,
}

fn default_board_name() -> String {
    "generic".to_string()
}
fn default_health_period_ms() -> u64 {
    5000
}
fn default_no_event_threshold_ms() -> u64 {
    5000
}
fn default_vital_sensors() -> Vec<SensorType> {
    vec![
        SensorType::ACCELEROMETER,
        SensorType::MAGNETOMETER,
        SensorType::GYROSCOPE,
        SensorType::PRESSURE,
        SensorType::MAGNETOMETER_UNCALIBRATED,
        SensorType::GAME_ROTATION_VECTOR,
        SensorType::GYROSCOPE_UNCALIBRATED,
    ]
}
fn default_reset_settle_ms() -> u64 {
    20
}
fn default_com_fail_threshold() -> u32 {
    3
}
fn default_positions() -> Vec<BoardPosition> {
    vec![
        BoardPosition {
            sensor: SensorType::ACCELEROMETER,
            position: 0,
        },
        BoardPosition {
            sensor: SensorType::GYROSCOPE,
            position: 0,
        },
        BoardPosition {
            sensor: SensorType::MAGNETOMETER,
            position: 0,
        },
    ]
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            name: default_board_name(),
            health_period_ms: default_health_period_ms(),
            no_event_threshold_ms: default_no_event_threshold_ms(),
            vital_sensors: default_vital_sensors(),
            reset_settle_ms: default_reset_settle_ms(),
            reset_schedule_delay_ms: 0,
            com_fail_reset_threshold: default_com_fail_threshold(),
            positions: default_positions(),
            dump_dir: None,
            self_check: SelfCheckDefaults::default(),
        }
    }
}

impl BoardConfig {
    /// Reject configurations the health monitor cannot run with.  Sensor
    /// ids are range-checked when they are parsed.
    pub fn validate(&self) -> Result<(), HubError> {
        if self.health_period_ms == 0 {
            return Err(HubError::InvalidConfig(
                "health_period_ms must be greater than zero".to_string(),
            ));
        }
        if self.no_event_threshold_ms == 0 {
            return Err(HubError::InvalidConfig(
                "no_event_threshold_ms must be greater than zero".to_string(),
            ));
        }
        if self.self_check.event_window_ms == 0 {
            return Err(HubError::InvalidConfig(
                "self_check.event_window_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn health_period(&self) -> Duration {
        Duration::from_millis(self.health_period_ms)
    }

    pub fn no_event_threshold(&self) -> Duration {
        Duration::from_millis(self.no_event_threshold_ms)
    }

    pub fn reset_settle(&self) -> Duration {
        Duration::from_millis(self.reset_settle_ms)
    }

    pub fn reset_schedule_delay(&self) -> Duration {
        Duration::from_millis(self.reset_schedule_delay_ms)
    }

    /// Position items pushed alongside stored calibration during resync.
    pub fn position_items(&self) -> Vec<CalibrationItem> {
        self.positions
            .iter()
            .map(|p| CalibrationItem {
                sensor: p.sensor,
                kind: CalibrationKind::Position,
                data: vec![p.position],
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error type spanning hub commands, the reset primitive and configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HubError {
    #[error("Hub command {opcode:?} timed out")]
    Timeout { opcode: Opcode },

    #[error("Hub command {opcode:?} failed: {details}")]
    CommandFailed { opcode: Opcode, details: String },

    #[error("Malformed response to {opcode:?}: {details}")]
    Malformed { opcode: Opcode, details: String },

    #[error("Cannot decode {sensor} payload: {details}")]
    Decode { sensor: SensorType, details: String },

    #[error("Hub reset failed: {0}")]
    ResetFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Calibration storage error: {0}")]
    Storage(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Hub is busy: {0}")]
    Busy(String),
}

impl HubError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, HubError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensors_in_iterates_ascending() {
        let last = SensorType::new(63).unwrap();
        let bitmap = SensorType::GYROSCOPE.bit() | SensorType::ACCELEROMETER.bit() | last.bit();
        let found: Vec<_> = sensors_in(bitmap).collect();
        assert_eq!(
            found,
            vec![SensorType::ACCELEROMETER, SensorType::GYROSCOPE, last]
        );
    }

    #[test]
    fn sensor_type_rejects_out_of_range() {
        assert!(SensorType::new(63).is_some());
        assert!(SensorType::new(64).is_none());
        assert!("64".parse::<SensorType>().is_err());
        assert_eq!("sensor#4".parse::<SensorType>().unwrap(), SensorType::GYROSCOPE);
        assert!(SensorType::try_from(70u8).is_err());
        assert_eq!(SensorType::new(63).unwrap().bit(), 1 << 63);
    }

    #[test]
    fn out_of_range_sensor_ids_do_not_deserialize() {
        assert_eq!(serde_json::from_str::<SensorType>("6").unwrap(), SensorType::PRESSURE);
        assert!(serde_json::from_str::<SensorType>("64").is_err());
        assert_eq!(serde_json::to_string(&SensorType::GYROSCOPE).unwrap(), "4");

        let board = serde_json::from_str::<BoardConfig>(r#"{"vital_sensors": [70, 1]}"#);
        assert!(board.is_err(), "vital sensor 70 must be rejected");
    }

    #[test]
    fn board_config_rejects_zero_timing() {
        assert!(BoardConfig::default().validate().is_ok());
        for broken in [
            BoardConfig {
                health_period_ms: 0,
                ..BoardConfig::default()
            },
            BoardConfig {
                no_event_threshold_ms: 0,
                ..BoardConfig::default()
            },
        ] {
            assert!(matches!(broken.validate(), Err(HubError::InvalidConfig(_))));
        }
    }

    #[test]
    fn zero_period_is_invalid() {
        assert!(SensorConfig::new(0, 0).validate().is_err());
        assert!(SensorConfig::new(10, 0).validate().is_ok());
    }

    #[test]
    fn configure_command_carries_config() {
        let cfg = SensorConfig::new(66, 5000);
        let cmd = HubCommand::configure(Opcode::Enable, SensorType::ACCELEROMETER, cfg);
        assert_eq!(cmd.sensor, Some(SensorType::ACCELEROMETER));
        assert_eq!(cmd.sensor_config(), Some(cfg));
        assert_eq!(HubCommand::new(Opcode::Flush).sensor_config(), None);
    }

    #[test]
    fn reset_reason_uses_canonical_names() {
        assert_eq!(ResetReason::NoEvent.to_string(), "NO_EVENT");
        assert_eq!(ResetReason::default(), ResetReason::HubCrashed);
        let json = serde_json::to_string(&ResetReason::KernelComFail).unwrap();
        assert_eq!(json, "\"KERNEL_COM_FAIL\"");
        assert!(ResetReason::McuCrashed.is_crash());
        assert!(!ResetReason::KernelSysfs.is_crash());
    }

    #[test]
    fn board_config_fills_defaults_from_partial_json() {
        let cfg: BoardConfig = serde_json::from_str(r#"{ "name": "devkit", "health_period_ms": 1000 }"#).unwrap();
        assert_eq!(cfg.name, "devkit");
        assert_eq!(cfg.health_period(), Duration::from_secs(1));
        assert_eq!(cfg.no_event_threshold_ms, 5000);
        assert_eq!(cfg.vital_sensors.len(), 7);
        assert_eq!(cfg.self_check.iterations, 50);
        assert_eq!(cfg.position_items().len(), 3);
    }

    #[test]
    fn hub_error_display() {
        let err = HubError::Timeout {
            opcode: Opcode::Flush,
        };
        assert!(err.is_timeout());
        assert!(err.to_string().contains("Flush"));
    }
}
