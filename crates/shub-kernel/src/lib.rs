//! `shub-kernel` – Liveness & Recovery
//!
//! Keeps the sensor hub alive. It does not interpret sensor data; it tracks
//! what the host asked the hub to do, notices when the hub stops doing it,
//! and puts it back.
//!
//! # Modules
//!
//! - [`state_table`] – [`SensorStateTable`][state_table::SensorStateTable]:
//!   enable bitmap, period/latency and last-event time per sensor type.
//! - [`counters`] – [`Counters`][counters::Counters] and the consecutive
//!   command-failure detector.
//! - [`health`] – [`HealthMonitor`][health::HealthMonitor]: no-event
//!   detection over the vital sensors, run on a periodic tick.
//! - [`supervisor`] – single-slot reset queue and the reset/resync sequence.
//! - [`dump`] – [`DumpCapture`][dump::DumpCapture]: hub memory images on
//!   fatal failure.
//! - [`hub`] – [`SensorHub`][hub::SensorHub]: the context object owning all
//!   of the above plus the event pump.

pub mod counters;
pub mod dump;
pub mod health;
pub mod hub;
mod sensor_ops;
pub mod state_table;
pub mod supervisor;

pub use counters::{Counters, FailureStreak};
pub use dump::{DumpCapture, DumpError, DumpInfo, DumpStore, FileDumpStore, HubDump, MemoryDumpStore};
pub use health::{HealthMonitor, SensorHealth};
pub use hub::{CampaignHold, EventTap, HubStatus, SensorHub, SensorHubBuilder, SensorStatus};
pub use state_table::{SensorState, SensorStateTable, StateSnapshot};
pub use supervisor::{HubPhase, ResetTicket};
