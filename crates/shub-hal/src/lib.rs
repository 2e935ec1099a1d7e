//! `shub-hal` – Hub collaborator boundary.
//!
//! Everything the recovery core talks to but does not implement lives behind
//! a trait here, so the kernel can be driven by real hardware or by the
//! in-process simulator without changes.
//!
//! # Modules
//!
//! - [`transport`] – [`Transport`][transport::Transport]: typed command
//!   round-trips, pending-list discard and the inbound event stream.
//! - [`platform`] – [`Platform`][platform::Platform]: hard reset, liveness,
//!   suspend inhibit and memory dumps.
//! - [`storage`] – [`CalibrationStorage`][storage::CalibrationStorage]:
//!   calibration items re-pushed after every reset.
//! - [`notifier`] – [`Notifier`][notifier::Notifier]: downstream broadcast.
//! - [`registry`] – [`SensorRegistry`][registry::SensorRegistry]: per-type
//!   decode/format codecs.
//! - [`sim`] – [`SimHub`][sim::SimHub]: simulated hub for CI and the CLI.

pub mod notifier;
pub mod platform;
pub mod registry;
pub mod sim;
pub mod storage;
pub mod transport;

pub use notifier::{Notifier, NullNotifier};
pub use platform::Platform;
pub use registry::{SensorCodec, SensorRegistry, SensorSample};
pub use sim::{RecordingNotifier, SimHub, SimStorage};
pub use storage::{CalibrationStorage, NoCalibrationStorage};
pub use transport::Transport;
