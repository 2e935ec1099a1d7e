//! `shub-runtime` – Diagnostics and process plumbing around the sensor hub.
//!
//! # Modules
//!
//! - [`self_check`] – [`SelfCheckEngine`][self_check::SelfCheckEngine]:
//!   the engineering stress campaign (system, comm, event timing and
//!   timestamp-ordering phases) with snapshot/restore of the sensor table.
//!   Compiled only with the `self-check` feature (on by default).
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber (pretty or JSON, selected
//!   with `SHUB_LOG_FORMAT`) with an optional OTLP span exporter.  Set
//!   `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export.
//! - [`error`] – [`SelfCheckError`].
//!
//! # Running a campaign
//!
//! ```no_run
//! # #[cfg(feature = "self-check")]
//! # async fn demo(hub: shub_kernel::SensorHub) {
//! use shub_runtime::self_check::{SelfCheckEngine, params::CheckRequest};
//!
//! let engine = SelfCheckEngine::new(hub);
//! let report = engine
//!     .run_system_check(CheckRequest::new(500, 20))
//!     .expect("no campaign running")
//!     .await
//!     .expect("campaign task panicked");
//! println!("{report}");
//! # }
//! ```

pub mod error;
#[cfg(feature = "self-check")]
pub mod self_check;
pub mod telemetry;

pub use error::SelfCheckError;
#[cfg(feature = "self-check")]
pub use self_check::{CampaignState, SelfCheckEngine};
#[cfg(feature = "self-check")]
pub use self_check::params::CheckRequest;
#[cfg(feature = "self-check")]
pub use self_check::report::SelfCheckReport;
pub use telemetry::{TracerProviderGuard, init_tracing};
