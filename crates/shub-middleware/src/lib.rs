//! `shub-middleware` – Notification fan-out.
//!
//! Routes subsystem notifications (resets, suspend status, dumps, self-check
//! results) to any number of subscribers without the kernel knowing who
//! listens.
//!
//! # Modules
//!
//! - [`bus`] – Topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.  [`EventBus`] implements
//!   [`Notifier`][shub_hal::Notifier] so it can be handed straight to the
//!   kernel.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
