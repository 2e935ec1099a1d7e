//! Command/event channel to the hub.
//!
//! The subsystem never encodes wire frames itself.  It hands typed
//! [`HubCommand`]s to a [`Transport`] and consumes the transport's inbound
//! [`HubEvent`] stream; everything below that line belongs to the transport
//! implementation.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use shub_types::{HubCommand, HubError, HubEvent, HubResponse};

/// Every hub channel implementation must provide this trait.
///
/// # Contract
///
/// * `send_command` – performs one round-trip.  Command-level timeouts are
///   enforced here and reported as [`HubError::Timeout`].
/// * `discard_pending` – drops every queued or in-flight command so that
///   completions issued before a reset are never delivered after it.
/// * `event_stream` – returns the live inbound event stream.  It is taken
///   once when the hub starts; later calls may return an empty stream.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `command` and wait for its decoded response.
    async fn send_command(&self, command: HubCommand) -> Result<HubResponse, HubError>;

    /// Drop the pending list.  Returns how many commands were discarded.
    fn discard_pending(&self) -> usize;

    /// Stream of events delivered by the hub.
    fn event_stream(&self) -> BoxStream<'static, HubEvent>;
}
