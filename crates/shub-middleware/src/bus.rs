//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::HubStatus`] | Reset notifications and suspend-status changes |
//! | [`Topic::Diagnostics`] | Memory dumps and self-check reports |
//!
//! Every event is additionally mirrored to a global channel for consumers
//! that want everything ([`EventBus::subscribe`]).

use shub_hal::Notifier;
use shub_types::{Event, HubError, Notification};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

const SOURCE: &str = "shub-middleware::bus";

/// Routing lanes on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Reset notifications and suspend-status changes.
    HubStatus,
    /// Memory dumps and self-check reports.
    Diagnostics,
}

impl Topic {
    /// Lane a notification belongs on.
    pub fn of(notification: &Notification) -> Self {
        match notification {
            Notification::ResetOccurred { .. } | Notification::SuspendStatusChanged(_) => {
                Topic::HubStatus
            }
            Notification::DumpCaptured { .. } | Notification::SelfCheckComplete { .. } => {
                Topic::Diagnostics
            }
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    all: broadcast::Sender<Event>,
    hub_status: broadcast::Sender<Event>,
    diagnostics: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every channel independently.
    pub fn new(capacity: usize) -> Self {
        let (all, _) = broadcast::channel(capacity);
        let (hub_status, _) = broadcast::channel(capacity);
        let (diagnostics, _) = broadcast::channel(capacity);
        Self {
            all,
            hub_status,
            diagnostics,
        }
    }

    /// Publish `event` to `topic` and mirror it on the global channel.
    ///
    /// Returns the number of topic receivers that were handed the event.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Channel`] when nobody listens on either channel.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, HubError> {
        let mirrored = self.all.send(event.clone()).unwrap_or(0);
        match self.topic_sender(topic).send(event) {
            Ok(n) => Ok(n),
            Err(_) if mirrored > 0 => Ok(0),
            Err(_) => Err(HubError::Channel(format!(
                "no subscribers for topic {topic:?}"
            ))),
        }
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Subscribe to every event regardless of topic.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.all.subscribe()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::HubStatus => &self.hub_status,
            Topic::Diagnostics => &self.diagnostics,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Notifier for EventBus {
    fn broadcast(&self, notification: Notification) {
        let topic = Topic::of(&notification);
        if let Err(e) = self.publish_to(topic, Event::new(SOURCE, notification)) {
            // Nobody listening is normal at start-up.
            debug!(?topic, error = %e, "notification dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic, skipping over lag.
    ///
    /// Returns `None` when the bus has shut down.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "TopicReceiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}
