//! Downstream notification sink ("reset occurred", suspend status, ...).

use shub_types::Notification;

/// Receives subsystem notifications.  Implementations must not block.
pub trait Notifier: Send + Sync {
    fn broadcast(&self, notification: Notification);
}

/// Notifier that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn broadcast(&self, _notification: Notification) {}
}
