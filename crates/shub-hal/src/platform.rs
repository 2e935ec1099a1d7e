//! Board-level control of the hub: hard reset, liveness, suspend inhibit
//! and raw memory capture.
//!
//! All methods are blocking.  Async callers run them on a blocking task.

use shub_types::HubError;

/// Platform primitives the recovery supervisor relies on.
pub trait Platform: Send + Sync {
    /// Reset the hub and wait until it is back in a state where commands can
    /// be issued.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::ResetFailed`] when the hub did not come back.
    fn reset_hub(&self) -> Result<(), HubError>;

    /// Composite of probe, busy and in-reset state.
    fn is_hub_alive(&self) -> bool;

    /// Hold (`true`) or release (`false`) the suspend-inhibit lock.
    fn stay_awake(&self, hold: bool);

    /// Read the hub memory image for post-mortem analysis.
    fn read_memory_dump(&self) -> Result<Vec<u8>, HubError>;
}
