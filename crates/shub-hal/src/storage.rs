//! Persistent calibration storage.
//!
//! File I/O lives behind this trait; the supervisor only asks whether the
//! storage is ready and which items to push.

use shub_types::{CalibrationItem, HubError};

/// Source of per-sensor calibration data re-pushed after every reset.
pub trait CalibrationStorage: Send + Sync {
    /// `false` while the backing filesystem is not mounted yet.
    fn is_ready(&self) -> bool;

    /// Load every stored calibration item.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Storage`] when the backing store cannot be read.
    fn load_all(&self) -> Result<Vec<CalibrationItem>, HubError>;
}

/// Storage for boards without persistent calibration.  Never ready.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCalibrationStorage;

impl CalibrationStorage for NoCalibrationStorage {
    fn is_ready(&self) -> bool {
        false
    }

    fn load_all(&self) -> Result<Vec<CalibrationItem>, HubError> {
        Ok(Vec::new())
    }
}
