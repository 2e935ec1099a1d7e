//! Hub memory capture on fatal failure.
//!
//! The image format belongs to the hub firmware; this module only reads the
//! bytes through [`Platform::read_memory_dump`] and hands them to a
//! [`DumpStore`].  Capture is best effort: every failure is logged and
//! swallowed.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use shub_hal::Platform;
use shub_types::{HubError, ResetReason};
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised while capturing or storing a dump.
#[derive(Error, Debug)]
pub enum DumpError {
    #[error("Dump I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Hub refused memory read: {0}")]
    Hub(#[from] HubError),
}

/// One raw memory image.
#[derive(Debug, Clone)]
pub struct HubDump {
    pub reason: ResetReason,
    pub taken_at: DateTime<Utc>,
    pub image: Vec<u8>,
}

/// Metadata of the last stored dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpInfo {
    pub reason: ResetReason,
    pub taken_at: DateTime<Utc>,
    pub size: usize,
    /// Where the store put it (a path for [`FileDumpStore`]).
    pub location: String,
}

/// Destination for captured images.
pub trait DumpStore: Send + Sync {
    /// Persist `dump` and return its location.
    fn store(&self, dump: &HubDump) -> Result<String, DumpError>;
}

/// Writes `hub_dump_<reason>_<UTC stamp>.bin` files into a directory.
pub struct FileDumpStore {
    dir: PathBuf,
}

impl FileDumpStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DumpStore for FileDumpStore {
    fn store(&self, dump: &HubDump) -> Result<String, DumpError> {
        fs::create_dir_all(&self.dir)?;
        let name = format!(
            "hub_dump_{}_{}.bin",
            dump.reason.to_string().to_lowercase(),
            dump.taken_at.format("%Y%m%dT%H%M%S%.3fZ")
        );
        let path = self.dir.join(name);
        fs::write(&path, &dump.image)?;
        Ok(path.display().to_string())
    }
}

/// Keeps only the most recent image in memory.  Used when the board
/// description names no dump directory.
#[derive(Default)]
pub struct MemoryDumpStore {
    last: Mutex<Option<HubDump>>,
}

impl MemoryDumpStore {
    pub fn last(&self) -> Option<HubDump> {
        self.last.lock().clone()
    }
}

impl DumpStore for MemoryDumpStore {
    fn store(&self, dump: &HubDump) -> Result<String, DumpError> {
        *self.last.lock() = Some(dump.clone());
        Ok("memory".to_string())
    }
}

/// Reads and stores dumps, remembering the last one.
pub struct DumpCapture {
    store: Arc<dyn DumpStore>,
    last: Mutex<Option<DumpInfo>>,
}

impl DumpCapture {
    pub fn new(store: Arc<dyn DumpStore>) -> Self {
        Self {
            store,
            last: Mutex::new(None),
        }
    }

    /// Metadata of the last successful capture.
    pub fn last(&self) -> Option<DumpInfo> {
        self.last.lock().clone()
    }

    /// Read the hub image on a blocking task and store it.
    pub async fn capture(&self, platform: Arc<dyn Platform>, reason: ResetReason) -> Option<DumpInfo> {
        let store = Arc::clone(&self.store);
        let outcome = tokio::task::spawn_blocking(move || -> Result<DumpInfo, DumpError> {
            let image = platform.read_memory_dump()?;
            let dump = HubDump {
                reason,
                taken_at: Utc::now(),
                image,
            };
            let location = store.store(&dump)?;
            Ok(DumpInfo {
                reason,
                taken_at: dump.taken_at,
                size: dump.image.len(),
                location,
            })
        })
        .await;

        match outcome {
            Ok(Ok(info)) => {
                info!(%reason, size = info.size, location = %info.location, "hub memory dump captured");
                *self.last.lock() = Some(info.clone());
                Some(info)
            }
            Ok(Err(e)) => {
                warn!(%reason, error = %e, "hub memory dump failed");
                None
            }
            Err(e) => {
                warn!(%reason, error = %e, "hub memory dump task aborted");
                None
            }
        }
    }
}
