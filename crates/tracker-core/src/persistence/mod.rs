//! Registry persistence
//!
//! The scheduler hands a [`RegistrySnapshot`] to a [`SnapshotStore`] after
//! every state change. Saving is best-effort: failures are logged by the
//! caller and never interrupt scheduling.

mod snapshot;

#[cfg(test)]
mod tests;

pub use snapshot::{RegistrySnapshot, TrackerRecord};

use anyhow::{Context, Result};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Durable sink for registry snapshots
pub trait SnapshotStore: Send + Sync {
    fn save(&self, snapshot: &RegistrySnapshot) -> Result<()>;

    /// `Ok(None)` when nothing has been saved yet
    fn load(&self) -> Result<Option<RegistrySnapshot>>;
}

/// JSON file written atomically through a temp file
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonFileStore {
    fn save(&self, snapshot: &RegistrySnapshot) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Snapshot writer lock poisoned"))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let json = serde_json::to_vec_pretty(snapshot).context("Failed to serialize snapshot")?;

        let temp_path = self.path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp file {:?}", temp_path))?;

        file.write_all(&json).context("Failed to write snapshot")?;
        file.sync_all().context("Failed to sync snapshot file")?;

        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, self.path))?;

        debug!(path = %self.path.display(), trackers = snapshot.trackers.len(), "Snapshot saved");
        Ok(())
    }

    fn load(&self) -> Result<Option<RegistrySnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let data = fs::read(&self.path)
            .with_context(|| format!("Failed to read snapshot file {:?}", self.path))?;
        let value: Value =
            serde_json::from_slice(&data).context("Failed to parse snapshot file")?;

        let snapshot = RegistrySnapshot::from_value(&value);
        info!(
            path = %self.path.display(),
            trackers = snapshot.trackers.len(),
            "Loaded snapshot from disk"
        );
        Ok(Some(snapshot))
    }
}

/// In-process store, used when no state file is configured
#[derive(Default)]
pub struct MemoryStore {
    slot: Mutex<Option<Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with raw JSON, as if a previous process had saved it
    pub fn with_value(value: Value) -> Self {
        Self {
            slot: Mutex::new(Some(value)),
        }
    }

    pub fn raw(&self) -> Option<Value> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }
}

impl SnapshotStore for MemoryStore {
    fn save(&self, snapshot: &RegistrySnapshot) -> Result<()> {
        let value = serde_json::to_value(snapshot).context("Failed to serialize snapshot")?;
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("Snapshot slot lock poisoned"))?;
        *slot = Some(value);
        Ok(())
    }

    fn load(&self) -> Result<Option<RegistrySnapshot>> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("Snapshot slot lock poisoned"))?;
        Ok(slot.as_ref().map(RegistrySnapshot::from_value))
    }
}
