//! JSON-file run history store
//!
//! Appends one [`HistoryEntry`] per run to a single JSON array on disk
//! (`sync-history.json`). Good enough for the single-process model: the
//! read-modify-write cycle is serialized behind an async mutex.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::events::HistoryEntry;
use crate::domain::services::SyncHistory;

/// Default history file name
const HISTORY_FILE: &str = "sync-history.json";

/// File-backed implementation of [`SyncHistory`]
pub struct JsonHistoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store under `dir/sync-history.json`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(HISTORY_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All persisted entries, oldest first; empty when no file exists yet
    pub async fn load_history(&self) -> Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let entries = serde_json::from_str(&raw)
            .with_context(|| format!("corrupt history file {}", self.path.display()))?;
        Ok(entries)
    }
}

#[async_trait]
impl SyncHistory for JsonHistoryStore {
    async fn persist(&self, entry: &HistoryEntry) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut entries = self.load_history().await?;
        entries.push(entry.clone());

        let raw = serde_json::to_string_pretty(&entries).context("failed to serialize history")?;
        fs::write(&self.path, raw)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))?;

        debug!(
            mode = %entry.mode,
            total = entry.total,
            "persisted sync history entry"
        );
        Ok(())
    }
}
