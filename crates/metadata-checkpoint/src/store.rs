//! Checkpoint persistence for resumable runs.
//!
//! The checkpoint file is owned by a single orchestrator for the duration of a run.
//! Nothing enforces this: two processes pointed at the same log directory will
//! overwrite each other's progress.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use metadata_batch_types::{Address, Tallies};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::paths::{atomic_write_json, checkpoint_path, read_json, temp_path};

/// Durable progress marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Always `tallies.processed - 1`; -1 before anything was processed.
    pub last_index: i64,
    /// Ids whose outcome had been written to the outcome log when this was saved.
    pub processed_ids: BTreeSet<Address>,
    pub tallies: Tallies,
    /// Written by a dry run; its outcomes were only simulated.
    #[serde(default)]
    pub dry_run: bool,
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(tallies: Tallies, processed_ids: BTreeSet<Address>, dry_run: bool) -> Self {
        Self {
            last_index: tallies.processed as i64 - 1,
            processed_ids,
            tallies,
            dry_run,
            timestamp: Utc::now(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.last_index != self.tallies.processed as i64 - 1 {
            return Err(anyhow!(
                "checkpoint is inconsistent: last_index {} does not match {} processed records",
                self.last_index,
                self.tallies.processed
            ));
        }
        let counted = self.tallies.updated + self.tallies.skipped + self.tallies.failed;
        if counted != self.tallies.processed {
            return Err(anyhow!(
                "checkpoint is inconsistent: outcome counts add up to {} but processed is {}",
                counted,
                self.tallies.processed
            ));
        }
        Ok(())
    }
}

/// Save/load/delete of `<log-dir>/checkpoint.json`.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Store using the conventional file name inside `log_dir`.
    pub fn new<P: AsRef<Path>>(log_dir: P) -> Self {
        Self::at(checkpoint_path(log_dir.as_ref()))
    }

    /// Store at an explicit file path.
    pub fn at<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Replace the checkpoint file with `checkpoint`.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        atomic_write_json(&self.path, checkpoint)?;
        debug!(
            path = %self.path.display(),
            processed = checkpoint.tallies.processed,
            "checkpoint saved"
        );
        Ok(())
    }

    /// Load the last completed checkpoint, if any.
    ///
    /// A leftover staging file means a save was interrupted; the previous checkpoint
    /// (if present) is still intact and is what gets returned.
    pub fn load(&self) -> Result<Option<Checkpoint>> {
        let staged = temp_path(&self.path);
        if staged.exists() {
            warn!(
                path = %staged.display(),
                "discarding partially written checkpoint"
            );
            std::fs::remove_file(&staged)
                .map_err(|e| anyhow!("Failed to remove {}: {}", staged.display(), e))?;
        }

        let Some(checkpoint) = read_json::<Checkpoint>(&self.path)? else {
            return Ok(None);
        };
        checkpoint.validate()?;
        Ok(Some(checkpoint))
    }

    /// Remove the checkpoint file. Returns whether a file was removed.
    pub fn delete(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.path)
            .map_err(|e| anyhow!("Failed to delete checkpoint {}: {}", self.path.display(), e))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(processed: u64) -> Checkpoint {
        let ids = (0..processed)
            .map(|i| Address::new([i as u8 + 1; 32]))
            .collect();
        Checkpoint::new(
            Tallies {
                processed,
                updated: processed,
                skipped: 0,
                failed: 0,
            },
            ids,
            false,
        )
    }

    #[test]
    fn test_save_load_delete() -> Result<()> {
        let dir = TempDir::new()?;
        let store = CheckpointStore::new(dir.path());
        assert!(store.load()?.is_none());

        let checkpoint = sample(3);
        assert_eq!(checkpoint.last_index, 2);
        store.save(&checkpoint)?;
        assert_eq!(store.load()?, Some(checkpoint));

        assert!(store.delete()?);
        assert!(!store.delete()?);
        assert!(store.load()?.is_none());
        Ok(())
    }

    #[test]
    fn test_dry_run_flag_defaults_to_false() -> Result<()> {
        let dir = TempDir::new()?;
        let store = CheckpointStore::new(dir.path());
        std::fs::write(
            store.path(),
            br#"{"last_index": -1, "processed_ids": [], "tallies": {"processed": 0, "updated": 0, "skipped": 0, "failed": 0}, "timestamp": "2024-05-01T00:00:00Z"}"#,
        )?;
        assert!(!store.load()?.unwrap().dry_run);
        Ok(())
    }

    #[test]
    fn test_empty_checkpoint_has_negative_index() {
        assert_eq!(sample(0).last_index, -1);
    }

    #[test]
    fn test_interrupted_save_keeps_previous_checkpoint() -> Result<()> {
        let dir = TempDir::new()?;
        let store = CheckpointStore::new(dir.path());
        let checkpoint = sample(2);
        store.save(&checkpoint)?;

        std::fs::write(temp_path(store.path()), b"{\"last_index\": 9, \"proc")?;

        assert_eq!(store.load()?, Some(checkpoint));
        assert!(!temp_path(store.path()).exists());
        Ok(())
    }

    #[test]
    fn test_rejects_inconsistent_checkpoint() -> Result<()> {
        let dir = TempDir::new()?;
        let store = CheckpointStore::new(dir.path());
        let mut checkpoint = sample(2);
        checkpoint.last_index = 7;
        atomic_write_json(store.path(), &checkpoint)?;

        let err = store.load().unwrap_err();
        assert!(err.to_string().contains("inconsistent"));
        Ok(())
    }
}
