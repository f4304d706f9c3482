//! File layout of a run's log directory and whole-file replace writes.
//!
//! ```text
//! <log-dir>/
//!   checkpoint.json   progress marker (deleted after a clean run)
//!   update_log.json   every outcome, in processing order
//!   summary.json      run summary
//!   failed_ids.json   ids to re-run (only written when something failed)
//! ```

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

pub fn checkpoint_path(log_dir: &Path) -> PathBuf {
    log_dir.join("checkpoint.json")
}

pub fn update_log_path(log_dir: &Path) -> PathBuf {
    log_dir.join("update_log.json")
}

pub fn summary_path(log_dir: &Path) -> PathBuf {
    log_dir.join("summary.json")
}

pub fn failed_ids_path(log_dir: &Path) -> PathBuf {
    log_dir.join("failed_ids.json")
}

/// Sibling path a file is staged at before being renamed into place.
pub fn temp_path(path: &Path) -> PathBuf {
    path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|s| s.to_str()).unwrap_or("tmp")
    ))
}

/// Ensure all parent directories exist for a path.
pub fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if parent.as_os_str().is_empty() {
            return Ok(());
        }
        std::fs::create_dir_all(parent)
            .map_err(|e| anyhow!("Failed to create directory {}: {}", parent.display(), e))?;
    }
    Ok(())
}

/// Write a file atomically (write to .tmp, then rename).
///
/// A reader sees either the previous contents or the new contents, never a mix.
/// A crash between the two steps leaves a stray `.tmp` file behind.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent_dirs(path)?;
    let tmp_path = temp_path(path);
    std::fs::write(&tmp_path, contents)
        .map_err(|e| anyhow!("Failed to write temp file {}: {}", tmp_path.display(), e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        anyhow!(
            "Failed to rename {} to {}: {}",
            tmp_path.display(),
            path.display(),
            e
        )
    })?;
    Ok(())
}

/// Write a JSON file atomically (pretty printed, these files are read by operators).
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| anyhow!("Failed to serialize JSON for {}: {}", path.display(), e))?;
    atomic_write(path, &json)
}

/// Read and parse a JSON file, returning `None` if it does not exist.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let json = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;
    let value = serde_json::from_str(&json)
        .map_err(|e| anyhow!("Failed to parse {}: {}", path.display(), e))?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_temp_path_keeps_extension() {
        let path = Path::new("/logs/checkpoint.json");
        assert_eq!(temp_path(path), PathBuf::from("/logs/checkpoint.json.tmp"));
    }

    #[test]
    fn test_atomic_write_replaces_whole_file() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("nested").join("state.json");

        atomic_write_json(&path, &vec![1, 2, 3])?;
        atomic_write_json(&path, &vec![4])?;

        let back: Option<Vec<u32>> = read_json(&path)?;
        assert_eq!(back, Some(vec![4]));
        assert!(!temp_path(&path).exists());
        Ok(())
    }

    #[test]
    fn test_read_json_missing_file() -> Result<()> {
        let dir = TempDir::new()?;
        let back: Option<Vec<u32>> = read_json(&dir.path().join("absent.json"))?;
        assert!(back.is_none());
        Ok(())
    }
}
