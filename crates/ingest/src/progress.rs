//! Record of source files whose events have been fully archived.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// JSON array of file names (relative to the log directory) on disk.
///
/// `save` rewrites the whole record, so callers pass the complete set once
/// per run.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    path: PathBuf,
}

impl ProgressTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Completed file names. Missing, unreadable or corrupt records yield an
    /// empty set so the run reprocesses instead of aborting.
    pub fn load(&self) -> BTreeSet<String> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No progress record yet");
            return BTreeSet::new();
        }
        match self.try_load() {
            Ok(files) => files,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Parsed tracker corrupted or unreadable, starting fresh"
                );
                BTreeSet::new()
            }
        }
    }

    fn try_load(&self) -> Result<BTreeSet<String>, ProgressError> {
        let json = std::fs::read_to_string(&self.path)?;
        let files: Option<Vec<String>> = serde_json::from_str(&json)?;
        Ok(files.unwrap_or_default().into_iter().collect())
    }

    /// Overwrite the record with `files`.
    pub fn save(&self, files: &BTreeSet<String>) -> Result<(), ProgressError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(files)?;
        std::fs::write(&self.path, json)?;
        debug!(path = %self.path.display(), files = files.len(), "Saved progress record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_missing_record_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let tracker = ProgressTracker::new(tmp.path().join("parsed_files.json"));
        assert!(tracker.load().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let tracker = ProgressTracker::new(tmp.path().join("state").join("parsed_files.json"));

        tracker.save(&set(&["b.log", "a.log"])).unwrap();
        assert_eq!(tracker.load(), set(&["a.log", "b.log"]));

        let on_disk: Vec<String> =
            serde_json::from_str(&std::fs::read_to_string(tracker.path()).unwrap()).unwrap();
        assert_eq!(on_disk, vec!["a.log", "b.log"]);
    }

    #[test]
    fn test_save_overwrites_rather_than_appends() {
        let tmp = tempfile::tempdir().unwrap();
        let tracker = ProgressTracker::new(tmp.path().join("parsed_files.json"));

        tracker.save(&set(&["a.log", "b.log"])).unwrap();
        tracker.save(&set(&["c.log"])).unwrap();
        assert_eq!(tracker.load(), set(&["c.log"]));
    }

    #[test]
    fn test_corrupt_record_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("parsed_files.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(ProgressTracker::new(&path).load().is_empty());

        std::fs::write(&path, r#"{"a.log": true}"#).unwrap();
        assert!(ProgressTracker::new(&path).load().is_empty());
    }

    #[test]
    fn test_null_record_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("parsed_files.json");
        std::fs::write(&path, "null").unwrap();
        assert!(ProgressTracker::new(&path).load().is_empty());
    }

    #[test]
    fn test_save_fails_when_parent_is_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let tracker = ProgressTracker::new(blocker.join("parsed_files.json"));
        assert!(matches!(tracker.save(&set(&["a.log"])), Err(ProgressError::Io(_))));
    }
}
