//! State file persistence.
//!
//! A single small JSON document backs crash recovery. Writes go through a
//! sibling temp file and an atomic rename so a crash mid-write cannot leave
//! a truncated document behind. A malformed file is backed up and treated as
//! fresh state rather than crashing the process.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::SchedulingConfig;
use crate::error::{GraphbotError, Result};
use crate::scheduler::state::ScheduleState;

const STATE_VERSION: &str = "1.0";

/// On-disk envelope around the schedule state.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedDocument {
    state: ScheduleState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    config: Option<SchedulingConfig>,
    #[serde(default = "default_version")]
    version: String,
    #[serde(default = "Local::now")]
    saved_at: DateTime<Local>,
}

fn default_version() -> String {
    STATE_VERSION.to_string()
}

/// Load/save handle for the schedule state file.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load persisted state, returning fresh state when the file is missing
    /// or unreadable. A corrupt file is renamed aside for inspection.
    pub fn load(&self) -> (ScheduleState, Option<SchedulingConfig>) {
        if !self.path.exists() {
            debug!("No state file at {}, starting fresh", self.path.display());
            return (ScheduleState::new(), None);
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read state file {}: {}", self.path.display(), e);
                return (ScheduleState::new(), None);
            }
        };

        match serde_json::from_str::<PersistedDocument>(&content) {
            Ok(doc) => {
                if doc.version != STATE_VERSION {
                    warn!("State file version {} may not be compatible with {}", doc.version, STATE_VERSION);
                }
                info!(
                    "Loaded state from {} (last_update={:?}, next_update={:?})",
                    self.path.display(),
                    doc.state.last_update,
                    doc.state.next_update
                );
                (doc.state, doc.config)
            }
            Err(e) => {
                warn!("State file {} is corrupt ({}), starting fresh", self.path.display(), e);
                self.backup_corrupt_file();
                (ScheduleState::new(), None)
            }
        }
    }

    /// Persist state atomically: write a sibling temp file, then rename over
    /// the target.
    pub fn save(&self, state: &ScheduleState, config: Option<&SchedulingConfig>) -> Result<()> {
        let doc = PersistedDocument {
            state: state.clone(),
            config: config.cloned(),
            version: STATE_VERSION.to_string(),
            saved_at: Local::now(),
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.tmp_path();
        let json = serde_json::to_string_pretty(&doc)?;
        fs::write(&tmp_path, json).map_err(|e| {
            GraphbotError::StateStore(format!("failed to write {}: {}", tmp_path.display(), e))
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            GraphbotError::StateStore(format!("failed to replace {}: {}", self.path.display(), e))
        })?;

        debug!("State saved to {}", self.path.display());
        Ok(())
    }

    /// Delete the state file. Operators do this to force a recalculation
    /// from scratch; the scheduler itself never calls it.
    pub fn delete(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            info!("State file deleted: {}", self.path.display());
        }
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let name = self.path.file_name().and_then(|n| n.to_str()).unwrap_or("state");
        self.path.with_file_name(format!(".{name}.tmp"))
    }

    fn backup_corrupt_file(&self) {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let backup = self.path.with_extension(format!("corrupted.{stamp}.json"));
        match fs::rename(&self.path, &backup) {
            Ok(()) => info!("Corrupt state file backed up to {}", backup.display()),
            Err(e) => warn!("Failed to back up corrupt state file: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> StateStore {
        StateStore::new(dir.path().join("scheduler_state.json"))
    }

    #[test]
    fn test_missing_file_is_fresh_state() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let (state, config) = store.load();
        assert_eq!(state, ScheduleState::new());
        assert!(config.is_none());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut state = ScheduleState::new();
        state.record_update(Local.with_ymd_and_hms(2024, 1, 5, 3, 0, 0).unwrap());
        state.set_next_update(Local.with_ymd_and_hms(2024, 1, 12, 3, 0, 0).unwrap());
        state.is_running = true;

        let config = SchedulingConfig {
            update_days: 7,
            fixed_update_time: "03:00".to_string(),
        };

        store.save(&state, Some(&config)).unwrap();
        assert!(store.exists());

        let (loaded, loaded_config) = store.load();
        assert_eq!(loaded, state);
        assert_eq!(loaded_config, Some(config));
    }

    #[test]
    fn test_corrupt_file_is_backed_up_and_fresh() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "{ not json").unwrap();

        let (state, config) = store.load();
        assert_eq!(state, ScheduleState::new());
        assert!(config.is_none());
        // Original file was moved aside, not deleted.
        assert!(!store.exists());
        let backups: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("corrupted"))
            .collect();
        assert_eq!(backups.len(), 1);
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("nested").join("deep").join("state.json"));
        store.save(&ScheduleState::new(), None).unwrap();
        assert!(store.exists());
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&ScheduleState::new(), None).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_delete_removes_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&ScheduleState::new(), None).unwrap();
        store.delete().unwrap();
        assert!(!store.exists());
        // Deleting again is a no-op.
        store.delete().unwrap();
    }

    #[test]
    fn test_load_tolerates_absent_config_section() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), r#"{ "state": { "is_running": false } }"#).unwrap();
        let (state, config) = store.load();
        assert_eq!(state, ScheduleState::new());
        assert!(config.is_none());
    }
}
