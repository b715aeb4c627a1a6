//! Sync state: when contacts were last synced and what that run did.
//!
//! Persists a [`SyncStateFile`] JSON document at
//! `<home>/.callerid/sync_state.json` using the atomic `.tmp` + rename
//! pattern.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use callerid_core::{paths, GroupId};

use crate::engine::SyncReport;
use crate::error::{io_err, SyncError};

/// Counts of the last completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub inserted: usize,
    pub updated: usize,
    pub unblocked: usize,
    pub deleted: usize,
    pub failed_batches: usize,
    pub vacation_mode_active: bool,
}

impl RunSummary {
    pub fn from_report(report: &SyncReport, vacation_mode_active: bool) -> Self {
        Self {
            inserted: report.inserted.applied,
            updated: report.updated.applied,
            unblocked: report.unblocked.applied,
            deleted: report.deleted.applied,
            failed_batches: report.failed_batches(),
            vacation_mode_active,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStateFile {
    pub synced_at: Option<DateTime<Utc>>,
    /// Cached namespace group id.
    pub group_id: Option<GroupId>,
    pub last_run: Option<RunSummary>,
}

/// Load sync state. A missing file is an empty state, not an error.
pub fn load_at(home: &Path) -> Result<SyncStateFile, SyncError> {
    let path = paths::sync_state_path(home);
    if !path.exists() {
        return Ok(SyncStateFile::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(serde_json::from_str(&contents)?)
}

/// Save sync state atomically: `<path>.tmp`, then rename.
pub fn save_at(home: &Path, state: &SyncStateFile) -> Result<(), SyncError> {
    let path = paths::sync_state_path(home);
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid sync state path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// Record a finished run.
pub fn record_run_at(
    home: &Path,
    group: GroupId,
    report: &SyncReport,
    vacation_mode_active: bool,
) -> Result<SyncStateFile, SyncError> {
    let mut state = load_at(home).unwrap_or_else(|e| {
        tracing::warn!("discarding unreadable sync state: {}", e);
        SyncStateFile::default()
    });
    state.synced_at = Some(Utc::now());
    state.group_id = Some(group);
    state.last_run = Some(RunSummary::from_report(report, vacation_mode_active));
    save_at(home, &state)?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_state_when_file_missing() {
        let tmp = TempDir::new().unwrap();
        let state = load_at(tmp.path()).unwrap();
        assert!(state.synced_at.is_none());
        assert!(state.last_run.is_none());
    }

    #[test]
    fn record_run_then_load() {
        let tmp = TempDir::new().unwrap();
        let mut report = SyncReport::default();
        report.inserted.applied = 3;
        report.deleted.failed_batches = 1;

        let before = Utc::now();
        record_run_at(tmp.path(), GroupId(9), &report, true).unwrap();
        let loaded = load_at(tmp.path()).unwrap();

        assert_eq!(loaded.group_id, Some(GroupId(9)));
        let run = loaded.last_run.expect("last run");
        assert_eq!(run.inserted, 3);
        assert_eq!(run.failed_batches, 1);
        assert!(run.vacation_mode_active);
        assert!(loaded.synced_at.unwrap() >= before);
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let tmp = TempDir::new().unwrap();
        save_at(tmp.path(), &SyncStateFile::default()).unwrap();
        let tmp_path = paths::sync_state_path(tmp.path()).with_extension("json.tmp");
        assert!(!tmp_path.exists(), "tmp file should be removed after atomic rename");
    }

    #[test]
    fn corrupt_state_is_a_json_error() {
        let tmp = TempDir::new().unwrap();
        let path = paths::sync_state_path(tmp.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_at(tmp.path()), Err(SyncError::Json(_))));
    }
}
