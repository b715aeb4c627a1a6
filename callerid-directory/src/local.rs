//! In-process call directory host, optionally mirrored to a JSON file.
//!
//! Enforces the host rules a directory request is judged by: additions in
//! strictly increasing order per kind, no number twice in one request, no
//! removals while rebuilding, and an entry ceiling. A rejected request is
//! discarded whole.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::context::DirectoryContext;
use crate::error::{io_err, DirectoryError, DirectoryRejection};

pub const DEFAULT_MAX_ENTRIES: usize = 2_000_000;

/// Committed directory contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntries {
    pub blocking: BTreeSet<u64>,
    pub identification: BTreeMap<u64, String>,
    /// Set once a request has completed; later requests are incremental.
    #[serde(default)]
    pub populated: bool,
}

impl DirectoryEntries {
    pub fn len(&self) -> usize {
        self.blocking.len() + self.identification.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocking.is_empty() && self.identification.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum EntryOp {
    AddBlocking(u64),
    RemoveBlocking(u64),
    AddIdentification(u64, String),
    RemoveIdentification(u64),
    RemoveAllBlocking,
    RemoveAllIdentification,
}

#[derive(Debug)]
pub struct LocalDirectory {
    committed: DirectoryEntries,
    pending: Vec<EntryOp>,
    path: Option<PathBuf>,
    max_entries: usize,
    enabled: bool,
    reject_next: Option<DirectoryRejection>,
    completed: usize,
}

impl Default for LocalDirectory {
    fn default() -> Self {
        Self {
            committed: DirectoryEntries::default(),
            pending: Vec::new(),
            path: None,
            max_entries: DEFAULT_MAX_ENTRIES,
            enabled: true,
            reject_next: None,
            completed: 0,
        }
    }
}

impl LocalDirectory {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open (or start) a directory persisted at `path`.
    pub fn open_at(path: &Path) -> Result<Self, DirectoryError> {
        let committed = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
            serde_json::from_str(&contents)?
        } else {
            DirectoryEntries::default()
        };
        Ok(Self {
            committed,
            path: Some(path.to_path_buf()),
            ..Self::default()
        })
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// A disabled extension rejects every request.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Make the next completion fail with `rejection`.
    pub fn reject_next(&mut self, rejection: DirectoryRejection) {
        self.reject_next = Some(rejection);
    }

    /// Forget that the directory was populated; the next request is a full rebuild.
    pub fn require_full_rebuild(&mut self) {
        self.committed.populated = false;
    }

    pub fn entries(&self) -> &DirectoryEntries {
        &self.committed
    }

    pub fn is_blocking(&self, number: u64) -> bool {
        self.committed.blocking.contains(&number)
    }

    pub fn label(&self, number: u64) -> Option<&str> {
        self.committed.identification.get(&number).map(String::as_str)
    }

    /// Successful completions so far.
    pub fn completed_requests(&self) -> usize {
        self.completed
    }

    fn evaluate(&self) -> Result<DirectoryEntries, DirectoryRejection> {
        if !self.enabled {
            return Err(DirectoryRejection::ExtensionDisabled);
        }
        let incremental = self.committed.populated;
        let mut next = if incremental {
            self.committed.clone()
        } else {
            DirectoryEntries::default()
        };

        let mut last_blocking = None;
        let mut last_identification = None;
        for op in &self.pending {
            match op {
                EntryOp::AddBlocking(n) => {
                    check_sequence(&mut last_blocking, *n)?;
                    next.blocking.insert(*n);
                }
                EntryOp::AddIdentification(n, label) => {
                    check_sequence(&mut last_identification, *n)?;
                    next.identification.insert(*n, label.clone());
                }
                EntryOp::RemoveBlocking(n) => {
                    if !incremental {
                        return Err(DirectoryRejection::UnexpectedIncrementalRemoval);
                    }
                    next.blocking.remove(n);
                }
                EntryOp::RemoveIdentification(n) => {
                    if !incremental {
                        return Err(DirectoryRejection::UnexpectedIncrementalRemoval);
                    }
                    next.identification.remove(n);
                }
                EntryOp::RemoveAllBlocking => next.blocking.clear(),
                EntryOp::RemoveAllIdentification => next.identification.clear(),
            }
        }

        if next.len() > self.max_entries {
            return Err(DirectoryRejection::MaximumEntriesExceeded);
        }
        next.populated = true;
        Ok(next)
    }

    // Write flow: serialize → `.json.tmp` sibling → rename.
    fn persist(&self, entries: &DirectoryEntries) -> Result<(), DirectoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        let json = serde_json::to_string(entries)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
        Ok(())
    }
}

fn check_sequence(last: &mut Option<u64>, number: u64) -> Result<(), DirectoryRejection> {
    match *last {
        Some(prev) if number == prev => Err(DirectoryRejection::DuplicateEntries),
        Some(prev) if number < prev => Err(DirectoryRejection::EntriesOutOfOrder),
        _ => {
            *last = Some(number);
            Ok(())
        }
    }
}

impl DirectoryContext for LocalDirectory {
    fn is_incremental(&self) -> bool {
        self.committed.populated
    }

    fn add_blocking_entry(&mut self, number: u64) {
        self.pending.push(EntryOp::AddBlocking(number));
    }

    fn remove_blocking_entry(&mut self, number: u64) {
        self.pending.push(EntryOp::RemoveBlocking(number));
    }

    fn add_identification_entry(&mut self, number: u64, label: &str) {
        self.pending
            .push(EntryOp::AddIdentification(number, label.to_string()));
    }

    fn remove_identification_entry(&mut self, number: u64) {
        self.pending.push(EntryOp::RemoveIdentification(number));
    }

    fn remove_all_blocking_entries(&mut self) {
        self.pending.push(EntryOp::RemoveAllBlocking);
    }

    fn remove_all_identification_entries(&mut self) {
        self.pending.push(EntryOp::RemoveAllIdentification);
    }

    fn complete_request(&mut self) -> Result<(), DirectoryRejection> {
        let result = match self.reject_next.take() {
            Some(rejection) => Err(rejection),
            None => self.evaluate(),
        };
        let ops = std::mem::take(&mut self.pending).len();

        let next = result?;
        if let Err(e) = self.persist(&next) {
            tracing::error!("failed to persist directory: {}", e);
            return Err(DirectoryRejection::LoadingInterrupted);
        }
        tracing::debug!(
            "directory committed {} ops: {} blocking, {} identification",
            ops,
            next.blocking.len(),
            next.identification.len()
        );
        self.committed = next;
        self.completed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn first_request_is_full_then_incremental() {
        let mut dir = LocalDirectory::in_memory();
        assert!(!dir.is_incremental());
        dir.add_blocking_entry(5);
        dir.complete_request().unwrap();
        assert!(dir.is_incremental());
        assert!(dir.is_blocking(5));
    }

    #[rstest]
    #[case(&[3, 2], DirectoryRejection::EntriesOutOfOrder)]
    #[case(&[3, 3], DirectoryRejection::DuplicateEntries)]
    fn additions_must_ascend(#[case] numbers: &[u64], #[case] expected: DirectoryRejection) {
        let mut dir = LocalDirectory::in_memory();
        for n in numbers {
            dir.add_identification_entry(*n, "x");
        }
        assert_eq!(dir.complete_request(), Err(expected));
        assert!(dir.entries().is_empty());
        assert!(!dir.is_incremental());
    }

    #[test]
    fn removal_during_rebuild_is_rejected() {
        let mut dir = LocalDirectory::in_memory();
        dir.remove_blocking_entry(1);
        assert_eq!(
            dir.complete_request(),
            Err(DirectoryRejection::UnexpectedIncrementalRemoval)
        );
    }

    #[test]
    fn ceiling_is_enforced() {
        let mut dir = LocalDirectory::in_memory().with_max_entries(2);
        for n in 1..=3 {
            dir.add_blocking_entry(n);
        }
        assert_eq!(
            dir.complete_request(),
            Err(DirectoryRejection::MaximumEntriesExceeded)
        );
    }

    #[test]
    fn disabled_directory_rejects() {
        let mut dir = LocalDirectory::in_memory();
        dir.set_enabled(false);
        assert_eq!(dir.complete_request(), Err(DirectoryRejection::ExtensionDisabled));
    }

    #[test]
    fn rejected_request_keeps_previous_entries() {
        let mut dir = LocalDirectory::in_memory();
        dir.add_identification_entry(7, "Bob");
        dir.complete_request().unwrap();

        dir.add_identification_entry(9, "Eve");
        dir.reject_next(DirectoryRejection::Unknown);
        assert!(dir.complete_request().is_err());
        assert_eq!(dir.label(7), Some("Bob"));
        assert_eq!(dir.label(9), None);
        assert_eq!(dir.completed_requests(), 1);
    }

    #[test]
    fn persisted_entries_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("directory.json");
        let mut dir = LocalDirectory::open_at(&path).unwrap();
        dir.add_blocking_entry(11);
        dir.add_identification_entry(12, "Ann");
        dir.complete_request().unwrap();

        let reopened = LocalDirectory::open_at(&path).unwrap();
        assert!(reopened.is_incremental());
        assert!(reopened.is_blocking(11));
        assert_eq!(reopened.label(12), Some("Ann"));
        assert!(!path.with_extension("json.tmp").exists());
    }
}
