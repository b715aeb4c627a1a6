//! Durable allow/block lists used when the native contacts store is not.
//!
//! # Storage layout
//!
//! ```text
//! ~/.callerid/callers/
//!   allowedCallers.jsonl   one {"phoneNumber","label"} object per line
//!   blockedCallers.jsonl
//!   allowedCallers.txt     legacy `number|label` lines, read once then removed
//!   blockedCallers.txt
//! ```
//!
//! Storage is best-effort. Read failures come back as [`LoadResult::Empty`]
//! with a reason and write failures as [`SaveOutcome::Failed`]; neither is
//! propagated to the caller.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, StoreError};
use crate::paths;
use crate::payload::{CallerItem, CallerListPayload, CallerListType};
use crate::types::{CallerLookup, CallerRecord, Classification, PhoneNumber};

// ---------------------------------------------------------------------------
// 1. Results
// ---------------------------------------------------------------------------

/// Why a load produced no records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptyReason {
    /// Neither the list file nor a legacy file exists.
    NotFound,
    /// The file exists but could not be read.
    Unreadable(String),
    /// A line could not be decoded. `line` is 1-based.
    Corrupt { line: usize, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadResult {
    Loaded(Vec<CallerRecord>),
    /// Records came from the legacy pipe-delimited file.
    Migrated(Vec<CallerRecord>),
    Empty(EmptyReason),
}

impl LoadResult {
    pub fn records(&self) -> &[CallerRecord] {
        match self {
            LoadResult::Loaded(r) | LoadResult::Migrated(r) => r,
            LoadResult::Empty(_) => &[],
        }
    }

    pub fn into_records(self) -> Vec<CallerRecord> {
        match self {
            LoadResult::Loaded(r) | LoadResult::Migrated(r) => r,
            LoadResult::Empty(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Written { count: usize },
    /// The list was empty, so the backing file was deleted.
    Removed,
    Failed(String),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredLine {
    phone_number: PhoneNumber,
    label: String,
}

// ---------------------------------------------------------------------------
// 2. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.callerid/callers/<stem>.jsonl`
pub fn list_path_at(home: &Path, classification: Classification) -> PathBuf {
    paths::callers_dir(home).join(format!("{}.jsonl", classification.file_stem()))
}

/// `<home>/.callerid/callers/<stem>.txt`
pub fn legacy_list_path_at(home: &Path, classification: Classification) -> PathBuf {
    paths::callers_dir(home).join(format!("{}.txt", classification.file_stem()))
}

// ---------------------------------------------------------------------------
// 3. Load / save / clear
// ---------------------------------------------------------------------------

/// Read one classification's list. Never fails; see [`LoadResult`].
pub fn load_at(home: &Path, classification: Classification) -> LoadResult {
    let path = list_path_at(home, classification);
    if path.exists() {
        return match std::fs::read_to_string(&path) {
            Ok(contents) => parse_jsonl(&contents, classification, &path),
            Err(e) => {
                tracing::warn!("cannot read {}: {}", path.display(), e);
                LoadResult::Empty(EmptyReason::Unreadable(e.to_string()))
            }
        };
    }

    let legacy = legacy_list_path_at(home, classification);
    if legacy.exists() {
        return match std::fs::read_to_string(&legacy) {
            Ok(contents) => {
                let records = parse_legacy(&contents, classification);
                tracing::info!(
                    "migrating {} {} callers from {}",
                    records.len(),
                    classification,
                    legacy.display()
                );
                LoadResult::Migrated(records)
            }
            Err(e) => {
                tracing::warn!("cannot read {}: {}", legacy.display(), e);
                LoadResult::Empty(EmptyReason::Unreadable(e.to_string()))
            }
        };
    }

    LoadResult::Empty(EmptyReason::NotFound)
}

fn parse_jsonl(contents: &str, classification: Classification, path: &Path) -> LoadResult {
    let mut records = Vec::new();
    for (i, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StoredLine>(line) {
            Ok(stored) => records.push(CallerRecord::new(
                stored.phone_number,
                stored.label,
                classification,
            )),
            Err(e) => {
                tracing::warn!("corrupt line {} in {}: {}", i + 1, path.display(), e);
                return LoadResult::Empty(EmptyReason::Corrupt {
                    line: i + 1,
                    message: e.to_string(),
                });
            }
        }
    }
    LoadResult::Loaded(records)
}

// Only the first `|` separates; anything after it belongs to the label.
fn parse_legacy(contents: &str, classification: Classification) -> Vec<CallerRecord> {
    contents
        .lines()
        .filter_map(|line| line.split_once('|'))
        .map(|(number, label)| {
            CallerRecord::new(PhoneNumber::normalize(number), label, classification)
        })
        .filter(|r| r.phone_number.is_valid())
        .collect()
}

/// Persist one classification's list.
///
/// An empty list deletes the backing file. A successful write also deletes
/// the legacy file so it is never read again.
pub fn save_at(home: &Path, classification: Classification, records: &[CallerRecord]) -> SaveOutcome {
    if records.is_empty() {
        clear_at(home, classification);
        return SaveOutcome::Removed;
    }
    match write_jsonl(home, classification, records) {
        Ok(path) => {
            tracing::debug!("wrote {} callers to {}", records.len(), path.display());
            remove_if_exists(&legacy_list_path_at(home, classification));
            SaveOutcome::Written {
                count: records.len(),
            }
        }
        Err(e) => {
            tracing::error!("failed to save {} callers: {}", classification, e);
            SaveOutcome::Failed(e.to_string())
        }
    }
}

// Write flow: serialize → `.jsonl.tmp` sibling → rename.
fn write_jsonl(
    home: &Path,
    classification: Classification,
    records: &[CallerRecord],
) -> Result<PathBuf, StoreError> {
    let dir = paths::callers_dir(home);
    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

    let path = list_path_at(home, classification);
    let tmp = path.with_extension("jsonl.tmp");

    let mut buf = Vec::new();
    for record in records {
        let line = StoredLine {
            phone_number: record.phone_number.clone(),
            label: record.label.clone(),
        };
        serde_json::to_writer(&mut buf, &line)?;
        buf.push(b'\n');
    }

    let mut file = std::fs::File::create(&tmp).map_err(|e| io_err(&tmp, e))?;
    file.write_all(&buf).map_err(|e| io_err(&tmp, e))?;
    file.sync_all().map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

/// Delete the persisted list (and any legacy file) for one classification.
pub fn clear_at(home: &Path, classification: Classification) {
    remove_if_exists(&list_path_at(home, classification));
    remove_if_exists(&legacy_list_path_at(home, classification));
}

fn remove_if_exists(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("cannot remove {}: {}", path.display(), e);
        }
    }
}

// ---------------------------------------------------------------------------
// 4. In-memory store
// ---------------------------------------------------------------------------

/// Summary of one [`CallerListStore::apply_payload`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub allowed: usize,
    pub blocked: usize,
    pub saved: Vec<(Classification, SaveOutcome)>,
}

/// Allow and block lists held in memory and mirrored to disk.
///
/// A phone number lives in at most one list; writing it to one removes it
/// from the other.
#[derive(Debug)]
pub struct CallerListStore {
    home: PathBuf,
    allowed: Vec<CallerRecord>,
    blocked: Vec<CallerRecord>,
}

impl CallerListStore {
    /// Load both lists from `<home>/.callerid/callers/`.
    pub fn open_at(home: &Path) -> Self {
        let allowed = load_at(home, Classification::Allowed).into_records();
        let mut blocked = load_at(home, Classification::Blocked).into_records();
        // A legacy snapshot may list a number in both files; blocked wins.
        let blocked_numbers: HashSet<_> = blocked.iter().map(|r| r.phone_number.clone()).collect();
        let mut allowed: Vec<CallerRecord> = allowed
            .into_iter()
            .filter(|r| !blocked_numbers.contains(&r.phone_number))
            .collect();
        dedup_by_number(&mut allowed);
        dedup_by_number(&mut blocked);
        tracing::debug!("loaded caller lists from {}", home.display());
        Self {
            home: home.to_path_buf(),
            allowed,
            blocked,
        }
    }

    /// `open_at` convenience wrapper.
    pub fn open() -> Result<Self, StoreError> {
        Ok(Self::open_at(&paths::home()?))
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn records(&self, classification: Classification) -> &[CallerRecord] {
        match classification {
            Classification::Allowed => &self.allowed,
            Classification::Blocked => &self.blocked,
        }
    }

    fn list_mut(&mut self, classification: Classification) -> &mut Vec<CallerRecord> {
        match classification {
            Classification::Allowed => &mut self.allowed,
            Classification::Blocked => &mut self.blocked,
        }
    }

    /// Insert or relabel `phone_number` in `classification`. Does not persist.
    pub fn add_or_update(
        &mut self,
        phone_number: PhoneNumber,
        label: &str,
        classification: Classification,
    ) {
        self.list_mut(classification.other())
            .retain(|r| r.phone_number != phone_number);
        let list = self.list_mut(classification);
        match list.iter_mut().find(|r| r.phone_number == phone_number) {
            Some(existing) => existing.label = label.to_owned(),
            None => list.push(CallerRecord::new(phone_number, label, classification)),
        }
    }

    /// Drop `phone_number` from `classification`. Does not persist.
    pub fn remove(&mut self, phone_number: &PhoneNumber, classification: Classification) {
        self.list_mut(classification)
            .retain(|r| &r.phone_number != phone_number);
    }

    /// Write one list to disk.
    pub fn save(&self, classification: Classification) -> SaveOutcome {
        save_at(&self.home, classification, self.records(classification))
    }

    /// Empty one list and delete its backing file.
    pub fn clear(&mut self, classification: Classification) {
        self.list_mut(classification).clear();
        clear_at(&self.home, classification);
    }

    pub fn clear_all(&mut self) {
        for c in Classification::all() {
            self.clear(*c);
        }
    }

    /// Apply a `setCallerList` request and persist whichever lists changed.
    pub fn apply_payload(&mut self, payload: &CallerListPayload) -> ApplyReport {
        tracing::info!(
            "applying {} caller list with {} items",
            payload.list_type.as_str(),
            payload.items.len()
        );

        if payload.list_type == CallerListType::ClearAll {
            self.clear_all();
            return ApplyReport::default();
        }

        let before_allowed = self.allowed.clone();
        let before_blocked = self.blocked.clone();

        match payload.list_type {
            CallerListType::Block => {
                for item in &payload.items {
                    if item.is_removed {
                        self.remove(&item.phonenumber, Classification::Blocked);
                    } else if item.is_blocked {
                        self.add_or_update(item.phonenumber.clone(), &item.label, Classification::Blocked);
                    }
                }
            }
            CallerListType::Unblock => {
                for item in &payload.items {
                    self.remove(&item.phonenumber, Classification::Blocked);
                }
            }
            CallerListType::Identify => {
                for item in &payload.items {
                    if item.is_removed {
                        self.remove(&item.phonenumber, Classification::Allowed);
                    } else {
                        self.add_or_update(item.phonenumber.clone(), &item.label, Classification::Allowed);
                    }
                }
            }
            CallerListType::Default => self.apply_items(&payload.items),
            CallerListType::AllAllowed => {
                self.blocked.clear();
                self.apply_items(&payload.items);
            }
            CallerListType::AllBlocked => {
                self.allowed.clear();
                self.apply_items(&payload.items);
            }
            CallerListType::ClearAll => {}
        }

        let mut saved = Vec::new();
        if !same_set(&before_allowed, &self.allowed) {
            saved.push((Classification::Allowed, self.save(Classification::Allowed)));
        }
        if !same_set(&before_blocked, &self.blocked) {
            saved.push((Classification::Blocked, self.save(Classification::Blocked)));
        }

        ApplyReport {
            allowed: self.allowed.len(),
            blocked: self.blocked.len(),
            saved,
        }
    }

    // (classification, isRemoved) → add or remove in that classification.
    fn apply_items(&mut self, items: &[CallerItem]) {
        for item in items {
            let classification = item.classification();
            if item.is_removed {
                self.remove(&item.phonenumber, classification);
            } else {
                self.add_or_update(item.phonenumber.clone(), &item.label, classification);
            }
        }
    }

    /// Every live record as a `list_type` request, allowed first. Used to
    /// rebuild a directory that lost its entries.
    pub fn snapshot(&self, list_type: CallerListType) -> CallerListPayload {
        let allowed = self.allowed.iter().map(|r| (r, false));
        let blocked = self.blocked.iter().map(|r| (r, true));
        let items = allowed
            .chain(blocked)
            .filter(|(r, _)| r.phone_number.is_valid())
            .map(|(r, is_blocked)| CallerItem::new(r.phone_number.clone(), r.label.clone(), is_blocked))
            .collect();
        CallerListPayload::new(list_type, items)
    }

    /// Who is calling? The raw number is normalized first.
    pub fn lookup(&self, raw_number: &str) -> CallerLookup {
        let number = PhoneNumber::normalize(raw_number);
        if let Some(r) = self.blocked.iter().find(|r| r.phone_number == number) {
            return CallerLookup::Blocked {
                label: r.label.clone(),
            };
        }
        match self.allowed.iter().find(|r| r.phone_number == number) {
            Some(r) => CallerLookup::Identified {
                label: r.label.clone(),
            },
            None => CallerLookup::Unknown,
        }
    }
}

fn same_set(a: &[CallerRecord], b: &[CallerRecord]) -> bool {
    let a: HashSet<_> = a.iter().map(|r| (&r.phone_number, &r.label)).collect();
    let b: HashSet<_> = b.iter().map(|r| (&r.phone_number, &r.label)).collect();
    a == b
}

fn dedup_by_number(records: &mut Vec<CallerRecord>) {
    let mut seen = HashSet::new();
    records.retain(|r| seen.insert(r.phone_number.clone()));
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rec(n: &str, label: &str, c: Classification) -> CallerRecord {
        CallerRecord::new(PhoneNumber::from(n), label, c)
    }

    #[test]
    fn load_missing_reports_not_found() {
        let home = TempDir::new().expect("tempdir");
        assert_eq!(
            load_at(home.path(), Classification::Blocked),
            LoadResult::Empty(EmptyReason::NotFound)
        );
    }

    #[test]
    fn save_then_load_keeps_pipes_in_labels() {
        let home = TempDir::new().expect("tempdir");
        let records = vec![rec("4930", "Acme | Sales", Classification::Allowed)];
        let outcome = save_at(home.path(), Classification::Allowed, &records);
        assert_eq!(outcome, SaveOutcome::Written { count: 1 });
        assert_eq!(load_at(home.path(), Classification::Allowed), LoadResult::Loaded(records));
    }

    #[test]
    fn save_empty_removes_file() {
        let home = TempDir::new().expect("tempdir");
        save_at(home.path(), Classification::Blocked, &[rec("1", "x", Classification::Blocked)]);
        assert!(list_path_at(home.path(), Classification::Blocked).exists());
        assert_eq!(save_at(home.path(), Classification::Blocked, &[]), SaveOutcome::Removed);
        assert!(!list_path_at(home.path(), Classification::Blocked).exists());
    }

    #[test]
    fn corrupt_line_is_reported_with_line_number() {
        let home = TempDir::new().expect("tempdir");
        let path = list_path_at(home.path(), Classification::Allowed);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{\"phoneNumber\":\"1\",\"label\":\"a\"}\nnot json\n").unwrap();
        match load_at(home.path(), Classification::Allowed) {
            LoadResult::Empty(EmptyReason::Corrupt { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn add_moves_number_between_classifications() {
        let home = TempDir::new().expect("tempdir");
        let mut store = CallerListStore::open_at(home.path());
        store.add_or_update(PhoneNumber::from("49"), "Bob", Classification::Allowed);
        store.add_or_update(PhoneNumber::from("49"), "Spam", Classification::Blocked);
        assert!(store.records(Classification::Allowed).is_empty());
        assert_eq!(store.records(Classification::Blocked).len(), 1);
    }

    #[test]
    fn lookup_normalizes_input() {
        let home = TempDir::new().expect("tempdir");
        let mut store = CallerListStore::open_at(home.path());
        store.add_or_update(PhoneNumber::from("4930123"), "Alice", Classification::Allowed);
        assert_eq!(
            store.lookup("+49 30 123"),
            CallerLookup::Identified {
                label: "Alice".into()
            }
        );
        assert_eq!(store.lookup("999"), CallerLookup::Unknown);
    }
}
