//! In-process contacts store, optionally mirrored to a JSON file.
//!
//! Used by the daemon and CLI when no device store is attached, and by tests.
//! Batches are validated against a working copy and only swapped in when
//! every op succeeded, so a failed batch leaves no trace.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use callerid_core::{GroupId, RawContactId, SourceId};

use crate::error::{store_io_err, ContactStoreError};
use crate::ops::{AccountTag, BatchOutcome, ContactOp, DataRow, OpBatch, RawContactTarget};
use crate::sink::{ContactStore, ExistingContact};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRawContact {
    pub id: RawContactId,
    pub source_id: SourceId,
    pub account: AccountTag,
    pub send_to_voicemail: bool,
    #[serde(default)]
    pub data: Vec<DataRow>,
}

impl StoredRawContact {
    pub fn in_group(&self, group: GroupId) -> bool {
        self.data
            .iter()
            .any(|row| matches!(row, DataRow::GroupMembership { group: g, .. } if *g == group))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredGroup {
    pub id: GroupId,
    pub title: String,
    pub account: AccountTag,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreFile {
    next_id: i64,
    groups: Vec<StoredGroup>,
    contacts: Vec<StoredRawContact>,
}

#[derive(Debug, Clone)]
struct State {
    next_id: i64,
    groups: Vec<StoredGroup>,
    contacts: BTreeMap<RawContactId, StoredRawContact>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            next_id: 1,
            groups: Vec::new(),
            contacts: BTreeMap::new(),
        }
    }
}

impl State {
    fn allocate(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn contact_mut(&mut self, id: RawContactId) -> Result<&mut StoredRawContact, ContactStoreError> {
        self.contacts
            .get_mut(&id)
            .ok_or(ContactStoreError::UnknownRawContact(id))
    }

    fn to_file(&self) -> StoreFile {
        StoreFile {
            next_id: self.next_id,
            groups: self.groups.clone(),
            contacts: self.contacts.values().cloned().collect(),
        }
    }

    fn from_file(file: StoreFile) -> Self {
        Self {
            next_id: file.next_id,
            groups: file.groups,
            contacts: file.contacts.into_iter().map(|c| (c.id, c)).collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct LocalContactStore {
    state: State,
    path: Option<PathBuf>,
    attempted: Vec<OpBatch>,
    failing: HashSet<usize>,
}

impl LocalContactStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open (or start) a store persisted at `path`. Every commit rewrites it.
    pub fn open_at(path: &Path) -> Result<Self, ContactStoreError> {
        let state = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|e| store_io_err(path, e))?;
            State::from_file(serde_json::from_str(&contents)?)
        } else {
            State::default()
        };
        tracing::debug!(
            "opened contact store {} ({} raw contacts)",
            path.display(),
            state.contacts.len()
        );
        Ok(Self {
            state,
            path: Some(path.to_path_buf()),
            ..Self::default()
        })
    }

    /// Make the `n`th `apply_batch` call (0-based) fail with a rejection.
    pub fn fail_batch(&mut self, n: usize) {
        self.failing.insert(n);
    }

    /// Every batch passed to `apply_batch`, including rejected ones.
    pub fn attempted_batches(&self) -> &[OpBatch] {
        &self.attempted
    }

    pub fn clear_batch_log(&mut self) {
        self.attempted.clear();
    }

    pub fn len(&self) -> usize {
        self.state.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.contacts.is_empty()
    }

    pub fn get(&self, id: RawContactId) -> Option<&StoredRawContact> {
        self.state.contacts.get(&id)
    }

    pub fn find_by_source_id(&self, source_id: &SourceId) -> Option<&StoredRawContact> {
        self.state
            .contacts
            .values()
            .find(|c| &c.source_id == source_id)
    }

    pub fn contacts(&self) -> impl Iterator<Item = &StoredRawContact> {
        self.state.contacts.values()
    }

    pub fn groups(&self) -> &[StoredGroup] {
        &self.state.groups
    }

    // Write flow: serialize → `.json.tmp` sibling → rename.
    fn persist(&self, state: &State) -> Result<(), ContactStoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| store_io_err(dir, e))?;
        }
        let json = serde_json::to_string(&state.to_file())?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| store_io_err(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| store_io_err(path, e))?;
        Ok(())
    }

    fn commit(&mut self, next: State) -> Result<(), ContactStoreError> {
        self.persist(&next)?;
        self.state = next;
        Ok(())
    }
}

fn apply_op(
    state: &mut State,
    op: &ContactOp,
    index: usize,
    pending: &mut HashMap<usize, RawContactId>,
    outcome: &mut BatchOutcome,
) -> Result<(), ContactStoreError> {
    match op {
        ContactOp::InsertRawContact(new) => {
            let id = RawContactId(state.allocate());
            state.contacts.insert(
                id,
                StoredRawContact {
                    id,
                    source_id: new.source_id.clone(),
                    account: new.account.clone(),
                    send_to_voicemail: new.send_to_voicemail,
                    data: Vec::new(),
                },
            );
            pending.insert(index, id);
            outcome.inserted.push((new.source_id.clone(), id));
        }
        ContactOp::InsertData { raw_contact, row } => {
            let id = match raw_contact {
                RawContactTarget::Existing(id) => *id,
                RawContactTarget::Pending(p) => *pending
                    .get(&p.index())
                    .ok_or(ContactStoreError::UnresolvedReference(*p))?,
            };
            state.contact_mut(id)?.data.push(row.clone());
        }
        ContactOp::UpdateVoicemail {
            raw_contact,
            send_to_voicemail,
        } => {
            state.contact_mut(*raw_contact)?.send_to_voicemail = *send_to_voicemail;
        }
        ContactOp::DeleteRawContact { raw_contact } => {
            // Deleting a missing row matches zero rows; not an error.
            state.contacts.remove(raw_contact);
        }
        ContactOp::ReplacePhoto { raw_contact, photo } => {
            let contact = state.contact_mut(*raw_contact)?;
            contact.data.retain(|row| !matches!(row, DataRow::Photo { .. }));
            contact.data.push(DataRow::Photo { photo: *photo });
        }
    }
    Ok(())
}

impl ContactStore for LocalContactStore {
    fn find_group(&self, title: &str) -> Result<Option<GroupId>, ContactStoreError> {
        Ok(self
            .state
            .groups
            .iter()
            .find(|g| !g.deleted && g.title == title)
            .map(|g| g.id))
    }

    fn create_group(
        &mut self,
        title: &str,
        account: &AccountTag,
    ) -> Result<GroupId, ContactStoreError> {
        let mut next = self.state.clone();
        let id = GroupId(next.allocate());
        next.groups.push(StoredGroup {
            id,
            title: title.to_owned(),
            account: account.clone(),
            deleted: false,
        });
        self.commit(next)?;
        Ok(id)
    }

    fn group_members(
        &self,
        group: GroupId,
    ) -> Result<HashMap<SourceId, ExistingContact>, ContactStoreError> {
        Ok(self
            .state
            .contacts
            .values()
            .filter(|c| c.in_group(group) && !c.source_id.0.trim().is_empty())
            .map(|c| {
                let existing = ExistingContact {
                    id: c.id,
                    send_to_voicemail: c.send_to_voicemail,
                };
                (c.source_id.clone(), existing)
            })
            .collect())
    }

    fn apply_batch(&mut self, batch: &OpBatch) -> Result<BatchOutcome, ContactStoreError> {
        let call = self.attempted.len();
        self.attempted.push(batch.clone());
        if self.failing.contains(&call) {
            return Err(ContactStoreError::Rejected {
                reason: format!("injected failure for batch {call}"),
            });
        }

        let mut next = self.state.clone();
        let mut pending = HashMap::new();
        let mut outcome = BatchOutcome::default();
        for (index, op) in batch.ops().iter().enumerate() {
            apply_op(&mut next, op, index, &mut pending, &mut outcome)?;
        }
        self.commit(next)?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{NewRawContact, PhotoKind};
    use tempfile::TempDir;

    fn new_raw(id: &str) -> NewRawContact {
        NewRawContact {
            source_id: SourceId::from(id),
            account: AccountTag::default(),
            send_to_voicemail: false,
        }
    }

    #[test]
    fn pending_refs_resolve_within_batch() {
        let mut store = LocalContactStore::in_memory();
        let group = store.create_group("SCA", &AccountTag::default()).unwrap();

        let mut batch = OpBatch::new();
        let p = batch.insert_raw_contact(new_raw("a"));
        batch.insert_data(
            RawContactTarget::Pending(p),
            DataRow::GroupMembership { group, read_only: true },
        );
        let outcome = store.apply_batch(&batch).unwrap();

        assert_eq!(outcome.inserted.len(), 1);
        let members = store.group_members(group).unwrap();
        assert_eq!(members[&SourceId::from("a")].id, outcome.inserted[0].1);
    }

    #[test]
    fn failed_op_rolls_back_whole_batch() {
        let mut store = LocalContactStore::in_memory();
        let mut batch = OpBatch::new();
        batch.insert_raw_contact(new_raw("a"));
        batch.push(ContactOp::ReplacePhoto {
            raw_contact: RawContactId(999),
            photo: PhotoKind::Branding,
        });
        let err = store.apply_batch(&batch).unwrap_err();
        assert!(matches!(err, ContactStoreError::UnknownRawContact(RawContactId(999))));
        assert!(store.is_empty());
    }

    #[test]
    fn injected_failure_is_logged_but_not_applied() {
        let mut store = LocalContactStore::in_memory();
        store.fail_batch(0);
        let mut batch = OpBatch::new();
        batch.insert_raw_contact(new_raw("a"));
        assert!(store.apply_batch(&batch).is_err());
        assert_eq!(store.attempted_batches().len(), 1);
        assert!(store.is_empty());
        assert!(store.apply_batch(&batch).is_ok());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn file_backed_store_reopens_with_same_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("contacts.json");
        let group = {
            let mut store = LocalContactStore::open_at(&path).unwrap();
            let group = store.create_group("SCA", &AccountTag::default()).unwrap();
            let mut batch = OpBatch::new();
            let p = batch.insert_raw_contact(new_raw("a"));
            batch.insert_data(
                RawContactTarget::Pending(p),
                DataRow::GroupMembership { group, read_only: true },
            );
            store.apply_batch(&batch).unwrap();
            group
        };
        let store = LocalContactStore::open_at(&path).unwrap();
        assert_eq!(store.find_group("SCA").unwrap(), Some(group));
        assert_eq!(store.group_members(group).unwrap().len(), 1);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
