//! Reconciliation engine: drives insert/update/delete passes through a
//! [`ContactStore`] in size-bounded chunks.
//!
//! ## Pass order
//!
//! 1. Delete records whose source id left the payload.
//! 2. Update the send-to-voicemail flag of records that stay.
//! 3. Under vacation mode, explicitly un-silence every staying favourite.
//! 4. Insert new records, all ops of one record in the same batch.
//! 5. Swap the insert placeholder image for the branding image.
//!
//! Every chunk is its own atomic batch. A failed chunk is logged, counted
//! and skipped; the remaining chunks still run.

use std::collections::HashMap;

use serde::Serialize;

use callerid_core::{BatchConfig, ContactRecord, GroupId, RawContactId, SourceId};

use crate::diff::{compute_diff, KeyDiff};
use crate::error::SyncError;
use crate::ops::{
    AccountTag, ContactOp, DataRow, NewRawContact, OpBatch, PhotoKind, RawContactTarget,
};
use crate::progress::{NoopReporter, ProgressReporter, ProgressTracker};
use crate::sink::{ContactStore, ExistingContact};

/// Title of the group that marks contacts as ours.
pub const NAMESPACE_GROUP: &str = "CallerID";

/// Note attached to every inserted contact.
pub const MANAGED_NOTE: &str = "contact managed by CallerID";

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of one chunked pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChunkReport {
    /// Batches submitted to the store.
    pub batches: usize,
    /// Batches the store rejected.
    pub failed_batches: usize,
    /// Targets (records for inserts) in committed batches.
    pub applied: usize,
    /// Targets lost to rejected batches.
    pub skipped: usize,
}

/// Outcome of one full reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub deleted: ChunkReport,
    pub updated: ChunkReport,
    pub unblocked: ChunkReport,
    pub inserted: ChunkReport,
    pub avatars: ChunkReport,
}

impl SyncReport {
    pub fn failed_batches(&self) -> usize {
        self.passes().iter().map(|p| p.failed_batches).sum()
    }

    pub fn total_batches(&self) -> usize {
        self.passes().iter().map(|p| p.batches).sum()
    }

    fn passes(&self) -> [&ChunkReport; 5] {
        [
            &self.deleted,
            &self.updated,
            &self.unblocked,
            &self.inserted,
            &self.avatars,
        ]
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Chunked batch passes over one store and one namespace group.
pub struct Reconciler<'a, S: ContactStore + ?Sized> {
    store: &'a mut S,
    group: GroupId,
    account: AccountTag,
    chunk: usize,
    tracker: Option<ProgressTracker<'a>>,
}

impl<'a, S: ContactStore + ?Sized> Reconciler<'a, S> {
    pub fn new(store: &'a mut S, group: GroupId, batch: &BatchConfig) -> Self {
        Self {
            store,
            group,
            account: AccountTag::default(),
            chunk: batch.effective_chunk(),
            tracker: None,
        }
    }

    /// Report progress over `total` operations; silent unless `total`
    /// exceeds the chunk size.
    pub fn with_progress(mut self, reporter: &'a dyn ProgressReporter, total: usize) -> Self {
        self.tracker = Some(ProgressTracker::new(reporter, total, self.chunk));
        self
    }

    pub fn with_account(mut self, account: AccountTag) -> Self {
        self.account = account;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk
    }

    fn advance(&mut self, n: usize, counted: bool) {
        if counted {
            if let Some(tracker) = self.tracker.as_mut() {
                tracker.advance(n);
            }
        }
    }

    fn run_chunked<F>(&mut self, ids: &[RawContactId], pass: &str, counted: bool, op: F) -> ChunkReport
    where
        F: Fn(RawContactId) -> ContactOp,
    {
        let mut report = ChunkReport::default();
        if ids.is_empty() {
            return report;
        }
        for (i, chunk) in ids.chunks(self.chunk).enumerate() {
            let mut batch = OpBatch::new();
            for id in chunk {
                batch.push(op(*id));
            }
            report.batches += 1;
            match self.store.apply_batch(&batch) {
                Ok(_) => {
                    report.applied += chunk.len();
                    tracing::debug!("{}: batch {} applied {} ops", pass, i, chunk.len());
                }
                Err(e) => {
                    report.failed_batches += 1;
                    report.skipped += chunk.len();
                    tracing::warn!("{}: batch {} failed, skipping {} targets: {}", pass, i, chunk.len(), e);
                }
            }
            self.advance(chunk.len(), counted);
        }
        tracing::info!(
            "{}: {} of {} applied in {} batches",
            pass,
            report.applied,
            ids.len(),
            report.batches
        );
        report
    }

    /// Delete raw contacts, at most one chunk per batch.
    pub fn apply_delete(&mut self, ids: &[RawContactId]) -> ChunkReport {
        self.run_chunked(ids, "delete", true, |raw_contact| ContactOp::DeleteRawContact {
            raw_contact,
        })
    }

    /// Set the send-to-voicemail flag on raw contacts.
    pub fn apply_update(&mut self, ids: &[RawContactId], send_to_voicemail: bool) -> ChunkReport {
        self.run_chunked(ids, "update", true, move |raw_contact| ContactOp::UpdateVoicemail {
            raw_contact,
            send_to_voicemail,
        })
    }

    fn apply_unblock(&mut self, ids: &[RawContactId]) -> ChunkReport {
        self.run_chunked(ids, "unblock", true, |raw_contact| ContactOp::UpdateVoicemail {
            raw_contact,
            send_to_voicemail: false,
        })
    }

    /// Insert records. A record's ops are never split across batches; a
    /// batch is flushed when the next record would push it past the chunk
    /// size. Returns the ids of the raw contacts that were committed.
    pub fn apply_insert(&mut self, records: &[ContactRecord]) -> (ChunkReport, Vec<RawContactId>) {
        let mut report = ChunkReport::default();
        let mut inserted = Vec::new();
        if records.is_empty() {
            return (report, inserted);
        }

        let mut batch = OpBatch::new();
        let mut in_batch = 0usize;
        for record in records {
            let ops = contact_ops(record, self.group, &self.account);
            if !batch.is_empty() && batch.len() + ops.len() > self.chunk {
                self.flush_inserts(&mut batch, &mut in_batch, &mut report, &mut inserted);
            }
            batch.append(ops);
            in_batch += 1;
            if batch.len() >= self.chunk {
                self.flush_inserts(&mut batch, &mut in_batch, &mut report, &mut inserted);
            }
        }
        if !batch.is_empty() {
            self.flush_inserts(&mut batch, &mut in_batch, &mut report, &mut inserted);
        }

        tracing::info!(
            "insert: {} of {} contacts applied in {} batches",
            report.applied,
            records.len(),
            report.batches
        );
        (report, inserted)
    }

    fn flush_inserts(
        &mut self,
        batch: &mut OpBatch,
        in_batch: &mut usize,
        report: &mut ChunkReport,
        inserted: &mut Vec<RawContactId>,
    ) {
        let n = *in_batch;
        report.batches += 1;
        match self.store.apply_batch(batch) {
            Ok(outcome) => {
                report.applied += n;
                inserted.extend(outcome.inserted.into_iter().map(|(_, id)| id));
            }
            Err(e) => {
                report.failed_batches += 1;
                report.skipped += n;
                tracing::warn!(
                    "insert: batch {} failed, skipping {} contacts: {}",
                    report.batches - 1,
                    n,
                    e
                );
            }
        }
        batch.clear();
        *in_batch = 0;
        self.advance(n, true);
    }

    /// Replace the placeholder image of freshly inserted contacts with the
    /// branding image.
    pub fn bulk_relabel_avatars(&mut self, ids: &[RawContactId]) -> ChunkReport {
        self.run_chunked(ids, "avatars", false, |raw_contact| ContactOp::ReplacePhoto {
            raw_contact,
            photo: PhotoKind::Branding,
        })
    }
}

/// Ops inserting one record: raw contact, group membership, name,
/// organization, note, phones, emails, placeholder image.
pub fn contact_ops(record: &ContactRecord, group: GroupId, account: &AccountTag) -> OpBatch {
    let mut batch = OpBatch::new();
    let raw = RawContactTarget::Pending(batch.insert_raw_contact(NewRawContact {
        source_id: record.source_id.clone(),
        account: account.clone(),
        send_to_voicemail: record.send_to_voicemail,
    }));

    batch.insert_data(
        raw,
        DataRow::GroupMembership {
            group,
            read_only: true,
        },
    );
    batch.insert_data(
        raw,
        DataRow::StructuredName {
            display_name: record.display_name.clone(),
            given_name: record.first_name.clone(),
            family_name: record.last_name.clone(),
        },
    );
    batch.insert_data(
        raw,
        DataRow::Organization {
            company: record.company.clone(),
            title: record.job_title.clone(),
            department: record.department.clone(),
        },
    );
    batch.insert_data(
        raw,
        DataRow::Note {
            text: MANAGED_NOTE.to_owned(),
        },
    );
    for phone in &record.phone_numbers {
        batch.insert_data(
            raw,
            DataRow::Phone {
                number: phone.number.clone(),
                phone_type: phone.kind(),
                label: phone.label.clone(),
            },
        );
    }
    for email in &record.emails {
        batch.insert_data(
            raw,
            DataRow::Email {
                address: email.address.clone(),
                email_type: email.kind(),
                label: email.label.clone(),
            },
        );
    }
    batch.insert_data(
        raw,
        DataRow::Photo {
            photo: PhotoKind::Placeholder,
        },
    );
    batch
}

// ---------------------------------------------------------------------------
// Full run
// ---------------------------------------------------------------------------

/// Inputs of one reconciliation run beyond the records themselves.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    pub vacation_mode_active: bool,
    pub batch: BatchConfig,
}

/// Diff plus the ids each pass will target. Pure; touches nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub diff: KeyDiff<SourceId>,
    pub delete_ids: Vec<RawContactId>,
    /// Staying records whose flag differs from the vacation flag.
    pub update_ids: Vec<RawContactId>,
    /// Staying favourites to un-silence (vacation mode only).
    pub unblock_ids: Vec<RawContactId>,
    pub insert: Vec<ContactRecord>,
}

impl SyncPlan {
    /// Operation count used for progress: deletes, updates, unblocks and
    /// inserts. Avatar relabels are not counted.
    pub fn total(&self) -> usize {
        self.delete_ids.len() + self.update_ids.len() + self.unblock_ids.len() + self.insert.len()
    }
}

pub fn plan(
    existing: &HashMap<SourceId, ExistingContact>,
    desired: &[ContactRecord],
    vacation_mode_active: bool,
) -> SyncPlan {
    let diff = compute_diff(
        existing.keys().cloned(),
        desired.iter().map(|r| r.source_id.clone()),
    );
    let by_id: HashMap<&SourceId, &ContactRecord> =
        desired.iter().map(|r| (&r.source_id, r)).collect();

    let delete_ids = diff
        .to_delete
        .iter()
        .filter_map(|k| existing.get(k).map(|e| e.id))
        .collect();

    let mut update_ids = Vec::new();
    let mut unblock_ids = Vec::new();
    for key in &diff.to_update {
        let (Some(current), Some(record)) = (existing.get(key), by_id.get(key)) else {
            continue;
        };
        if record.send_to_voicemail == vacation_mode_active
            && current.send_to_voicemail != vacation_mode_active
        {
            update_ids.push(current.id);
        }
        if vacation_mode_active && !record.send_to_voicemail {
            unblock_ids.push(current.id);
        }
    }

    // Payload order, not key order, for inserts.
    let insert = desired
        .iter()
        .filter(|r| diff.to_insert.contains(&r.source_id))
        .cloned()
        .collect();

    SyncPlan {
        diff,
        delete_ids,
        update_ids,
        unblock_ids,
        insert,
    }
}

/// Converge the members of `group` with `desired`.
///
/// Only the initial snapshot query can fail the run; batch failures are
/// absorbed into the returned report.
pub fn reconcile<S: ContactStore + ?Sized>(
    store: &mut S,
    group: GroupId,
    desired: &[ContactRecord],
    options: &ReconcileOptions,
    reporter: &dyn ProgressReporter,
) -> Result<SyncReport, SyncError> {
    let existing = store.group_members(group)?;
    let plan = plan(&existing, desired, options.vacation_mode_active);
    tracing::info!(
        "reconcile: {} to insert, {} to update ({} flag changes), {} to delete",
        plan.diff.to_insert.len(),
        plan.diff.to_update.len(),
        plan.update_ids.len(),
        plan.diff.to_delete.len()
    );

    let total = plan.total();
    let mut reconciler = Reconciler::new(store, group, &options.batch).with_progress(reporter, total);

    let mut report = SyncReport {
        deleted: reconciler.apply_delete(&plan.delete_ids),
        updated: reconciler.apply_update(&plan.update_ids, options.vacation_mode_active),
        ..SyncReport::default()
    };
    if options.vacation_mode_active {
        report.unblocked = reconciler.apply_unblock(&plan.unblock_ids);
    }
    let (inserted, new_ids) = reconciler.apply_insert(&plan.insert);
    report.inserted = inserted;
    report.avatars = reconciler.bulk_relabel_avatars(&new_ids);
    Ok(report)
}

/// [`reconcile`] without progress reporting.
pub fn reconcile_quiet<S: ContactStore + ?Sized>(
    store: &mut S,
    group: GroupId,
    desired: &[ContactRecord],
    options: &ReconcileOptions,
) -> Result<SyncReport, SyncError> {
    reconcile(store, group, desired, options, &NoopReporter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_store::LocalContactStore;
    use callerid_core::{ContactEmail, ContactPhone, EmailType, PhoneType};

    fn record(id: &str) -> ContactRecord {
        ContactRecord {
            source_id: SourceId::from(id),
            display_name: format!("Doe, {id}"),
            first_name: id.to_owned(),
            last_name: "Doe".into(),
            company: "Acme".into(),
            job_title: String::new(),
            department: String::new(),
            send_to_voicemail: false,
            phone_numbers: vec![ContactPhone {
                number: "+4930123".into(),
                label: "Mobile".into(),
            }],
            emails: vec![ContactEmail {
                address: "j@acme.test".into(),
                label: "private".into(),
            }],
        }
    }

    #[test]
    fn contact_ops_are_ordered_and_typed() {
        let batch = contact_ops(&record("a"), GroupId(7), &AccountTag::default());
        let ops = batch.ops();
        assert!(matches!(ops[0], ContactOp::InsertRawContact(_)));
        assert!(matches!(
            ops[1],
            ContactOp::InsertData { row: DataRow::GroupMembership { group: GroupId(7), .. }, .. }
        ));
        assert!(ops.iter().any(|op| matches!(
            op,
            ContactOp::InsertData { row: DataRow::Phone { phone_type: PhoneType::Mobile, .. }, .. }
        )));
        assert!(ops.iter().any(|op| matches!(
            op,
            ContactOp::InsertData { row: DataRow::Email { email_type: EmailType::Other, .. }, .. }
        )));
        assert!(matches!(
            ops.last(),
            Some(ContactOp::InsertData { row: DataRow::Photo { photo: PhotoKind::Placeholder }, .. })
        ));
        assert_eq!(ops.len(), 8);
    }

    #[test]
    fn empty_passes_issue_no_batches() {
        let mut store = LocalContactStore::in_memory();
        let mut r = Reconciler::new(&mut store, GroupId(1), &BatchConfig::default());
        assert_eq!(r.apply_delete(&[]), ChunkReport::default());
        assert_eq!(r.apply_update(&[], true), ChunkReport::default());
        assert_eq!(r.apply_insert(&[]).0, ChunkReport::default());
        assert_eq!(r.bulk_relabel_avatars(&[]), ChunkReport::default());
        assert!(store.attempted_batches().is_empty());
    }

    #[test]
    fn insert_never_splits_a_record() {
        let mut store = LocalContactStore::in_memory();
        let batch = BatchConfig {
            chunk_size: 20,
            ..BatchConfig::default()
        };
        let records: Vec<_> = (0..5).map(|i| record(&i.to_string())).collect();
        let (report, ids) = Reconciler::new(&mut store, GroupId(1), &batch).apply_insert(&records);
        assert_eq!(report.applied, 5);
        assert_eq!(ids.len(), 5);
        // 8 ops per record, 20 per chunk: two records per batch.
        assert_eq!(report.batches, 3);
        for b in store.attempted_batches() {
            assert!(b.len() <= 20);
            assert!(matches!(b.ops()[0], ContactOp::InsertRawContact(_)));
        }
    }

    #[test]
    fn plan_only_updates_changed_flags() {
        let mut existing = HashMap::new();
        existing.insert(
            SourceId::from("quiet"),
            ExistingContact { id: RawContactId(1), send_to_voicemail: true },
        );
        existing.insert(
            SourceId::from("loud"),
            ExistingContact { id: RawContactId(2), send_to_voicemail: false },
        );
        let desired = vec![record("quiet"), record("loud")];
        let p = plan(&existing, &desired, false);
        assert_eq!(p.update_ids, vec![RawContactId(1)]);
        assert!(p.unblock_ids.is_empty());
    }
}
