//! Contact-sync entrypoints shared by the CLI and the daemon.

use serde::Serialize;

use callerid_core::{BatchConfig, ContactSyncPayload, GroupId, SourceId};

use crate::engine::{self, ChunkReport, Reconciler, ReconcileOptions, SyncReport, NAMESPACE_GROUP};
use crate::error::SyncError;
use crate::ops::{AccountTag, ContactOp, OpBatch};
use crate::progress::ProgressReporter;
use crate::sink::{get_or_create_group, ContactStore};
use crate::transform;

/// Result of [`sync_contacts`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub group: GroupId,
    pub report: SyncReport,
}

/// Use the cached namespace group, or look it up and create it on first use.
pub fn resolve_group<S: ContactStore + ?Sized>(
    store: &mut S,
    cached: Option<GroupId>,
) -> Result<GroupId, SyncError> {
    match cached {
        Some(group) => Ok(group),
        None => Ok(get_or_create_group(store, NAMESPACE_GROUP, &AccountTag::default())?),
    }
}

/// Run one full contact sync.
///
/// The payload is transformed before the store is touched, so a malformed
/// payload leaves the store untouched.
pub fn sync_contacts<S: ContactStore + ?Sized>(
    store: &mut S,
    payload: &ContactSyncPayload,
    options: &ReconcileOptions,
    cached_group: Option<GroupId>,
    reporter: &dyn ProgressReporter,
) -> Result<SyncOutcome, SyncError> {
    let desired = transform::desired_records(payload, options.vacation_mode_active)?;
    tracing::info!(
        "syncing {} contacts (vacation mode {})",
        desired.len(),
        if options.vacation_mode_active { "on" } else { "off" }
    );
    let group = resolve_group(store, cached_group)?;
    let report = engine::reconcile(store, group, &desired, options, reporter)?;
    Ok(SyncOutcome { group, report })
}

/// Delete every contact in the namespace group. No group, nothing to do.
pub fn clear_contacts<S: ContactStore + ?Sized>(
    store: &mut S,
    cached_group: Option<GroupId>,
    batch: &BatchConfig,
) -> Result<ChunkReport, SyncError> {
    let group = match cached_group {
        Some(g) => g,
        None => match store.find_group(NAMESPACE_GROUP)? {
            Some(g) => g,
            None => {
                tracing::info!("no contact group; nothing to clear");
                return Ok(ChunkReport::default());
            }
        },
    };
    let mut ids: Vec<_> = store.group_members(group)?.values().map(|e| e.id).collect();
    ids.sort();
    tracing::info!("clearing {} contacts from group {}", ids.len(), group);
    Ok(Reconciler::new(store, group, batch).apply_delete(&ids))
}

/// Set or clear send-to-voicemail on one synced contact.
pub fn set_local_contact_blocked<S: ContactStore + ?Sized>(
    store: &mut S,
    cached_group: Option<GroupId>,
    source_id: &SourceId,
    blocked: bool,
) -> Result<(), SyncError> {
    let group = resolve_group(store, cached_group)?;
    let members = store.group_members(group)?;
    let existing = members.get(source_id).ok_or_else(|| SyncError::UnknownContact {
        source_id: source_id.clone(),
    })?;
    let mut batch = OpBatch::new();
    batch.push(ContactOp::UpdateVoicemail {
        raw_contact: existing.id,
        send_to_voicemail: blocked,
    });
    store.apply_batch(&batch)?;
    tracing::info!(
        "{} local contact {}",
        if blocked { "blocked" } else { "unblocked" },
        source_id
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_store::LocalContactStore;
    use crate::progress::NoopReporter;
    use callerid_core::ProtoContact;

    fn payload(ids: &[&str]) -> ContactSyncPayload {
        ContactSyncPayload {
            items: ids
                .iter()
                .map(|id| ProtoContact {
                    ihash: (*id).into(),
                    surname: "Doe".into(),
                    ..ProtoContact::default()
                })
                .collect(),
        }
    }

    #[test]
    fn first_sync_creates_group_once() {
        let mut store = LocalContactStore::in_memory();
        let opts = ReconcileOptions::default();
        let first = sync_contacts(&mut store, &payload(&["a"]), &opts, None, &NoopReporter).unwrap();
        let second =
            sync_contacts(&mut store, &payload(&["a"]), &opts, None, &NoopReporter).unwrap();
        assert_eq!(first.group, second.group);
        assert_eq!(store.groups().len(), 1);
    }

    #[test]
    fn bad_payload_leaves_store_untouched() {
        let mut store = LocalContactStore::in_memory();
        let bad = payload(&["a", ""]);
        let err = sync_contacts(&mut store, &bad, &ReconcileOptions::default(), None, &NoopReporter)
            .unwrap_err();
        assert!(matches!(err, SyncError::Payload(_)));
        assert!(store.groups().is_empty());
        assert!(store.attempted_batches().is_empty());
    }

    #[test]
    fn clear_without_group_is_noop() {
        let mut store = LocalContactStore::in_memory();
        let report = clear_contacts(&mut store, None, &BatchConfig::default()).unwrap();
        assert_eq!(report, ChunkReport::default());
    }

    #[test]
    fn block_unknown_contact_is_an_error() {
        let mut store = LocalContactStore::in_memory();
        let err = set_local_contact_blocked(&mut store, None, &SourceId::from("nope"), true)
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownContact { .. }));
    }

    #[test]
    fn block_then_unblock_local_contact() {
        let mut store = LocalContactStore::in_memory();
        let out = sync_contacts(
            &mut store,
            &payload(&["a"]),
            &ReconcileOptions::default(),
            None,
            &NoopReporter,
        )
        .unwrap();
        let id = SourceId::from("a");
        set_local_contact_blocked(&mut store, Some(out.group), &id, true).unwrap();
        assert!(store.find_by_source_id(&id).unwrap().send_to_voicemail);
        set_local_contact_blocked(&mut store, Some(out.group), &id, false).unwrap();
        assert!(!store.find_by_source_id(&id).unwrap().send_to_voicemail);
    }
}
