//! The contacts store as seen by the reconciliation engine.

use std::collections::HashMap;

use callerid_core::{GroupId, RawContactId, SourceId};

use crate::error::ContactStoreError;
use crate::ops::{AccountTag, BatchOutcome, OpBatch};

/// What the store currently holds for one of our contacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExistingContact {
    pub id: RawContactId,
    pub send_to_voicemail: bool,
}

/// Batch-operation sink over a native contacts database.
///
/// `apply_batch` must be all-or-nothing: when it returns an error no op of
/// the batch may be visible.
pub trait ContactStore: Send {
    /// Id of the non-deleted group titled `title`, if any.
    fn find_group(&self, title: &str) -> Result<Option<GroupId>, ContactStoreError>;

    fn create_group(
        &mut self,
        title: &str,
        account: &AccountTag,
    ) -> Result<GroupId, ContactStoreError>;

    /// Source id → current state for every member of `group`.
    ///
    /// Members without a source id are not ours to reconcile and are skipped.
    fn group_members(
        &self,
        group: GroupId,
    ) -> Result<HashMap<SourceId, ExistingContact>, ContactStoreError>;

    fn apply_batch(&mut self, batch: &OpBatch) -> Result<BatchOutcome, ContactStoreError>;
}

impl<S: ContactStore + ?Sized> ContactStore for Box<S> {
    fn find_group(&self, title: &str) -> Result<Option<GroupId>, ContactStoreError> {
        (**self).find_group(title)
    }

    fn create_group(
        &mut self,
        title: &str,
        account: &AccountTag,
    ) -> Result<GroupId, ContactStoreError> {
        (**self).create_group(title, account)
    }

    fn group_members(
        &self,
        group: GroupId,
    ) -> Result<HashMap<SourceId, ExistingContact>, ContactStoreError> {
        (**self).group_members(group)
    }

    fn apply_batch(&mut self, batch: &OpBatch) -> Result<BatchOutcome, ContactStoreError> {
        (**self).apply_batch(batch)
    }
}

/// Find the group titled `title`, creating it when absent.
pub fn get_or_create_group<S: ContactStore + ?Sized>(
    store: &mut S,
    title: &str,
    account: &AccountTag,
) -> Result<GroupId, ContactStoreError> {
    if let Some(id) = store.find_group(title)? {
        tracing::debug!("found contact group '{}' ({})", title, id);
        return Ok(id);
    }
    let id = store.create_group(title, account)?;
    tracing::info!("created contact group '{}' ({})", title, id);
    Ok(id)
}
