//! Batch operations submitted to a contacts store.
//!
//! A batch is an ordered list of [`ContactOp`]s applied atomically. Data rows
//! for a raw contact inserted in the same batch refer to it through a
//! [`PendingRef`], an index into the batch's own op list that the store
//! resolves to a real [`RawContactId`] at commit time.

use serde::{Deserialize, Serialize};

use callerid_core::{EmailType, GroupId, PhoneType, RawContactId, SourceId};

/// Account every raw contact we insert is filed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTag {
    pub account_type: String,
    pub account_name: String,
}

impl Default for AccountTag {
    fn default() -> Self {
        Self {
            account_type: "com.android.localprofile".into(),
            account_name: "Local Contacts".into(),
        }
    }
}

/// Position of an [`ContactOp::InsertRawContact`] inside its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingRef(usize);

impl PendingRef {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Which raw contact a data row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawContactTarget {
    Existing(RawContactId),
    Pending(PendingRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoKind {
    /// Attached on insert so the contact never shows without an image.
    Placeholder,
    /// Swapped in by the relabel pass once inserts have committed.
    Branding,
}

/// One typed data row attached to a raw contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataRow {
    GroupMembership {
        group: GroupId,
        read_only: bool,
    },
    StructuredName {
        display_name: String,
        given_name: String,
        family_name: String,
    },
    Organization {
        company: String,
        title: String,
        department: String,
    },
    Note {
        text: String,
    },
    Phone {
        number: String,
        phone_type: PhoneType,
        label: String,
    },
    Email {
        address: String,
        email_type: EmailType,
        label: String,
    },
    Photo {
        photo: PhotoKind,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRawContact {
    pub source_id: SourceId,
    pub account: AccountTag,
    pub send_to_voicemail: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactOp {
    InsertRawContact(NewRawContact),
    InsertData {
        raw_contact: RawContactTarget,
        row: DataRow,
    },
    UpdateVoicemail {
        raw_contact: RawContactId,
        send_to_voicemail: bool,
    },
    DeleteRawContact {
        raw_contact: RawContactId,
    },
    ReplacePhoto {
        raw_contact: RawContactId,
        photo: PhotoKind,
    },
}

/// Ordered ops applied as one atomic unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpBatch {
    ops: Vec<ContactOp>,
}

impl OpBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw contact insert and return the handle its rows refer to.
    pub fn insert_raw_contact(&mut self, contact: NewRawContact) -> PendingRef {
        let pending = PendingRef(self.ops.len());
        self.ops.push(ContactOp::InsertRawContact(contact));
        pending
    }

    pub fn insert_data(&mut self, raw_contact: RawContactTarget, row: DataRow) {
        self.ops.push(ContactOp::InsertData { raw_contact, row });
    }

    pub fn push(&mut self, op: ContactOp) {
        self.ops.push(op);
    }

    /// Move every op of `other` to the end of `self`, rebasing pending refs.
    pub fn append(&mut self, other: OpBatch) {
        let offset = self.ops.len();
        self.ops.extend(other.ops.into_iter().map(|op| match op {
            ContactOp::InsertData {
                raw_contact: RawContactTarget::Pending(p),
                row,
            } => ContactOp::InsertData {
                raw_contact: RawContactTarget::Pending(PendingRef(p.0 + offset)),
                row,
            },
            other => other,
        }));
    }

    pub fn ops(&self) -> &[ContactOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }
}

/// Raw contacts created by a committed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub inserted: Vec<(SourceId, RawContactId)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str) -> NewRawContact {
        NewRawContact {
            source_id: SourceId::from(id),
            account: AccountTag::default(),
            send_to_voicemail: false,
        }
    }

    #[test]
    fn append_rebases_pending_refs() {
        let mut first = OpBatch::new();
        first.insert_raw_contact(raw("a"));

        let mut second = OpBatch::new();
        let p = second.insert_raw_contact(raw("b"));
        second.insert_data(RawContactTarget::Pending(p), DataRow::Note { text: "n".into() });

        first.append(second);
        assert_eq!(first.len(), 3);
        match &first.ops()[2] {
            ContactOp::InsertData {
                raw_contact: RawContactTarget::Pending(p),
                ..
            } => assert_eq!(p.index(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }
}
