//! Upstream proto contacts → native contact records.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use callerid_core::{
    ContactEmail, ContactPhone, ContactRecord, ContactSyncPayload, PayloadError, ProtoContact,
    SourceId,
};

/// Stable identity for a proto contact.
///
/// `ihash`, else `guid`, else a SHA-256 of the data source and its record
/// id. Display fields never take part, so relabeling keeps the identity.
pub fn derive_source_id(contact: &ProtoContact) -> Option<SourceId> {
    if !contact.ihash.trim().is_empty() {
        return Some(SourceId::from(contact.ihash.trim()));
    }
    if !contact.guid.trim().is_empty() {
        return Some(SourceId::from(contact.guid.trim()));
    }
    if contact.datasource_id.trim().is_empty() {
        return None;
    }
    let mut h = Sha256::new();
    h.update(contact.datasource.as_bytes());
    h.update([0x1fu8]);
    h.update(contact.datasource_id.as_bytes());
    Some(SourceId(hex::encode(h.finalize())))
}

/// `displayName` if set, else `"surname, givenname"`, else `surname`.
pub fn display_name(contact: &ProtoContact) -> String {
    match contact.display_name.as_deref() {
        Some(name) if !name.trim().is_empty() => name.to_owned(),
        _ if !contact.givenname.trim().is_empty() => {
            format!("{}, {}", contact.surname, contact.givenname)
        }
        _ => contact.surname.clone(),
    }
}

pub fn transform(
    contact: &ProtoContact,
    source_id: SourceId,
    vacation_mode_active: bool,
) -> ContactRecord {
    ContactRecord {
        source_id,
        display_name: display_name(contact),
        first_name: contact.givenname.clone(),
        last_name: contact.surname.clone(),
        company: contact.company.clone(),
        job_title: contact.jobtitle.clone(),
        department: contact.department.clone(),
        send_to_voicemail: vacation_mode_active && !contact.is_favorite(),
        phone_numbers: contact
            .phonenumbers
            .iter()
            .map(|p| ContactPhone {
                number: p.value.clone(),
                label: p.label.clone(),
            })
            .collect(),
        emails: contact
            .emailaddresses
            .iter()
            .map(|e| ContactEmail {
                address: e.value.clone(),
                label: e.label.clone(),
            })
            .collect(),
    }
}

/// Transform a whole payload into desired records, keyed by source id.
///
/// A source id seen twice keeps its first position and its last value.
pub fn desired_records(
    payload: &ContactSyncPayload,
    vacation_mode_active: bool,
) -> Result<Vec<ContactRecord>, PayloadError> {
    let mut records: Vec<ContactRecord> = Vec::with_capacity(payload.items.len());
    let mut positions: HashMap<SourceId, usize> = HashMap::new();

    for (index, contact) in payload.items.iter().enumerate() {
        let source_id = derive_source_id(contact).ok_or(PayloadError::MissingSourceId { index })?;
        let record = transform(contact, source_id.clone(), vacation_mode_active);
        match positions.get(&source_id) {
            Some(&pos) => {
                tracing::debug!("duplicate source id {} at item {}", source_id, index);
                records[pos] = record;
            }
            None => {
                positions.insert(source_id, records.len());
                records.push(record);
            }
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use callerid_core::ContactItem;

    fn proto(ihash: &str, surname: &str) -> ProtoContact {
        ProtoContact {
            ihash: ihash.into(),
            surname: surname.into(),
            ..ProtoContact::default()
        }
    }

    #[test]
    fn source_id_prefers_ihash_then_guid() {
        let mut c = proto("h1", "Doe");
        c.guid = "g1".into();
        assert_eq!(derive_source_id(&c), Some(SourceId::from("h1")));
        c.ihash.clear();
        assert_eq!(derive_source_id(&c), Some(SourceId::from("g1")));
    }

    #[test]
    fn source_id_falls_back_to_datasource_hash() {
        let mut c = proto("", "Doe");
        c.datasource = "exchange".into();
        c.datasource_id = "42".into();
        let id = derive_source_id(&c).expect("derived");
        assert_eq!(id.0.len(), 64);
        c.surname = "Renamed".into();
        assert_eq!(derive_source_id(&c), Some(id));
    }

    #[test]
    fn no_identity_is_rejected_with_index() {
        let payload = ContactSyncPayload {
            items: vec![proto("a", "A"), proto("", "B")],
        };
        let err = desired_records(&payload, false).unwrap_err();
        assert!(matches!(err, PayloadError::MissingSourceId { index: 1 }));
    }

    #[test]
    fn display_name_rules() {
        let mut c = proto("a", "Doe");
        assert_eq!(display_name(&c), "Doe");
        c.givenname = "Jane".into();
        assert_eq!(display_name(&c), "Doe, Jane");
        c.display_name = Some("Dr. Jane Doe".into());
        assert_eq!(display_name(&c), "Dr. Jane Doe");
        c.display_name = Some("  ".into());
        assert_eq!(display_name(&c), "Doe, Jane");
    }

    #[test]
    fn vacation_silences_non_favorites_only() {
        let mut fav = proto("f", "Fav");
        fav.is_favorite = Some(true);
        let other = proto("o", "Other");
        let payload = ContactSyncPayload {
            items: vec![fav, other],
        };

        let on = desired_records(&payload, true).unwrap();
        assert!(!on[0].send_to_voicemail);
        assert!(on[1].send_to_voicemail);

        let off = desired_records(&payload, false).unwrap();
        assert!(off.iter().all(|r| !r.send_to_voicemail));
    }

    #[test]
    fn duplicate_ids_keep_last_value() {
        let mut second = proto("x", "Second");
        second.phonenumbers = vec![ContactItem {
            value: "+4930".into(),
            label: "mobile".into(),
        }];
        let payload = ContactSyncPayload {
            items: vec![proto("x", "First"), proto("y", "Y"), second],
        };
        let records = desired_records(&payload, false).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].last_name, "Second");
        assert_eq!(records[0].phone_numbers.len(), 1);
        assert_eq!(records[1].source_id, SourceId::from("y"));
    }
}
