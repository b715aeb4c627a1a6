//! Wire payloads accepted from the application layer.
//!
//! Every payload is decoded into strict structs and validated here, before it
//! can reach the store or the reconciliation engine. A payload that fails
//! either step is rejected whole.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PayloadError;
use crate::types::{Classification, PhoneNumber};

// ---------------------------------------------------------------------------
// Caller list
// ---------------------------------------------------------------------------

/// How a caller list request is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallerListType {
    Block,
    Unblock,
    Identify,
    Default,
    ClearAll,
    /// Vacation toggle: every blocking entry is dropped.
    AllAllowed,
    /// Vacation toggle: every identification entry is dropped.
    AllBlocked,
}

impl CallerListType {
    pub fn as_str(self) -> &'static str {
        match self {
            CallerListType::Block => "block",
            CallerListType::Unblock => "unblock",
            CallerListType::Identify => "identify",
            CallerListType::Default => "default",
            CallerListType::ClearAll => "clearAll",
            CallerListType::AllAllowed => "allAllowed",
            CallerListType::AllBlocked => "allBlocked",
        }
    }
}

/// One entry of a caller list request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerItem {
    #[serde(default)]
    pub label: String,
    #[serde(
        deserialize_with = "deserialize_phone",
        serialize_with = "serialize_phone"
    )]
    pub phonenumber: PhoneNumber,
    #[serde(default)]
    pub is_removed: bool,
    #[serde(default)]
    pub is_blocked: bool,
}

impl CallerItem {
    pub fn new(phonenumber: impl Into<PhoneNumber>, label: impl Into<String>, is_blocked: bool) -> Self {
        Self {
            label: label.into(),
            phonenumber: phonenumber.into(),
            is_removed: false,
            is_blocked,
        }
    }

    pub fn removed(mut self) -> Self {
        self.is_removed = true;
        self
    }

    pub fn classification(&self) -> Classification {
        Classification::from_blocked(self.is_blocked)
    }
}

/// `{ "type": ..., "items": [...] }` as sent by `setCallerList` and written
/// to the shared directory document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerListPayload {
    #[serde(rename = "type")]
    pub list_type: CallerListType,
    #[serde(default)]
    pub items: Vec<CallerItem>,
}

impl CallerListPayload {
    pub fn new(list_type: CallerListType, items: Vec<CallerItem>) -> Self {
        Self { list_type, items }
    }

    /// Reject items whose number is not digits-only after normalization.
    pub fn validate(&self) -> Result<(), PayloadError> {
        for (index, item) in self.items.iter().enumerate() {
            if !item.phonenumber.is_valid() {
                return Err(PayloadError::InvalidPhoneNumber {
                    index,
                    value: item.phonenumber.0.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Decode and validate a caller list request.
pub fn parse_caller_list(json: &str) -> Result<CallerListPayload, PayloadError> {
    let payload: CallerListPayload = serde_json::from_str(json)?;
    payload.validate()?;
    Ok(payload)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WirePhone {
    Number(u64),
    Text(String),
}

fn deserialize_phone<'de, D>(deserializer: D) -> Result<PhoneNumber, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match WirePhone::deserialize(deserializer)? {
        WirePhone::Number(n) => PhoneNumber::from(n),
        WirePhone::Text(s) => PhoneNumber::normalize(&s),
    })
}

// Numbers go back out as integers, matching what the extension expects,
// unless the integer would lose leading zeros.
fn serialize_phone<S>(phone: &PhoneNumber, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match phone.as_u64() {
        Some(n) if n.to_string() == phone.as_str() => serializer.serialize_u64(n),
        _ => serializer.serialize_str(phone.as_str()),
    }
}

// ---------------------------------------------------------------------------
// Contact sync
// ---------------------------------------------------------------------------

/// `{ value, label }` pair used for phone numbers and email addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactItem {
    pub value: String,
    #[serde(default)]
    pub label: String,
}

/// Upstream contact as delivered by the application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtoContact {
    pub company: String,
    pub givenname: String,
    pub surname: String,
    pub jobtitle: String,
    pub department: String,
    pub guid: String,
    pub ihash: String,
    pub datasource: String,
    #[serde(rename = "datasourceID")]
    pub datasource_id: String,
    pub phonenumbers: Vec<ContactItem>,
    pub emailaddresses: Vec<ContactItem>,
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "isFavorite", skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

impl ProtoContact {
    pub fn is_favorite(&self) -> bool {
        self.is_favorite.unwrap_or(false)
    }
}

/// `{ "items": [...] }` as sent by `syncContacts`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSyncPayload {
    #[serde(default)]
    pub items: Vec<ProtoContact>,
}

/// Decode a contact sync request. Identity checks happen in the transform.
pub fn parse_contact_payload(json: &str) -> Result<ContactSyncPayload, PayloadError> {
    Ok(serde_json::from_str(json)?)
}
