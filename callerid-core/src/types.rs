//! Domain types for caller identification and blocking.
//!
//! Phone numbers are always stored normalized (digits only). Native store
//! identifiers are newtypes so they cannot be confused with source ids.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A normalized phone number: no `+`, no whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(pub String);

impl PhoneNumber {
    /// Strip `+` and whitespace from a raw dialer string.
    pub fn normalize(raw: &str) -> Self {
        Self(
            raw.chars()
                .filter(|c| *c != '+' && !c.is_whitespace())
                .collect(),
        )
    }

    /// True when the number is non-empty and made of ASCII digits only.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_digit())
    }

    /// Numeric value used for ordering directory entries.
    pub fn as_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for PhoneNumber {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl From<&str> for PhoneNumber {
    fn from(s: &str) -> Self {
        Self::normalize(s)
    }
}

/// Stable reconciliation key derived from upstream contact identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub String);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier the native contacts store assigns to a raw contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawContactId(pub i64);

impl fmt::Display for RawContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of the namespace group that scopes records owned by us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub i64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Allow/block partition of a phone number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Allowed,
    Blocked,
}

impl Classification {
    pub fn all() -> &'static [Classification] {
        &[Classification::Allowed, Classification::Blocked]
    }

    /// File stem of the persisted list for this classification.
    pub fn file_stem(self) -> &'static str {
        match self {
            Classification::Allowed => "allowedCallers",
            Classification::Blocked => "blockedCallers",
        }
    }

    pub fn other(self) -> Classification {
        match self {
            Classification::Allowed => Classification::Blocked,
            Classification::Blocked => Classification::Allowed,
        }
    }

    pub fn from_blocked(is_blocked: bool) -> Self {
        if is_blocked {
            Classification::Blocked
        } else {
            Classification::Allowed
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Allowed => write!(f, "allowed"),
            Classification::Blocked => write!(f, "blocked"),
        }
    }
}

/// How caller identification is wired into the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallerIdMode {
    /// Contacts are materialized into the device contacts store.
    #[serde(rename = "workProfileMode")]
    WorkProfile,
    /// The system dialer queries our directory provider.
    #[serde(rename = "defaultMode")]
    Default,
    /// Overlay-based identification driven by call-state events.
    #[serde(rename = "compatibilityMode")]
    Compatibility,
}

impl CallerIdMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CallerIdMode::WorkProfile => "workProfileMode",
            CallerIdMode::Default => "defaultMode",
            CallerIdMode::Compatibility => "compatibilityMode",
        }
    }
}

impl fmt::Display for CallerIdMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// Canonical caller entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerRecord {
    pub phone_number: PhoneNumber,
    pub label: String,
    pub classification: Classification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<SourceId>,
}

impl CallerRecord {
    pub fn new(
        phone_number: PhoneNumber,
        label: impl Into<String>,
        classification: Classification,
    ) -> Self {
        Self {
            phone_number,
            label: label.into(),
            classification,
            source_id: None,
        }
    }
}

/// Answer to "who is calling?" for one number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallerLookup {
    Blocked { label: String },
    Identified { label: String },
    Unknown,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_plus_and_whitespace() {
        let n = PhoneNumber::normalize("+49 30\t1234 567");
        assert_eq!(n.as_str(), "49301234567");
        assert!(n.is_valid());
    }

    #[test]
    fn non_digit_numbers_are_invalid() {
        assert!(!PhoneNumber::normalize("12-34").is_valid());
        assert!(!PhoneNumber::normalize("  ").is_valid());
    }

    #[test]
    fn classification_helpers() {
        assert_eq!(Classification::Blocked.file_stem(), "blockedCallers");
        assert_eq!(Classification::Allowed.other(), Classification::Blocked);
        assert_eq!(Classification::from_blocked(true), Classification::Blocked);
    }

    #[test]
    fn mode_serializes_with_wire_names() {
        let json = serde_json::to_string(&CallerIdMode::WorkProfile).expect("serialize");
        assert_eq!(json, "\"workProfileMode\"");
        assert_eq!(CallerIdMode::Compatibility.to_string(), "compatibilityMode");
    }
}
