//! Contact records materialized into the native contacts store.

use serde::{Deserialize, Serialize};

use crate::types::SourceId;

/// Native phone number type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhoneType {
    Work,
    Mobile,
    Home,
    Other,
}

impl PhoneType {
    /// Map an upstream label to a native phone type (case-insensitive).
    pub fn from_label(label: &str) -> Self {
        match label.to_lowercase().as_str() {
            "business" => PhoneType::Work,
            "mobile" => PhoneType::Mobile,
            "home" => PhoneType::Home,
            _ => PhoneType::Other,
        }
    }
}

/// Native email type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailType {
    Work,
    Home,
    Other,
}

impl EmailType {
    /// Map an upstream label to a native email type (case-insensitive).
    pub fn from_label(label: &str) -> Self {
        match label.to_lowercase().as_str() {
            "business" => EmailType::Work,
            "home" => EmailType::Home,
            _ => EmailType::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPhone {
    pub number: String,
    pub label: String,
}

impl ContactPhone {
    pub fn kind(&self) -> PhoneType {
        PhoneType::from_label(&self.label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactEmail {
    pub address: String,
    pub label: String,
}

impl ContactEmail {
    pub fn kind(&self) -> EmailType {
        EmailType::from_label(&self.label)
    }
}

/// Desired state of one synced contact.
///
/// `source_id` is the reconciliation key. Only `send_to_voicemail` is
/// updated in place; every other field is written once on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub source_id: SourceId,
    pub display_name: String,
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub job_title: String,
    pub department: String,
    pub send_to_voicemail: bool,
    #[serde(default)]
    pub phone_numbers: Vec<ContactPhone>,
    #[serde(default)]
    pub emails: Vec<ContactEmail>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_labels_map_case_insensitively() {
        assert_eq!(PhoneType::from_label("Mobile"), PhoneType::Mobile);
        assert_eq!(PhoneType::from_label("MOBILE"), PhoneType::Mobile);
        assert_eq!(PhoneType::from_label("Business"), PhoneType::Work);
        assert_eq!(PhoneType::from_label("home"), PhoneType::Home);
        assert_eq!(PhoneType::from_label("pager"), PhoneType::Other);
    }

    #[test]
    fn email_labels_have_no_mobile_type() {
        assert_eq!(EmailType::from_label("business"), EmailType::Work);
        assert_eq!(EmailType::from_label("Home"), EmailType::Home);
        assert_eq!(EmailType::from_label("mobile"), EmailType::Other);
    }
}
