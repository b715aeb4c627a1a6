//! Error types for callerid-directory.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use callerid_core::PayloadError;

/// Reason the directory host refused a request, by the host's numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DirectoryRejection {
    Unknown,
    ExtensionNotFound,
    LoadingInterrupted,
    EntriesOutOfOrder,
    DuplicateEntries,
    MaximumEntriesExceeded,
    ExtensionDisabled,
    CurrentlyLoading,
    UnexpectedIncrementalRemoval,
}

impl DirectoryRejection {
    /// Map a host error code. Codes outside 0–8 are reported as `Unknown`.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => DirectoryRejection::ExtensionNotFound,
            2 => DirectoryRejection::LoadingInterrupted,
            3 => DirectoryRejection::EntriesOutOfOrder,
            4 => DirectoryRejection::DuplicateEntries,
            5 => DirectoryRejection::MaximumEntriesExceeded,
            6 => DirectoryRejection::ExtensionDisabled,
            7 => DirectoryRejection::CurrentlyLoading,
            8 => DirectoryRejection::UnexpectedIncrementalRemoval,
            _ => DirectoryRejection::Unknown,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            DirectoryRejection::Unknown => 0,
            DirectoryRejection::ExtensionNotFound => 1,
            DirectoryRejection::LoadingInterrupted => 2,
            DirectoryRejection::EntriesOutOfOrder => 3,
            DirectoryRejection::DuplicateEntries => 4,
            DirectoryRejection::MaximumEntriesExceeded => 5,
            DirectoryRejection::ExtensionDisabled => 6,
            DirectoryRejection::CurrentlyLoading => 7,
            DirectoryRejection::UnexpectedIncrementalRemoval => 8,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            DirectoryRejection::Unknown => "Extension could not be loaded for an unknown reason.",
            DirectoryRejection::ExtensionNotFound => "Could not load extension. Extension not found.",
            DirectoryRejection::LoadingInterrupted => {
                "Could not load extension. Extension was interrupted while loading."
            }
            DirectoryRejection::EntriesOutOfOrder => {
                "Could not load extension. Call entries are out of order."
            }
            DirectoryRejection::DuplicateEntries => "Could not load extension. Duplicate entries.",
            DirectoryRejection::MaximumEntriesExceeded => {
                "Could not load extension. Maximum entries exceeded."
            }
            DirectoryRejection::ExtensionDisabled => "Extension not enabled in Settings.",
            DirectoryRejection::CurrentlyLoading => {
                "Could not load extension. The extension is currently loading."
            }
            DirectoryRejection::UnexpectedIncrementalRemoval => "Unexpected incremental removal.",
        }
    }
}

impl fmt::Display for DirectoryRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message(), self.code())
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The host refused the request. All entries were cleared afterwards.
    #[error("directory rejected the request: {0}")]
    Rejected(DirectoryRejection),

    #[error("invalid caller list: {0}")]
    Payload(#[from] PayloadError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Shared document or directory file could not be (de)serialized.
    #[error("directory JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`DirectoryError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DirectoryError {
    DirectoryError::Io {
        path: path.into(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_both_ways() {
        for code in 0..=8 {
            assert_eq!(DirectoryRejection::from_code(code).code(), code);
        }
        assert_eq!(DirectoryRejection::from_code(42), DirectoryRejection::Unknown);
    }

    #[test]
    fn display_carries_reason_and_code() {
        let text = DirectoryRejection::DuplicateEntries.to_string();
        assert!(text.contains("Duplicate entries"));
        assert!(text.contains("code 4"));
    }
}
