//! Error types for callerid-core.

use std::path::PathBuf;

use thiserror::Error;

/// Malformed request payloads. Raised before any state is touched.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// JSON did not match the expected schema.
    #[error("failed to parse payload: {0}")]
    Json(#[from] serde_json::Error),

    /// A phone number field was not digits-only after normalization.
    #[error("invalid phone number '{value}' at item {index}")]
    InvalidPhoneNumber { index: usize, value: String },

    /// A proto contact carried no usable identity to derive a source id from.
    #[error("contact at item {index} has no ihash, guid, or datasource id")]
    MissingSourceId { index: usize },
}

/// Errors from file-backed storage (caller lists, config).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure, with the offending path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (caller list lines).
    #[error("caller list JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error (config save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Config parse error on load, with path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
