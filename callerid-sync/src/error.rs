//! Error types for callerid-sync.

use std::path::PathBuf;

use thiserror::Error;

use callerid_core::{PayloadError, RawContactId, SourceId};

use crate::ops::PendingRef;

/// A contacts-store batch or query failed.
///
/// Inside a sync run these are absorbed per chunk and counted in
/// [`crate::engine::ChunkReport`]; outside of one they surface as-is.
#[derive(Debug, Error)]
pub enum ContactStoreError {
    /// The store refused the batch as a whole.
    #[error("batch rejected: {reason}")]
    Rejected { reason: String },

    /// An operation targeted a raw contact that does not exist.
    #[error("raw contact {0} not found")]
    UnknownRawContact(RawContactId),

    /// A data row pointed at a pending raw contact outside its batch.
    #[error("unresolved back-reference to pending raw contact #{}", .0.index())]
    UnresolvedReference(PendingRef),

    /// An I/O error from a file-backed store.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File-backed store could not be (de)serialized.
    #[error("contact store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Request-level failures of a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The payload failed strict decoding; nothing was touched.
    #[error("invalid payload: {0}")]
    Payload(#[from] PayloadError),

    /// A store call outside the chunked passes failed (group lookup, snapshot).
    #[error("contact store error: {0}")]
    Store(#[from] ContactStoreError),

    /// Contacts permission is not granted.
    #[error("contacts permission not granted")]
    CapabilityDenied,

    /// Another sync is in flight; this request did nothing.
    #[error("a contact sync is already running")]
    ConcurrentSyncRejected,

    /// The background worker died without reporting.
    #[error("sync worker failed: {0}")]
    Worker(String),

    /// No synced contact carries this source id.
    #[error("no synced contact with source id '{source_id}'")]
    UnknownContact { source_id: SourceId },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (sync state).
    #[error("sync state JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`ContactStoreError::Io`].
pub(crate) fn store_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ContactStoreError {
    ContactStoreError::Io {
        path: path.into(),
        source,
    }
}
