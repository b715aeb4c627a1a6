use std::path::PathBuf;

use thiserror::Error;

use callerid_core::{CallerIdMode, PayloadError, StoreError};
use callerid_directory::DirectoryError;
use callerid_sync::{ContactStoreError, SyncError};

/// Request-level failures of a bridge operation, as surfaced to the app.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The operation does not apply to the resolved caller-id mode.
    #[error("{operation} is not available in {}", mode.as_str())]
    ModeNotSupported {
        operation: &'static str,
        mode: CallerIdMode,
    },

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl From<ContactStoreError> for BridgeError {
    fn from(err: ContactStoreError) -> Self {
        BridgeError::Sync(SyncError::Store(err))
    }
}

/// Error surface for the daemon runtime and its socket protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("contact store error: {0}")]
    ContactStore(#[from] ContactStoreError),

    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
