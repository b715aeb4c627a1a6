//! On-disk layout under `<home>/.callerid/`.
//!
//! ```text
//! ~/.callerid/
//!   config.yaml
//!   callers/
//!     allowedCallers.jsonl
//!     blockedCallers.jsonl
//!   contacts.json        (file-backed contacts store)
//!   directory.json       (file-backed call directory)
//!   sync_state.json
//!   shared/callerId.json (directory document shared with the extension)
//!   daemon.sock
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::StoreError;

pub const DAEMON_LABEL: &str = "dev.callerid.daemon";
pub const DAEMON_SOCKET: &str = "daemon.sock";
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

pub fn callerid_root(home: &Path) -> PathBuf {
    home.join(".callerid")
}

pub fn config_path(home: &Path) -> PathBuf {
    callerid_root(home).join("config.yaml")
}

pub fn callers_dir(home: &Path) -> PathBuf {
    callerid_root(home).join("callers")
}

pub fn contacts_store_path(home: &Path) -> PathBuf {
    callerid_root(home).join("contacts.json")
}

pub fn directory_store_path(home: &Path) -> PathBuf {
    callerid_root(home).join("directory.json")
}

pub fn sync_state_path(home: &Path) -> PathBuf {
    callerid_root(home).join("sync_state.json")
}

pub fn shared_dir(home: &Path) -> PathBuf {
    callerid_root(home).join("shared")
}

pub fn shared_document_path(home: &Path) -> PathBuf {
    shared_dir(home).join("callerId.json")
}

pub fn socket_path(home: &Path) -> PathBuf {
    callerid_root(home).join(DAEMON_SOCKET)
}

/// Home directory of the current user.
pub fn home() -> Result<PathBuf, StoreError> {
    dirs::home_dir().ok_or(StoreError::HomeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted_under_dot_callerid() {
        let home = Path::new("/home/u");
        assert_eq!(config_path(home), PathBuf::from("/home/u/.callerid/config.yaml"));
        assert!(shared_document_path(home).ends_with(".callerid/shared/callerId.json"));
        assert!(socket_path(home).ends_with(".callerid/daemon.sock"));
    }
}
