//! Request bridge: the operations the application calls, gated by mode.
//!
//! Caller-list operations drive the caller list store and the call
//! directory; contact operations drive the [`SyncOrchestrator`]. Each side
//! only runs in the modes it applies to.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use callerid_core::caller_store::ApplyReport;
use callerid_core::{
    paths, CallerIdConfig, CallerIdMode, CallerListPayload, CallerListStore, CallerListType,
    CallerLookup, ContactSyncPayload, SourceId,
};
use callerid_directory::{
    clear_caller_list_at, document, reload_at, set_caller_list_at, DirectoryContext,
    DirectoryHandler, LocalDirectory, RequestSummary,
};
use callerid_sync::engine::ChunkReport;
use callerid_sync::LocalContactStore;

use crate::error::{BridgeError, DaemonError};
use crate::orchestrator::{StaticGate, SyncHandle, SyncOrchestrator};

/// Result of `setCallerList` / `clearCallerList`.
#[derive(Debug, Clone)]
pub struct CallerListOutcome {
    pub store: ApplyReport,
    pub directory: RequestSummary,
}

struct DirectorySide<D> {
    handler: DirectoryHandler,
    host: D,
}

pub struct CallerIdBridge<S, D> {
    home: PathBuf,
    mode: CallerIdMode,
    callers: Mutex<CallerListStore>,
    directory: Mutex<DirectorySide<D>>,
    orchestrator: SyncOrchestrator<S>,
}

impl CallerIdBridge<LocalContactStore, LocalDirectory> {
    /// Bridge over the file-backed stores under `<home>/.callerid/`.
    pub fn open_at(home: &Path, config: &CallerIdConfig) -> Result<Self, DaemonError> {
        let contacts = LocalContactStore::open_at(&paths::contacts_store_path(home))?;
        let directory = LocalDirectory::open_at(&paths::directory_store_path(home))?;
        Ok(Self::new(home, config, contacts, directory))
    }
}

impl<S, D> CallerIdBridge<S, D>
where
    S: callerid_sync::ContactStore + 'static,
    D: DirectoryContext,
{
    pub fn new(home: &Path, config: &CallerIdConfig, contacts: S, directory: D) -> Self {
        let gate = Arc::new(StaticGate(config.permissions.contacts));
        let orchestrator = SyncOrchestrator::new(contacts, gate, config.batch.clone())
            .with_state_home(home.to_path_buf());
        let mode = config.caller_id_mode();
        tracing::info!(mode = mode.as_str(), "caller id bridge ready");
        Self {
            home: home.to_path_buf(),
            mode,
            callers: Mutex::new(CallerListStore::open_at(home)),
            directory: Mutex::new(DirectorySide {
                handler: DirectoryHandler::new(config.batch.directory_batch),
                host: directory,
            }),
            orchestrator,
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// `getCallerIdMode`.
    pub fn mode(&self) -> CallerIdMode {
        self.mode
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator<S> {
        &self.orchestrator
    }

    // -----------------------------------------------------------------------
    // Caller lists
    // -----------------------------------------------------------------------

    /// `setCallerList`: update the stored lists, then reload the directory.
    ///
    /// A directory that needs a full rebuild gets every live record from the
    /// store, not only this request's items.
    pub fn set_caller_list(
        &self,
        payload: &CallerListPayload,
    ) -> Result<CallerListOutcome, BridgeError> {
        self.require_not_work_profile("setCallerList")?;
        payload.validate()?;

        let mut side = lock(&self.directory);
        let (store, request) = {
            let mut callers = lock(&self.callers);
            let store = callers.apply_payload(payload);
            (store, directory_request(&callers, &side.host, payload))
        };
        let DirectorySide { handler, host } = &mut *side;
        let directory = set_caller_list_at(&self.home, handler, host, &request)?;
        Ok(CallerListOutcome { store, directory })
    }

    /// `clearCallerList`: drop both lists and every directory entry.
    pub fn clear_caller_list(&self) -> Result<CallerListOutcome, BridgeError> {
        self.require_not_work_profile("clearCallerList")?;
        lock(&self.callers).clear_all();

        let mut side = lock(&self.directory);
        let DirectorySide { handler, host } = &mut *side;
        let directory = clear_caller_list_at(&self.home, handler, host)?;
        Ok(CallerListOutcome {
            store: ApplyReport::default(),
            directory,
        })
    }

    /// Reload the directory from a document another process published.
    /// `None` when there is no document to consume.
    pub fn reload_directory(&self) -> Result<Option<RequestSummary>, BridgeError> {
        let mut side = lock(&self.directory);
        if !paths::shared_document_path(&self.home).exists() {
            return Ok(None);
        }
        if let Ok(Some(doc)) = document::read_at(&self.home) {
            let mut callers = lock(&self.callers);
            callers.apply_payload(&doc);
            if let Cow::Owned(snapshot) = directory_request(&callers, &side.host, &doc) {
                document::write_at(&self.home, &snapshot)?;
            }
        }
        let DirectorySide { handler, host } = &mut *side;
        Ok(Some(reload_at(&self.home, handler, host)?))
    }

    pub fn lookup(&self, number: &str) -> CallerLookup {
        lock(&self.callers).lookup(number)
    }

    /// Run `f` against the directory host.
    pub fn with_directory<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        f(&mut lock(&self.directory).host)
    }

    // -----------------------------------------------------------------------
    // Contacts
    // -----------------------------------------------------------------------

    /// `syncContacts`: start a background sync.
    pub fn sync_contacts(
        &self,
        payload: ContactSyncPayload,
        vacation_mode_active: bool,
    ) -> Result<SyncHandle, BridgeError> {
        self.require_work_profile("syncContacts")?;
        Ok(self.orchestrator.start_sync(payload, vacation_mode_active)?)
    }

    /// `clearContacts`.
    pub fn clear_contacts(&self) -> Result<ChunkReport, BridgeError> {
        self.require_work_profile("clearContacts")?;
        Ok(self.orchestrator.clear_contacts()?)
    }

    /// `blockLocalContact` / `unblockLocalContact`.
    pub fn set_local_contact_blocked(
        &self,
        source_id: &SourceId,
        blocked: bool,
    ) -> Result<(), BridgeError> {
        let operation = if blocked {
            "blockLocalContact"
        } else {
            "unblockLocalContact"
        };
        self.require_work_profile(operation)?;
        Ok(self.orchestrator.set_local_contact_blocked(source_id, blocked)?)
    }

    fn require_work_profile(&self, operation: &'static str) -> Result<(), BridgeError> {
        if self.mode == CallerIdMode::WorkProfile {
            Ok(())
        } else {
            Err(BridgeError::ModeNotSupported {
                operation,
                mode: self.mode,
            })
        }
    }

    fn require_not_work_profile(&self, operation: &'static str) -> Result<(), BridgeError> {
        if self.mode == CallerIdMode::WorkProfile {
            Err(BridgeError::ModeNotSupported {
                operation,
                mode: self.mode,
            })
        } else {
            Ok(())
        }
    }
}

/// What the directory host gets for `payload`: the payload itself when the
/// host applies deltas, otherwise the whole store.
fn directory_request<'p, D: DirectoryContext>(
    callers: &CallerListStore,
    host: &D,
    payload: &'p CallerListPayload,
) -> Cow<'p, CallerListPayload> {
    if host.is_incremental() || payload.list_type == CallerListType::ClearAll {
        return Cow::Borrowed(payload);
    }
    let snapshot = callers.snapshot(payload.list_type);
    tracing::info!(
        items = snapshot.items.len(),
        "directory needs a full rebuild; sending every stored caller"
    );
    Cow::Owned(snapshot)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
