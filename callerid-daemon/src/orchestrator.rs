//! Sync orchestrator: runs one contact sync at a time, off the caller's thread.
//!
//! `Idle -> Running -> Idle`. A request arriving while `Running` is rejected
//! with [`SyncError::ConcurrentSyncRejected`] and starts nothing. The guard is
//! a compare-and-set on an [`AtomicBool`] and is released by an RAII guard, so
//! a panicking worker cannot leave it stuck.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

use callerid_core::{BatchConfig, ContactSyncPayload, GroupId, SourceId};
use callerid_sync::engine::ChunkReport;
use callerid_sync::progress::LogReporter;
use callerid_sync::{
    pipeline, state, ContactStore, ProgressEvent, ProgressReporter, ReconcileOptions, SyncError,
    SyncOutcome,
};

// ---------------------------------------------------------------------------
// Capability gate and keep-alive
// ---------------------------------------------------------------------------

/// Whether the process may read and write the contacts store.
pub trait CapabilityGate: Send + Sync {
    fn contacts_granted(&self) -> bool;
}

/// A gate fixed at construction, typically from `permissions.contacts`.
#[derive(Debug, Clone, Copy)]
pub struct StaticGate(pub bool);

impl CapabilityGate for StaticGate {
    fn contacts_granted(&self) -> bool {
        self.0
    }
}

/// Counts outstanding background work the process must stay alive for.
#[derive(Debug, Clone, Default)]
pub struct KeepAlive {
    held: Arc<AtomicUsize>,
}

impl KeepAlive {
    pub fn acquire(&self) -> KeepAliveToken {
        self.held.fetch_add(1, Ordering::SeqCst);
        KeepAliveToken {
            held: self.held.clone(),
        }
    }

    pub fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }
}

/// Released on drop.
#[derive(Debug)]
pub struct KeepAliveToken {
    held: Arc<AtomicUsize>,
}

impl Drop for KeepAliveToken {
    fn drop(&mut self) {
        self.held.fetch_sub(1, Ordering::SeqCst);
    }
}

struct FlightGuard {
    flag: Arc<AtomicBool>,
}

impl FlightGuard {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Completion signal of a started sync.
#[derive(Debug)]
pub struct SyncHandle {
    rx: oneshot::Receiver<Result<SyncOutcome, SyncError>>,
}

impl SyncHandle {
    pub async fn wait(self) -> Result<SyncOutcome, SyncError> {
        self.rx
            .await
            .map_err(|_| SyncError::Worker("sync worker exited without reporting".into()))?
    }

    /// Block the current thread until the sync finishes. Not for async contexts.
    pub fn wait_blocking(self) -> Result<SyncOutcome, SyncError> {
        self.rx
            .blocking_recv()
            .map_err(|_| SyncError::Worker("sync worker exited without reporting".into()))?
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct SyncOrchestrator<S> {
    store: Arc<Mutex<S>>,
    group: Arc<Mutex<Option<GroupId>>>,
    syncing: Arc<AtomicBool>,
    gate: Arc<dyn CapabilityGate>,
    keep_alive: KeepAlive,
    reporter: Arc<dyn ProgressReporter>,
    batch: BatchConfig,
    state_home: Option<PathBuf>,
}

impl<S: ContactStore + 'static> SyncOrchestrator<S> {
    pub fn new(store: S, gate: Arc<dyn CapabilityGate>, batch: BatchConfig) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            group: Arc::new(Mutex::new(None)),
            syncing: Arc::new(AtomicBool::new(false)),
            gate,
            keep_alive: KeepAlive::default(),
            reporter: Arc::new(LogReporter),
            batch,
            state_home: None,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: KeepAlive) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Persist run results under `home` and seed the group cache from there.
    pub fn with_state_home(mut self, home: PathBuf) -> Self {
        match state::load_at(&home) {
            Ok(saved) => *lock(&self.group) = saved.group_id,
            Err(err) => tracing::warn!(error = %err, "ignoring unreadable sync state"),
        }
        self.state_home = Some(home);
        self
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    pub fn keep_alive(&self) -> &KeepAlive {
        &self.keep_alive
    }

    pub fn cached_group(&self) -> Option<GroupId> {
        *lock(&self.group)
    }

    /// Start a sync on a worker thread and return immediately.
    pub fn start_sync(
        &self,
        payload: ContactSyncPayload,
        vacation_mode_active: bool,
    ) -> Result<SyncHandle, SyncError> {
        let Some(flight) = FlightGuard::try_acquire(&self.syncing) else {
            tracing::warn!("contact sync already running; request rejected");
            return Err(SyncError::ConcurrentSyncRejected);
        };
        if !self.gate.contacts_granted() {
            tracing::warn!("contacts permission not granted; sync refused");
            return Err(SyncError::CapabilityDenied);
        }
        let token = self.keep_alive.acquire();

        let (tx, rx) = oneshot::channel();
        let store = self.store.clone();
        let group = self.group.clone();
        let reporter = self.reporter.clone();
        let state_home = self.state_home.clone();
        let options = ReconcileOptions {
            vacation_mode_active,
            batch: self.batch.clone(),
        };

        let spawned = std::thread::Builder::new()
            .name("contact-sync".into())
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| {
                    run_sync(&store, &group, &payload, &options, reporter.as_ref())
                }))
                .unwrap_or_else(|panic| Err(SyncError::Worker(panic_message(&*panic))));

                match &result {
                    Ok(outcome) => {
                        reporter.report(ProgressEvent::Completed(outcome.report.clone()));
                        if let Some(home) = &state_home {
                            let recorded = state::record_run_at(
                                home,
                                outcome.group,
                                &outcome.report,
                                vacation_mode_active,
                            );
                            if let Err(err) = recorded {
                                tracing::warn!(error = %err, "failed to record sync state");
                            }
                        }
                    }
                    Err(err) => reporter.report(ProgressEvent::Failed {
                        message: err.to_string(),
                    }),
                }

                drop(flight);
                drop(token);
                let _ = tx.send(result);
            });

        match spawned {
            Ok(_) => Ok(SyncHandle { rx }),
            Err(err) => Err(SyncError::Worker(format!("failed to spawn sync worker: {err}"))),
        }
    }

    /// Delete every synced contact. Waits for a running sync to release the store.
    pub fn clear_contacts(&self) -> Result<ChunkReport, SyncError> {
        let cached = self.cached_group();
        let mut store = lock(&self.store);
        pipeline::clear_contacts(&mut *store, cached, &self.batch)
    }

    pub fn set_local_contact_blocked(
        &self,
        source_id: &SourceId,
        blocked: bool,
    ) -> Result<(), SyncError> {
        let cached = self.cached_group();
        let mut store = lock(&self.store);
        let group = pipeline::resolve_group(&mut *store, cached)?;
        *lock(&self.group) = Some(group);
        pipeline::set_local_contact_blocked(&mut *store, Some(group), source_id, blocked)
    }

    /// Run `f` with exclusive access to the store.
    pub fn with_store<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut lock(&self.store))
    }
}

fn run_sync<S: ContactStore>(
    store: &Mutex<S>,
    group: &Mutex<Option<GroupId>>,
    payload: &ContactSyncPayload,
    options: &ReconcileOptions,
    reporter: &dyn ProgressReporter,
) -> Result<SyncOutcome, SyncError> {
    let cached = *lock(group);
    let mut store = lock(store);
    let outcome = pipeline::sync_contacts(&mut *store, payload, options, cached, reporter)?;
    *lock(group) = Some(outcome.group);
    Ok(outcome)
}

// A panicked worker poisons the mutex; the data is still consistent because
// every store commit is all-or-nothing.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("sync worker panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("sync worker panicked: {s}")
    } else {
        "sync worker panicked".to_string()
    }
}
