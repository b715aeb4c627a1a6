//! # callerid-sync
//!
//! Contact-store reconciliation: diff the namespace group against a sync
//! payload and converge it through chunked, atomic batches.
//!
//! Call [`pipeline::sync_contacts`] for a full run. The lower-level pieces
//! ([`diff::compute_diff`], [`engine::Reconciler`]) are public for callers
//! that drive passes themselves.

pub mod diff;
pub mod engine;
pub mod error;
pub mod local_store;
pub mod ops;
pub mod pipeline;
pub mod progress;
pub mod sink;
pub mod state;
pub mod transform;

pub use engine::{ChunkReport, ReconcileOptions, Reconciler, SyncPlan, SyncReport};
pub use error::{ContactStoreError, SyncError};
pub use local_store::LocalContactStore;
pub use pipeline::{clear_contacts, set_local_contact_blocked, sync_contacts, SyncOutcome};
pub use progress::{ProgressEvent, ProgressReporter};
pub use sink::{ContactStore, ExistingContact};
