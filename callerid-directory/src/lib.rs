//! # callerid-directory
//!
//! Call directory adapter: turns caller list documents into blocking and
//! identification entries, with full-rebuild and incremental request modes.
//!
//! [`reload::set_caller_list_at`] is the usual entrypoint. The host side is
//! abstracted as [`DirectoryContext`]; [`LocalDirectory`] is the in-process
//! host used by the daemon, the CLI and tests.

pub mod context;
pub mod document;
pub mod error;
pub mod handler;
pub mod local;
pub mod reload;

pub use context::DirectoryContext;
pub use error::{DirectoryError, DirectoryRejection};
pub use handler::{DirectoryHandler, RequestKind, RequestSummary};
pub use local::{DirectoryEntries, LocalDirectory};
pub use reload::{clear_caller_list_at, reload_at, set_caller_list_at};
