//! Document-driven reloads: publish a caller list, reload the directory,
//! then drop the document.

use std::path::Path;

use callerid_core::CallerListPayload;

use crate::context::DirectoryContext;
use crate::document;
use crate::error::DirectoryError;
use crate::handler::{DirectoryHandler, RequestSummary};

/// Run one directory request against whatever document is published.
///
/// An unreadable document is logged and treated as absent. The document is
/// removed afterwards whatever the outcome.
pub fn reload_at<C: DirectoryContext + ?Sized>(
    home: &Path,
    handler: &mut DirectoryHandler,
    ctx: &mut C,
) -> Result<RequestSummary, DirectoryError> {
    let doc = document::read_at(home).unwrap_or_else(|e| {
        tracing::warn!("ignoring unreadable caller list document: {}", e);
        None
    });
    let result = handler.begin_request(doc.as_ref(), ctx);
    if let Err(e) = document::clear_at(home) {
        tracing::warn!("failed to remove caller list document: {}", e);
    }
    result
}

/// Validate and publish `payload`, then reload.
pub fn set_caller_list_at<C: DirectoryContext + ?Sized>(
    home: &Path,
    handler: &mut DirectoryHandler,
    ctx: &mut C,
    payload: &CallerListPayload,
) -> Result<RequestSummary, DirectoryError> {
    payload.validate()?;
    document::write_at(home, payload)?;
    reload_at(home, handler, ctx)
}

/// Publish a `clearAll` document, then reload.
pub fn clear_caller_list_at<C: DirectoryContext + ?Sized>(
    home: &Path,
    handler: &mut DirectoryHandler,
    ctx: &mut C,
) -> Result<RequestSummary, DirectoryError> {
    tracing::info!("clearing caller list");
    document::write_clear_all_at(home)?;
    reload_at(home, handler, ctx)
}
