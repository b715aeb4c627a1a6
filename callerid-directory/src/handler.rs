//! Directory request handler.
//!
//! Turns the shared caller list document into entry operations against a
//! [`DirectoryContext`]:
//!
//! 1. `clearAll` removes every entry, in either mode.
//! 2. A non-incremental request rebuilds from scratch: every live item, sorted
//!    ascending by number, submitted in passes of `batch_size`.
//! 3. An incremental `allAllowed` / `allBlocked` request (vacation toggle)
//!    drops all blocking / identification entries, then re-adds every live item.
//! 4. Any other incremental request applies each item by its
//!    `(isBlocked, isRemoved)` pair.
//!
//! If the host rejects the request, every entry is removed and the rejection
//! is returned. A directory is never left half-applied.

use std::collections::{BTreeMap, BTreeSet};

use callerid_core::{CallerItem, CallerListPayload, CallerListType};

use crate::context::DirectoryContext;
use crate::error::DirectoryError;

/// Which branch a request took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// No document was available; the request completed empty.
    NoDocument,
    ClearAll,
    FullRebuild,
    /// `allAllowed` or `allBlocked` on an incremental directory.
    VacationToggle(CallerListType),
    Incremental,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSummary {
    pub kind: RequestKind,
    pub blocking_added: usize,
    pub identification_added: usize,
    pub removed: usize,
    /// Items whose number does not fit a directory entry.
    pub skipped: usize,
}

impl RequestSummary {
    fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            blocking_added: 0,
            identification_added: 0,
            removed: 0,
            skipped: 0,
        }
    }

    pub fn added(&self) -> usize {
        self.blocking_added + self.identification_added
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryHandler {
    caller_list_type: CallerListType,
    batch_size: usize,
}

impl Default for DirectoryHandler {
    fn default() -> Self {
        Self::new(5000)
    }
}

impl DirectoryHandler {
    pub fn new(batch_size: usize) -> Self {
        Self {
            caller_list_type: CallerListType::Default,
            batch_size: batch_size.max(1),
        }
    }

    /// Type of the last document seen. Starts as `default`.
    pub fn caller_list_type(&self) -> CallerListType {
        self.caller_list_type
    }

    /// Serve one directory request.
    pub fn begin_request<C: DirectoryContext + ?Sized>(
        &mut self,
        document: Option<&CallerListPayload>,
        ctx: &mut C,
    ) -> Result<RequestSummary, DirectoryError> {
        let summary = match document {
            None => {
                tracing::info!("no caller list document; completing empty request");
                RequestSummary::new(RequestKind::NoDocument)
            }
            Some(doc) => {
                self.caller_list_type = doc.list_type;
                self.submit(doc, ctx)
            }
        };

        match ctx.complete_request() {
            Ok(()) => {
                tracing::info!(
                    "directory request done ({:?}): {} blocking, {} identification added, {} removed",
                    summary.kind,
                    summary.blocking_added,
                    summary.identification_added,
                    summary.removed
                );
                Ok(summary)
            }
            Err(rejection) => {
                tracing::error!("directory request failed: {}", rejection);
                ctx.remove_all_blocking_entries();
                ctx.remove_all_identification_entries();
                if let Err(again) = ctx.complete_request() {
                    tracing::error!("clearing directory after rejection failed: {}", again);
                }
                Err(DirectoryError::Rejected(rejection))
            }
        }
    }

    fn submit<C: DirectoryContext + ?Sized>(
        &self,
        doc: &CallerListPayload,
        ctx: &mut C,
    ) -> RequestSummary {
        if doc.list_type == CallerListType::ClearAll {
            tracing::info!("removing all blocking and identification entries");
            ctx.remove_all_identification_entries();
            ctx.remove_all_blocking_entries();
            return RequestSummary::new(RequestKind::ClearAll);
        }

        if !ctx.is_incremental() {
            let mut summary = RequestSummary::new(RequestKind::FullRebuild);
            self.add_all(&doc.items, ctx, &mut summary);
            return summary;
        }

        match doc.list_type {
            CallerListType::AllAllowed | CallerListType::AllBlocked => {
                let mut summary = RequestSummary::new(RequestKind::VacationToggle(doc.list_type));
                if doc.list_type == CallerListType::AllAllowed {
                    tracing::info!("removing all blocking entries");
                    ctx.remove_all_blocking_entries();
                } else {
                    tracing::info!("removing all identification entries");
                    ctx.remove_all_identification_entries();
                }
                self.add_all(&doc.items, ctx, &mut summary);
                summary
            }
            _ => {
                let mut summary = RequestSummary::new(RequestKind::Incremental);
                apply_incremental(&doc.items, ctx, &mut summary);
                summary
            }
        }
    }

    fn add_all<C: DirectoryContext + ?Sized>(
        &self,
        items: &[CallerItem],
        ctx: &mut C,
        summary: &mut RequestSummary,
    ) {
        let (blocking, identification) = live_entries(items, summary);
        tracing::info!(
            "adding {} blocking and {} identification entries",
            blocking.len(),
            identification.len()
        );

        let blocking: Vec<u64> = blocking.into_iter().collect();
        for (i, pass) in blocking.chunks(self.batch_size).enumerate() {
            for number in pass {
                ctx.add_blocking_entry(*number);
            }
            tracing::debug!("blocking pass {}: {} entries", i + 1, pass.len());
        }
        summary.blocking_added += blocking.len();

        let identification: Vec<(u64, &str)> = identification.into_iter().collect();
        for (i, pass) in identification.chunks(self.batch_size).enumerate() {
            for (number, label) in pass {
                ctx.add_identification_entry(*number, label);
            }
            tracing::debug!("identification pass {}: {} entries", i + 1, pass.len());
        }
        summary.identification_added += identification.len();
    }
}

fn entry_number(item: &CallerItem, summary: &mut RequestSummary) -> Option<u64> {
    let number = item.phonenumber.as_u64();
    if number.is_none() {
        tracing::warn!("skipping '{}': not a directory number", item.phonenumber);
        summary.skipped += 1;
    }
    number
}

/// Live items split by kind and keyed by number, so iteration is ascending.
/// A number listed twice keeps its last label.
fn live_entries<'a>(
    items: &'a [CallerItem],
    summary: &mut RequestSummary,
) -> (BTreeSet<u64>, BTreeMap<u64, &'a str>) {
    let mut blocking = BTreeSet::new();
    let mut identification = BTreeMap::new();
    for item in items.iter().filter(|i| !i.is_removed) {
        let Some(number) = entry_number(item, summary) else {
            continue;
        };
        if item.is_blocked {
            blocking.insert(number);
        } else {
            identification.insert(number, item.label.as_str());
        }
    }
    (blocking, identification)
}

// Removals go first, in document order; additions follow in ascending order.
fn apply_incremental<C: DirectoryContext + ?Sized>(
    items: &[CallerItem],
    ctx: &mut C,
    summary: &mut RequestSummary,
) {
    for item in items.iter().filter(|i| i.is_removed) {
        let Some(number) = entry_number(item, summary) else {
            continue;
        };
        if item.is_blocked {
            tracing::debug!("remove blocking entry {} {}", item.label, number);
            ctx.remove_blocking_entry(number);
        } else {
            tracing::debug!("remove identification entry {} {}", item.label, number);
            ctx.remove_identification_entry(number);
        }
        summary.removed += 1;
    }

    let (blocking, identification) = live_entries(items, summary);
    for number in &blocking {
        ctx.add_blocking_entry(*number);
    }
    for (number, label) in &identification {
        ctx.add_identification_entry(*number, label);
    }
    summary.blocking_added += blocking.len();
    summary.identification_added += identification.len();
}
