//! Progress reporting for long sync runs.
//!
//! The engine only emits events; rendering them (notification, toast, log
//! line) is the reporter's business.

use std::sync::mpsc::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::engine::SyncReport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started { total: usize },
    Advanced { processed: usize, total: usize, percent: u8 },
    Completed(SyncReport),
    Failed { message: String },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

/// Writes events to the log facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { total } => tracing::info!("sync started: {} operations", total),
            ProgressEvent::Advanced { percent, .. } => tracing::info!("sync progress: {}%", percent),
            ProgressEvent::Completed(report) => tracing::info!(
                "sync complete: {} inserted, {} updated, {} deleted, {} failed batches",
                report.inserted.applied,
                report.updated.applied,
                report.deleted.applied,
                report.failed_batches()
            ),
            ProgressEvent::Failed { message } => tracing::error!("sync failed: {}", message),
        }
    }
}

/// Forwards events over a std channel. Once the receiver is gone, events
/// are dropped and the first loss is logged.
#[derive(Debug)]
pub struct ChannelReporter {
    tx: Mutex<Sender<ProgressEvent>>,
    disconnected: AtomicBool,
}

impl ChannelReporter {
    pub fn new(tx: Sender<ProgressEvent>) -> Self {
        Self {
            tx: Mutex::new(tx),
            disconnected: AtomicBool::new(false),
        }
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Relaxed)
    }
}

impl ProgressReporter for ChannelReporter {
    fn report(&self, event: ProgressEvent) {
        let Ok(tx) = self.tx.lock() else {
            return;
        };
        if tx.send(event).is_err() && !self.disconnected.swap(true, Ordering::Relaxed) {
            tracing::debug!("progress receiver dropped; discarding further events");
        }
    }
}

/// `processed * 100 / total`, truncated. An empty run counts as done.
pub fn percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let p = processed.min(total) * 100 / total;
    p as u8
}

/// Counts processed operations and emits `Advanced` events.
///
/// Silent unless `total` exceeds `threshold`.
pub struct ProgressTracker<'a> {
    reporter: &'a dyn ProgressReporter,
    total: usize,
    processed: usize,
    enabled: bool,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(reporter: &'a dyn ProgressReporter, total: usize, threshold: usize) -> Self {
        let enabled = total > threshold;
        if enabled {
            reporter.report(ProgressEvent::Started { total });
        }
        Self {
            reporter,
            total,
            processed: 0,
            enabled,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn advance(&mut self, n: usize) {
        self.processed += n;
        if self.enabled {
            self.reporter.report(ProgressEvent::Advanced {
                processed: self.processed,
                total: self.total,
                percent: percent(self.processed, self.total),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn percent_truncates() {
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 66);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn small_runs_stay_silent() {
        let (tx, rx) = mpsc::channel();
        let reporter = ChannelReporter::new(tx);
        let mut tracker = ProgressTracker::new(&reporter, 100, 100);
        tracker.advance(100);
        assert!(!tracker.enabled());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_receiver_is_noted_once() {
        let (tx, rx) = mpsc::channel();
        let reporter = ChannelReporter::new(tx);
        reporter.report(ProgressEvent::Started { total: 1 });
        assert!(!reporter.is_disconnected());
        drop(rx);
        reporter.report(ProgressEvent::Started { total: 1 });
        reporter.report(ProgressEvent::Failed { message: "late".into() });
        assert!(reporter.is_disconnected());
    }

    #[test]
    fn large_runs_report_each_advance() {
        let (tx, rx) = mpsc::channel();
        let reporter = ChannelReporter::new(tx);
        let mut tracker = ProgressTracker::new(&reporter, 250, 100);
        tracker.advance(100);
        tracker.advance(100);
        tracker.advance(50);
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events[0], ProgressEvent::Started { total: 250 });
        assert_eq!(
            events[1..],
            [
                ProgressEvent::Advanced { processed: 100, total: 250, percent: 40 },
                ProgressEvent::Advanced { processed: 200, total: 250, percent: 80 },
                ProgressEvent::Advanced { processed: 250, total: 250, percent: 100 },
            ]
        );
    }
}
