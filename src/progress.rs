//! Shared transfer counters and the progress stream.

use crate::types::ProgressSnapshot;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

/// Counters for one engine invocation, plus the sink their snapshots go to.
///
/// Every mutation is a single atomic add followed by a non-blocking publish,
/// so producers never wait on the consumer. A full sink drops the snapshot.
#[derive(Debug)]
pub struct ProgressAggregator {
    found: AtomicU64,
    /// Objects finished without error, skipped ones included.
    processed: AtomicU64,
    skipped: AtomicU64,
    bytes: AtomicU64,
    errors: AtomicU64,
    sink: Option<mpsc::Sender<ProgressSnapshot>>,
}

impl ProgressAggregator {
    pub fn new(sink: Option<mpsc::Sender<ProgressSnapshot>>) -> Self {
        Self {
            found: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            sink,
        }
    }

    /// An object was queued for download.
    pub fn record_found(&self) {
        self.found.fetch_add(1, Ordering::SeqCst);
        self.publish();
    }

    /// An object was left alone because it already exists locally.
    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        self.processed.fetch_add(1, Ordering::SeqCst);
        self.publish();
    }

    /// An object of `bytes` bytes was transferred.
    pub fn record_downloaded(&self, bytes: u64) {
        self.processed.fetch_add(1, Ordering::SeqCst);
        self.bytes.fetch_add(bytes, Ordering::SeqCst);
        self.publish();
    }

    /// Counts one failure. Never lossy, unlike error details.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.publish();
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::SeqCst)
    }

    /// Reads the counters one at a time.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let skipped = self.skipped.load(Ordering::SeqCst);
        let processed = self.processed.load(Ordering::SeqCst);
        ProgressSnapshot {
            files_found: self.found.load(Ordering::SeqCst),
            files_downloaded: processed.saturating_sub(skipped),
            files_skipped: skipped,
            total_bytes: self.bytes.load(Ordering::SeqCst),
            error_count: self.errors.load(Ordering::SeqCst),
        }
    }

    /// Offers the current snapshot to the sink without waiting.
    ///
    /// Returns whether the snapshot was accepted.
    pub fn publish(&self) -> bool {
        let Some(sink) = &self.sink else {
            return false;
        };
        match sink.try_send(self.snapshot()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!("Progress sink full, dropping snapshot");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}
