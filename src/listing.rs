//! Paginated discovery of remote objects.

use crate::collector::ErrorCollector;
use crate::error::TransferError;
use crate::progress::ProgressAggregator;
use crate::store::ObjectStore;
use crate::types::ObjectDescriptor;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// How a listing pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingSummary {
    /// Objects pushed into the task queue.
    pub enqueued: u64,
    /// Stopped by the token or a closed queue before the listing was exhausted.
    pub interrupted: bool,
}

/// Producer side of the transfer pipeline.
///
/// Walks the listing of `bucket`/`prefix` page by page and pushes every file
/// into the task queue. A full queue blocks the lister; that is the only
/// backpressure between discovery and download.
pub struct ObjectLister {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
    progress: Arc<ProgressAggregator>,
    errors: ErrorCollector,
    cancel: CancellationToken,
}

impl ObjectLister {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        progress: Arc<ProgressAggregator>,
        errors: ErrorCollector,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: prefix.into(),
            progress,
            errors,
            cancel,
        }
    }

    /// Lists until the remote reports no more pages, listing fails, or the
    /// token fires. A listing failure counts as the end of the listing, not as
    /// an interruption.
    ///
    /// `queue` is dropped on return, which is the end-of-input signal for the
    /// workers whatever the reason for stopping.
    pub async fn run(self, queue: mpsc::Sender<ObjectDescriptor>) -> ListingSummary {
        let mut enqueued = 0u64;
        let interrupted = |enqueued| ListingSummary {
            enqueued,
            interrupted: true,
        };
        let mut continuation: Option<String> = None;
        let mut pages = 0u64;

        loop {
            let page = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("Listing canceled after {} pages", pages);
                    return interrupted(enqueued);
                }
                page = self.store.list_page(&self.bucket, &self.prefix, continuation.take()) => page,
            };

            let page = match page {
                Ok(page) => page,
                Err(e) => {
                    error!(
                        "Listing s3://{}/{} failed after {} pages: {}",
                        self.bucket, self.prefix, pages, e
                    );
                    self.errors.report(TransferError::Listing(e));
                    return ListingSummary {
                        enqueued,
                        interrupted: false,
                    };
                }
            };
            pages += 1;

            for object in page.objects {
                if object.is_directory_marker() {
                    continue;
                }

                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return interrupted(enqueued),
                    sent = queue.send(object) => {
                        if sent.is_err() {
                            // every worker is gone
                            return interrupted(enqueued);
                        }
                    }
                }
                enqueued += 1;
                self.progress.record_found();
            }

            match page.next_token {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        info!(
            "Listing of s3://{}/{} complete: {} objects in {} pages",
            self.bucket, self.prefix, enqueued, pages
        );
        ListingSummary {
            enqueued,
            interrupted: false,
        }
    }
}
