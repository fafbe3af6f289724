//! Fixed-size pool of download workers.

use crate::collector::ErrorCollector;
use crate::download::{ObjectFetcher, ObjectStatus};
use crate::error::TransferError;
use crate::progress::ProgressAggregator;
use crate::types::ObjectDescriptor;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type TaskQueue = Arc<Mutex<mpsc::Receiver<ObjectDescriptor>>>;

/// Consumers of the task queue.
///
/// Workers race for queue items and never talk to each other; the counters
/// and the local filesystem are the only things they share.
pub struct DownloadWorkerPool {
    fetcher: Arc<ObjectFetcher>,
    progress: Arc<ProgressAggregator>,
    errors: ErrorCollector,
    cancel: CancellationToken,
    workers: usize,
}

impl DownloadWorkerPool {
    pub fn new(
        fetcher: Arc<ObjectFetcher>,
        progress: Arc<ProgressAggregator>,
        errors: ErrorCollector,
        cancel: CancellationToken,
        workers: usize,
    ) -> Self {
        Self {
            fetcher,
            progress,
            errors,
            cancel,
            workers: workers.max(1),
        }
    }

    /// Runs every worker until the queue is closed and drained, or until the
    /// token fires. Returns once all workers have stopped, with the number of
    /// objects that reached a final state (downloaded, skipped or failed).
    pub async fn run(self, queue: mpsc::Receiver<ObjectDescriptor>) -> u64 {
        let queue: TaskQueue = Arc::new(Mutex::new(queue));
        let mut workers = JoinSet::new();

        for id in 0..self.workers {
            let worker = Worker {
                id,
                queue: Arc::clone(&queue),
                fetcher: Arc::clone(&self.fetcher),
                progress: Arc::clone(&self.progress),
                errors: self.errors.clone(),
                cancel: self.cancel.clone(),
            };
            workers.spawn(worker.run());
        }

        let mut settled = 0u64;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(count) => settled += count,
                Err(e) => {
                    warn!("Download worker ended abnormally: {}", e);
                    self.errors.report(TransferError::TaskFailed(e.to_string()));
                }
            }
        }
        settled
    }
}

struct Worker {
    id: usize,
    queue: TaskQueue,
    fetcher: Arc<ObjectFetcher>,
    progress: Arc<ProgressAggregator>,
    errors: ErrorCollector,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) -> u64 {
        let mut settled = 0u64;

        while !self.cancel.is_cancelled() {
            let Some(object) = self.next_task().await else {
                break;
            };

            match self.fetcher.fetch(&object).await {
                Ok(ObjectStatus::Downloaded) => self.progress.record_downloaded(object.size),
                Ok(ObjectStatus::Skipped) => self.progress.record_skipped(),
                Err(e) if e.is_canceled() => {
                    debug!("Worker {} aborted {} on cancellation", self.id, object.key);
                    break;
                }
                Err(e) => {
                    warn!("Worker {} failed on {}: {}", self.id, object.key, e);
                    self.errors.report(e);
                }
            }
            settled += 1;
        }

        debug!("Worker {} stopped after {} objects", self.id, settled);
        settled
    }

    /// Waits for the next descriptor; `None` once the queue is closed and
    /// empty or the token fires.
    async fn next_task(&self) -> Option<ObjectDescriptor> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            task = async { self.queue.lock().await.recv().await } => task,
        }
    }
}
