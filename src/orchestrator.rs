//! Top-level transfer orchestration.

use crate::collector::ErrorCollector;
use crate::download::ObjectFetcher;
use crate::error::TransferError;
use crate::fsutil::{ensure_directory_exists, file_exists};
use crate::listing::ObjectLister;
use crate::progress::ProgressAggregator;
use crate::store::ObjectStore;
use crate::types::{ProgressSnapshot, TransferConfig, TransferOutcome, TransferRequest};
use crate::worker::DownloadWorkerPool;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Entry point for bulk downloads from one storage backend.
///
/// # Example
///
/// ```no_run
/// use s3fetch::{Downloader, S3ClientConfig, S3Store, TransferConfig, TransferRequest};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = S3Store::connect(&S3ClientConfig {
///     region: "us-east-1".to_string(),
///     ..S3ClientConfig::default()
/// })
/// .await?;
/// let downloader = Downloader::new(Arc::new(store), TransferConfig::default());
///
/// let request = TransferRequest::new("my-bucket", "logs/2024/", "./logs");
/// let outcome = downloader
///     .run(&request, None, CancellationToken::new())
///     .await;
/// outcome.into_result()?;
/// # Ok(())
/// # }
/// ```
pub struct Downloader {
    store: Arc<dyn ObjectStore>,
    config: TransferConfig,
}

impl Downloader {
    pub fn new(store: Arc<dyn ObjectStore>, config: TransferConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Checks that `bucket` exists and is reachable with the current client.
    pub async fn validate_bucket_exists(&self, bucket: &str) -> Result<(), TransferError> {
        if bucket.is_empty() {
            return Err(TransferError::InvalidInput(
                "S3 bucket name cannot be empty".to_string(),
            ));
        }
        self.store
            .head_bucket(bucket)
            .await
            .map_err(|source| TransferError::BucketAccess {
                bucket: bucket.to_string(),
                source,
            })
    }

    /// Lists the sub-prefixes directly below `prefix`.
    pub async fn list_prefixes(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<String>, TransferError> {
        if bucket.is_empty() {
            return Err(TransferError::InvalidInput(
                "S3 bucket name cannot be empty".to_string(),
            ));
        }
        self.store
            .list_prefixes(bucket, prefix)
            .await
            .map_err(TransferError::Listing)
    }

    /// Downloads every object under the request's prefix.
    ///
    /// Snapshots are offered to `progress` without ever blocking; a slow
    /// consumer only misses intermediate updates. `cancel` stops the listing,
    /// stops workers from taking new objects and aborts transfers in flight.
    ///
    /// Returns after the lister and every worker have stopped.
    pub async fn run(
        &self,
        request: &TransferRequest,
        progress: Option<mpsc::Sender<ProgressSnapshot>>,
        cancel: CancellationToken,
    ) -> TransferOutcome {
        run(
            Arc::clone(&self.store),
            request,
            &self.config,
            progress,
            cancel,
        )
        .await
    }
}

/// Runs one transfer invocation.
///
/// Listing and downloading run concurrently: one lister task feeds a bounded
/// queue drained by `config.max_workers` workers. Errors are collected until
/// both have stopped, then a single outcome is built.
///
/// # Arguments
///
/// * `store` - Authenticated storage client
/// * `request` - Bucket, prefix, destination root and overwrite flag
/// * `config` - Worker and transfer tuning
/// * `progress` - Optional sink for non-blocking progress snapshots
/// * `cancel` - Stops the run at the next checkpoint when triggered
///
/// # Returns
///
/// `Canceled` if the token (or the overall deadline) fired before every listed
/// object settled, `Failed` with the first error and the total error count if
/// anything failed, `Success` otherwise. Each variant carries the final totals.
pub async fn run(
    store: Arc<dyn ObjectStore>,
    request: &TransferRequest,
    config: &TransferConfig,
    progress: Option<mpsc::Sender<ProgressSnapshot>>,
    cancel: CancellationToken,
) -> TransferOutcome {
    if let Err(e) = prepare(request, config).await {
        error!("Transfer not started: {}", e);
        return TransferOutcome::Failed {
            first_error: e,
            error_count: 1,
            totals: ProgressSnapshot {
                error_count: 1,
                ..ProgressSnapshot::default()
            },
        };
    }

    let started = Instant::now();
    // a child token, so the overall deadline cancels this invocation only
    let cancel = cancel.child_token();
    let progress = Arc::new(ProgressAggregator::new(progress));
    let (errors, error_drain) = ErrorCollector::new(config.max_workers, Arc::clone(&progress));
    let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);

    info!(
        "Downloading s3://{}/{} to {:?} with {} workers (overwrite: {})",
        request.bucket, request.prefix, request.destination, config.max_workers, request.overwrite
    );

    let lister = ObjectLister::new(
        Arc::clone(&store),
        request.bucket.clone(),
        request.prefix.clone(),
        Arc::clone(&progress),
        errors.clone(),
        cancel.clone(),
    );
    let fetcher = Arc::new(ObjectFetcher::new(
        store,
        request.bucket.clone(),
        request.destination.clone(),
        request.overwrite,
        config.clone(),
        cancel.clone(),
    ));
    let pool = DownloadWorkerPool::new(
        fetcher,
        Arc::clone(&progress),
        errors.clone(),
        cancel.clone(),
        config.max_workers,
    );

    let lister_task = tokio::spawn(lister.run(queue_tx));
    let pool_task = tokio::spawn(pool.run(queue_rx));

    let work = async { (lister_task.await, pool_task.await) };
    tokio::pin!(work);

    let (listed, pooled) = match config.overall_timeout {
        Some(deadline) => tokio::select! {
            joined = &mut work => joined,
            _ = tokio::time::sleep(deadline) => {
                warn!(
                    "Overall deadline of {} reached, canceling",
                    humantime::format_duration(deadline)
                );
                cancel.cancel();
                work.await
            }
        },
        None => work.await,
    };

    // Draining: every producer has stopped once both tasks are joined.
    let listing_exhausted = match listed {
        Ok(summary) => !summary.interrupted,
        Err(e) => {
            errors.report(TransferError::TaskFailed(format!("lister: {}", e)));
            false
        }
    };
    let settled = match pooled {
        Ok(settled) => settled,
        Err(e) => {
            errors.report(TransferError::TaskFailed(format!("worker pool: {}", e)));
            0
        }
    };
    drop(errors);
    let collected = error_drain.drain().await;

    progress.publish();
    let totals = progress.snapshot();
    let elapsed = humantime::format_duration(std::time::Duration::from_secs(
        started.elapsed().as_secs(),
    ));

    // A stop request that lands after the last object settled does not undo
    // a completed run.
    let completed = listing_exhausted && settled == totals.files_found;
    if cancel.is_cancelled() && !completed {
        info!(
            "Transfer canceled after {}: {} downloaded, {} skipped of {} found",
            elapsed, totals.files_downloaded, totals.files_skipped, totals.files_found
        );
        return TransferOutcome::Canceled { totals };
    }

    let error_count = progress.error_count();
    if error_count > 0 {
        let first_error = collected.into_iter().next().unwrap_or_else(|| {
            TransferError::TaskFailed(format!("{} errors, details dropped", error_count))
        });
        error!(
            "Transfer finished in {} with {} errors, first: {}",
            elapsed, error_count, first_error
        );
        return TransferOutcome::Failed {
            first_error,
            error_count,
            totals,
        };
    }

    info!(
        "Transfer complete in {}: {} downloaded ({} bytes), {} skipped",
        elapsed, totals.files_downloaded, totals.total_bytes, totals.files_skipped
    );
    TransferOutcome::Success { totals }
}

/// Validates inputs and makes sure the destination root exists.
async fn prepare(request: &TransferRequest, config: &TransferConfig) -> Result<(), TransferError> {
    if request.bucket.is_empty() {
        return Err(TransferError::InvalidInput(
            "S3 bucket name cannot be empty".to_string(),
        ));
    }
    if request.destination.as_os_str().is_empty() {
        return Err(TransferError::InvalidInput(
            "download path cannot be empty".to_string(),
        ));
    }
    config.validate()?;

    if !file_exists(&request.destination).await {
        ensure_directory_exists(&request.destination)
            .await
            .map_err(|e| {
                TransferError::InvalidInput(format!(
                    "download path doesn't exist and couldn't be created: {}",
                    e
                ))
            })?;
    }
    Ok(())
}
