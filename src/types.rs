//! Data structures for transfer operations.

use crate::error::TransferError;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default multi-part chunk size (10 MiB).
pub const DEFAULT_PART_SIZE: u64 = 10 * 1024 * 1024;

/// Default number of ranged requests in flight for one object.
pub const DEFAULT_PART_CONCURRENCY: usize = 10;

/// Default deadline for a single object.
pub const DEFAULT_OBJECT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default bound of the listing-to-worker task queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// A remote object discovered by the lister.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDescriptor {
    /// Remote key, `/`-delimited.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
}

impl ObjectDescriptor {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
        }
    }

    /// Zero-byte keys ending in `/` are folder placeholders, not files.
    pub fn is_directory_marker(&self) -> bool {
        self.size == 0 && self.key.ends_with('/')
    }
}

/// Tuning for one engine invocation.
///
/// # Example
///
/// ```
/// use s3fetch::TransferConfig;
/// use std::time::Duration;
///
/// let config = TransferConfig {
///     max_workers: 8,
///     per_object_timeout: Duration::from_secs(600),
///     ..TransferConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Number of download workers.
    ///
    /// Downloads are I/O-bound, so the default oversubscribes the CPU count
    /// (four workers per core).
    pub max_workers: usize,
    /// Objects larger than this are fetched as ranged parts of this size.
    pub part_size: u64,
    /// Ranged requests in flight per object.
    pub part_concurrency: usize,
    /// Deadline for one object, all of its parts included.
    pub per_object_timeout: Duration,
    /// Deadline for the whole invocation; expiry cancels it.
    pub overall_timeout: Option<Duration>,
    /// Bound of the task queue between lister and workers.
    pub queue_capacity: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            max_workers: cpus * 4,
            part_size: DEFAULT_PART_SIZE,
            part_concurrency: DEFAULT_PART_CONCURRENCY,
            per_object_timeout: DEFAULT_OBJECT_TIMEOUT,
            overall_timeout: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl TransferConfig {
    /// Rejects values that would stall or disable the engine.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.max_workers == 0 {
            return Err(TransferError::InvalidInput(
                "max_workers must be greater than zero".to_string(),
            ));
        }
        if self.part_size == 0 {
            return Err(TransferError::InvalidInput(
                "part_size must be greater than zero".to_string(),
            ));
        }
        if self.part_concurrency == 0 {
            return Err(TransferError::InvalidInput(
                "part_concurrency must be greater than zero".to_string(),
            ));
        }
        if self.per_object_timeout.is_zero() {
            return Err(TransferError::InvalidInput(
                "per_object_timeout must be greater than zero".to_string(),
            ));
        }
        if self.overall_timeout.is_some_and(|t| t.is_zero()) {
            return Err(TransferError::InvalidInput(
                "overall_timeout must be greater than zero".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(TransferError::InvalidInput(
                "queue_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// What to fetch and where to put it.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub bucket: String,
    pub prefix: String,
    /// Local root under which the key hierarchy is reproduced.
    pub destination: PathBuf,
    /// Replace files that already exist locally instead of skipping them.
    pub overwrite: bool,
}

impl TransferRequest {
    pub fn new(
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            destination: destination.into(),
            overwrite: false,
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Point-in-time view of the transfer counters.
///
/// Counters are read one by one, so a snapshot is not transactionally
/// consistent across fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub files_found: u64,
    /// Successful transfers only; skipped files are not included.
    pub files_downloaded: u64,
    pub files_skipped: u64,
    pub total_bytes: u64,
    pub error_count: u64,
}

/// Terminal result of one invocation.
///
/// Every variant carries the final counter values, so callers never depend on
/// the last progress snapshot having been delivered.
#[derive(Debug)]
pub enum TransferOutcome {
    Success {
        totals: ProgressSnapshot,
    },
    Canceled {
        totals: ProgressSnapshot,
    },
    Failed {
        first_error: TransferError,
        error_count: u64,
        totals: ProgressSnapshot,
    },
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Success { .. })
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, TransferOutcome::Canceled { .. })
    }

    /// Final counters of the invocation.
    pub fn totals(&self) -> ProgressSnapshot {
        match self {
            TransferOutcome::Success { totals }
            | TransferOutcome::Canceled { totals }
            | TransferOutcome::Failed { totals, .. } => *totals,
        }
    }

    /// Converts the outcome into a `Result`, summarising failures.
    pub fn into_result(self) -> Result<(), TransferError> {
        match self {
            TransferOutcome::Success { .. } => Ok(()),
            TransferOutcome::Canceled { .. } => Err(TransferError::Canceled),
            TransferOutcome::Failed {
                first_error,
                error_count,
                ..
            } => Err(TransferError::Aggregate {
                error_count,
                first: Box::new(first_error),
            }),
        }
    }
}
