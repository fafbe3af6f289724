//! Error types for transfer operations.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by an [`ObjectStore`](crate::store::ObjectStore) backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The service answered with an error response.
    #[error("{operation} failed: {code}: {message}")]
    Service {
        /// API operation that failed (e.g. `ListObjectsV2`).
        operation: &'static str,
        /// Service error code (e.g. `AccessDenied`).
        code: String,
        /// Human-readable message from the service.
        message: String,
    },

    /// The request never produced a service response (network, DNS, timeout, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The bucket does not exist or is not visible with these credentials.
    #[error("bucket '{0}' does not exist")]
    NoSuchBucket(String),

    /// Reading the object body failed mid-stream.
    #[error(transparent)]
    Body(#[from] io::Error),
}

/// Errors that can occur during a transfer.
#[derive(Error, Debug)]
pub enum TransferError {
    /// I/O error during file operations.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The bucket does not exist or the credentials cannot reach it.
    #[error("cannot access bucket '{bucket}': {source}")]
    BucketAccess {
        bucket: String,
        #[source]
        source: StoreError,
    },

    /// Parent directories for an object could not be created.
    #[error("failed to create directory for '{key}': {source}")]
    CreateDirectory {
        key: String,
        #[source]
        source: io::Error,
    },

    /// The local file for an object could not be created.
    #[error("failed to create file '{key}': {source}")]
    CreateFile {
        key: String,
        #[source]
        source: io::Error,
    },

    /// The object body could not be fetched or written.
    #[error("failed to download '{key}': {source}")]
    Download {
        key: String,
        #[source]
        source: StoreError,
    },

    /// The object did not finish within the per-object deadline.
    #[error("download of '{key}' timed out after {timeout:?}")]
    Timeout { key: String, timeout: Duration },

    /// Enumerating the remote objects failed.
    #[error("error listing objects: {0}")]
    Listing(#[source] StoreError),

    /// The key cannot be mapped to a path below the destination root.
    #[error("object key '{key}' does not map to a path inside the destination")]
    InvalidKey { key: String },

    /// Caller supplied unusable parameters.
    #[error("{0}")]
    InvalidInput(String),

    /// The operation was canceled.
    #[error("download operation canceled")]
    Canceled,

    /// One or more objects failed; carries the first error and the total count.
    #[error("encountered {error_count} errors during download. First error: {first}")]
    Aggregate {
        error_count: u64,
        #[source]
        first: Box<TransferError>,
    },

    /// A lister or worker task ended abnormally.
    #[error("transfer task failed: {0}")]
    TaskFailed(String),
}

impl TransferError {
    /// Whether this error is the cancellation signal rather than a failure.
    pub fn is_canceled(&self) -> bool {
        matches!(self, TransferError::Canceled)
    }
}
