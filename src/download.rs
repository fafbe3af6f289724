//! Single-object download.

use crate::error::{StoreError, TransferError};
use crate::fsutil::{ensure_directory_exists, file_exists, resolve_local_path};
use crate::store::{ByteRange, ObjectStore};
use crate::types::{ObjectDescriptor, TransferConfig};
use futures_util::stream::{self, StreamExt};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter, SeekFrom};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Write buffer per open file (1 MiB).
const WRITE_BUFFER_SIZE: usize = 1024 * 1024;

/// What happened to an object that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectStatus {
    /// Bytes were fetched into the local file.
    Downloaded,
    /// A local file already existed and overwriting is off.
    Skipped,
}

/// Downloads objects of one bucket into one destination root.
pub struct ObjectFetcher {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    destination: PathBuf,
    overwrite: bool,
    config: TransferConfig,
    cancel: CancellationToken,
}

impl ObjectFetcher {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        destination: impl Into<PathBuf>,
        overwrite: bool,
        config: TransferConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            destination: destination.into(),
            overwrite,
            config,
            cancel,
        }
    }

    /// Resolves the local path, creates its parents, then skips or downloads.
    ///
    /// Nothing is retried. On any transfer failure, including the deadline
    /// and cancellation, the partial file is removed.
    pub async fn fetch(&self, object: &ObjectDescriptor) -> Result<ObjectStatus, TransferError> {
        let local_path = resolve_local_path(&self.destination, &object.key)?;

        if let Some(parent) = local_path.parent() {
            ensure_directory_exists(parent)
                .await
                .map_err(|source| TransferError::CreateDirectory {
                    key: object.key.clone(),
                    source,
                })?;
        }

        if !self.overwrite && file_exists(&local_path).await {
            debug!("Skipping {}: {:?} already exists", object.key, local_path);
            return Ok(ObjectStatus::Skipped);
        }

        self.download_to(object, &local_path).await?;
        Ok(ObjectStatus::Downloaded)
    }

    async fn download_to(
        &self,
        object: &ObjectDescriptor,
        local_path: &Path,
    ) -> Result<(), TransferError> {
        let file = File::create(local_path)
            .await
            .map_err(|source| TransferError::CreateFile {
                key: object.key.clone(),
                source,
            })?;

        debug!(
            "Downloading {} ({} bytes) to {:?}",
            object.key, object.size, local_path
        );

        let timeout = self.config.per_object_timeout;
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TransferError::Canceled),
            res = tokio::time::timeout(timeout, self.write_body(object, file, local_path)) => {
                match res {
                    Ok(res) => res,
                    Err(_) => Err(TransferError::Timeout {
                        key: object.key.clone(),
                        timeout,
                    }),
                }
            }
        };

        if result.is_err() {
            if let Err(e) = tokio::fs::remove_file(local_path).await {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove partial file {:?}: {}", local_path, e);
                }
            }
        }
        result
    }

    async fn write_body(
        &self,
        object: &ObjectDescriptor,
        file: File,
        local_path: &Path,
    ) -> Result<(), TransferError> {
        if object.size <= self.config.part_size {
            return self.write_whole(object, file).await;
        }

        file.set_len(object.size).await?;
        drop(file);

        let parts = ByteRange::split(object.size, self.config.part_size);
        debug!(
            "Fetching {} in {} parts of up to {} bytes",
            object.key,
            parts.len(),
            self.config.part_size
        );

        let mut pending = stream::iter(parts)
            .map(|range| self.write_part(object, local_path, range))
            .buffer_unordered(self.config.part_concurrency);

        // dropping `pending` on the first error aborts the remaining parts
        while let Some(part) = pending.next().await {
            part?;
        }
        Ok(())
    }

    async fn write_whole(&self, object: &ObjectDescriptor, file: File) -> Result<(), TransferError> {
        let mut body = self
            .store
            .get_object(&self.bucket, &object.key, None)
            .await
            .map_err(|source| download_error(object, source))?;

        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
        tokio::io::copy(&mut body, &mut writer)
            .await
            .map_err(|e| download_error(object, StoreError::Body(e)))?;
        writer.flush().await?;
        Ok(())
    }

    async fn write_part(
        &self,
        object: &ObjectDescriptor,
        local_path: &Path,
        range: ByteRange,
    ) -> Result<(), TransferError> {
        let mut body = self
            .store
            .get_object(&self.bucket, &object.key, Some(range))
            .await
            .map_err(|source| download_error(object, source))?;

        let mut file = OpenOptions::new().write(true).open(local_path).await?;
        file.seek(SeekFrom::Start(range.start)).await?;
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);

        let written = tokio::io::copy(&mut body, &mut writer)
            .await
            .map_err(|e| download_error(object, StoreError::Body(e)))?;
        writer.flush().await?;

        if written != range.len() {
            return Err(download_error(
                object,
                StoreError::Body(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "range {} returned {} bytes, expected {}",
                        range.header_value(),
                        written,
                        range.len()
                    ),
                )),
            ));
        }
        Ok(())
    }
}

fn download_error(object: &ObjectDescriptor, source: StoreError) -> TransferError {
    TransferError::Download {
        key: object.key.clone(),
        source,
    }
}
