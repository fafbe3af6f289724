//! s3fetch - concurrent bulk downloader for S3-compatible object storage
//!
//! This library mirrors every object under a bucket prefix into a local
//! directory tree, with a bounded worker pool, live progress snapshots and
//! cooperative cancellation.
//!
//! # Features
//!
//! - **Streaming Listing**: Objects are queued as listing pages arrive, so
//!   downloads start before the listing finishes
//! - **Bounded Concurrency**: A fixed worker pool behind a bounded task queue
//! - **Multi-part Transfers**: Large objects are fetched as parallel byte ranges
//! - **Skip or Overwrite**: Existing local files are skipped unless overwriting
//! - **Progress Tracking**: Non-blocking snapshots that never stall a transfer
//! - **Cancellation**: One token stops listing, workers and in-flight transfers
//!
//! # Example
//!
//! ```no_run
//! use s3fetch::{
//!     Downloader, ProgressSnapshot, S3ClientConfig, S3Store, TransferConfig, TransferRequest,
//! };
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = S3Store::connect(&S3ClientConfig {
//!     region: "eu-west-1".to_string(),
//!     ..S3ClientConfig::default()
//! })
//! .await?;
//! let downloader = Downloader::new(Arc::new(store), TransferConfig::default());
//!
//! let (progress_tx, mut progress_rx) = mpsc::channel::<ProgressSnapshot>(100);
//! tokio::spawn(async move {
//!     while let Some(p) = progress_rx.recv().await {
//!         println!("{}/{} files", p.files_downloaded, p.files_found);
//!     }
//! });
//!
//! let request = TransferRequest::new("my-bucket", "photos/", "./photos");
//! let outcome = downloader
//!     .run(&request, Some(progress_tx), CancellationToken::new())
//!     .await;
//! println!("{} bytes in total", outcome.totals().total_bytes);
//! outcome.into_result()?;
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod download;
pub mod error;
pub mod fsutil;
pub mod listing;
pub mod orchestrator;
pub mod progress;
pub mod s3;
pub mod store;
pub mod types;
pub mod worker;

pub use error::{StoreError, TransferError};
pub use orchestrator::{run, Downloader};
pub use progress::ProgressAggregator;
pub use s3::{create_s3_client, S3ClientConfig, S3Store};
pub use store::{ByteRange, ListPage, ObjectBody, ObjectStore};
pub use types::{
    ObjectDescriptor, ProgressSnapshot, TransferConfig, TransferOutcome, TransferRequest,
};

/// Formats a byte count for humans, e.g. `1536` → `"1.5 KB"`.
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    const TB: f64 = GB * 1024.0;

    let value = bytes as f64;
    if value < KB {
        format!("{} B", bytes)
    } else if value < MB {
        format!("{:.1} KB", value / KB)
    } else if value < GB {
        format!("{:.1} MB", value / MB)
    } else if value < TB {
        format!("{:.1} GB", value / GB)
    } else {
        format!("{:.1} TB", value / TB)
    }
}
