//! Error aggregation across the lister and workers.

use crate::error::TransferError;
use crate::progress::ProgressAggregator;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Producer half of the error channel.
///
/// Every report bumps the shared error counter. The detail itself goes into a
/// bounded channel and is dropped when the channel is full, so the count is
/// exact while the retained details may not be.
#[derive(Clone, Debug)]
pub struct ErrorCollector {
    tx: mpsc::Sender<TransferError>,
    progress: Arc<ProgressAggregator>,
}

/// Consumer half, drained once every producer has stopped.
#[derive(Debug)]
pub struct ErrorDrain {
    rx: mpsc::Receiver<TransferError>,
}

impl ErrorCollector {
    /// Creates a collector retaining at most `capacity` error details.
    pub fn new(capacity: usize, progress: Arc<ProgressAggregator>) -> (Self, ErrorDrain) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, progress }, ErrorDrain { rx })
    }

    /// Records `err` without blocking.
    pub fn report(&self, err: TransferError) {
        self.progress.record_error();
        if let Err(mpsc::error::TrySendError::Full(dropped)) = self.tx.try_send(err) {
            warn!("Error buffer full, dropping detail: {}", dropped);
        }
    }
}

impl ErrorDrain {
    /// Collects the retained details.
    ///
    /// Waits for all [`ErrorCollector`] clones to be dropped, so call it only
    /// after the producers have stopped.
    pub async fn drain(mut self) -> Vec<TransferError> {
        let mut errors = Vec::new();
        while let Some(err) = self.rx.recv().await {
            errors.push(err);
        }
        errors
    }
}
