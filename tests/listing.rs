mod common;

use common::{MemoryStore, BUCKET};
use s3fetch::collector::ErrorCollector;
use s3fetch::listing::{ListingSummary, ObjectLister};
use s3fetch::{ObjectStore, ProgressAggregator, TransferError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Harness {
    progress: Arc<ProgressAggregator>,
    errors: ErrorCollector,
    drain: s3fetch::collector::ErrorDrain,
    cancel: CancellationToken,
}

fn harness() -> Harness {
    let progress = Arc::new(ProgressAggregator::new(None));
    let (errors, drain) = ErrorCollector::new(4, Arc::clone(&progress));
    Harness {
        progress,
        errors,
        drain,
        cancel: CancellationToken::new(),
    }
}

fn lister(store: Arc<dyn ObjectStore>, prefix: &str, h: &Harness) -> ObjectLister {
    ObjectLister::new(
        store,
        BUCKET,
        prefix,
        Arc::clone(&h.progress),
        h.errors.clone(),
        h.cancel.clone(),
    )
}

#[tokio::test]
async fn queue_closes_after_the_last_page() {
    let h = harness();
    let store = Arc::new(
        MemoryStore::new()
            .page_size(2)
            .with_sized("a.txt", 1)
            .with_marker("b/")
            .with_sized("b/c.txt", 2)
            .with_sized("d.txt", 3),
    );
    let (tx, mut rx) = mpsc::channel(16);

    let summary = lister(store, "", &h).run(tx).await;

    let mut keys = Vec::new();
    while let Some(object) = rx.recv().await {
        keys.push(object.key);
    }
    assert_eq!(
        summary,
        ListingSummary {
            enqueued: 3,
            interrupted: false
        }
    );
    assert_eq!(keys, vec!["a.txt", "b/c.txt", "d.txt"]);
    assert_eq!(h.progress.snapshot().files_found, 3);
}

#[tokio::test]
async fn only_keys_under_the_prefix_are_listed() {
    let h = harness();
    let store = Arc::new(
        MemoryStore::new()
            .with_sized("logs/1", 1)
            .with_sized("logs/2", 1)
            .with_sized("data/1", 1),
    );
    let (tx, mut rx) = mpsc::channel(16);

    let summary = lister(store, "logs/", &h).run(tx).await;

    assert_eq!(summary.enqueued, 2);
    assert_eq!(rx.recv().await.unwrap().key, "logs/1");
    assert_eq!(rx.recv().await.unwrap().key, "logs/2");
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn full_queue_blocks_until_canceled() {
    let h = harness();
    let mut store = MemoryStore::new();
    for i in 0..5 {
        store = store.with_sized(&format!("k{i}"), 1);
    }
    let store: Arc<dyn ObjectStore> = Arc::new(store);
    let (tx, mut rx) = mpsc::channel(1);

    let task = tokio::spawn(lister(store, "", &h).run(tx));
    tokio::time::sleep(Duration::from_millis(50)).await;

    // one slot, nobody reading
    assert!(!task.is_finished());
    assert_eq!(h.progress.snapshot().files_found, 1);

    // draining one item lets exactly one more through
    assert_eq!(rx.recv().await.unwrap().key, "k0");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.progress.snapshot().files_found, 2);

    h.cancel.cancel();
    let summary = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("lister stops on cancellation")
        .unwrap();
    assert_eq!(summary.enqueued, 2);
    assert!(summary.interrupted);
}

#[tokio::test]
async fn listing_error_is_reported_and_queue_still_closes() {
    let h = harness();
    let store = Arc::new(
        MemoryStore::new()
            .page_size(1)
            .with_sized("first", 1)
            .with_sized("second", 1)
            .fail_listing_at_page(1),
    );
    let (tx, mut rx) = mpsc::channel(16);

    let summary = lister(store, "", &h).run(tx).await;

    // a failed listing still ends the listing
    assert_eq!(
        summary,
        ListingSummary {
            enqueued: 1,
            interrupted: false
        }
    );
    assert_eq!(rx.recv().await.unwrap().key, "first");
    assert!(rx.recv().await.is_none());

    let Harness { errors, drain, .. } = h;
    drop(errors);
    let errors = drain.drain().await;
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], TransferError::Listing(_)));
}

#[tokio::test]
async fn lister_stops_when_workers_are_gone() {
    let h = harness();
    let store = Arc::new(MemoryStore::new().with_sized("a", 1).with_sized("b", 1));
    let (tx, rx) = mpsc::channel(16);
    drop(rx);

    let summary = lister(store, "", &h).run(tx).await;

    assert_eq!(summary.enqueued, 0);
    assert!(summary.interrupted);
    assert_eq!(h.progress.snapshot().files_found, 0);
}
