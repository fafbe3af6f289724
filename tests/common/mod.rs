#![allow(dead_code)]

use async_trait::async_trait;
use s3fetch::{ByteRange, ListPage, ObjectBody, ObjectDescriptor, ObjectStore, StoreError};
use std::collections::{HashMap, HashSet};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};

pub const BUCKET: &str = "test-bucket";

/// In-memory object store with programmable failures.
pub struct MemoryStore {
    listing: Vec<ObjectDescriptor>,
    data: HashMap<String, Vec<u8>>,
    page_size: usize,
    fail_listing_at_page: Option<usize>,
    failing_gets: HashSet<String>,
    stalling_gets: HashSet<String>,
    delays: HashMap<String, Duration>,
    prefixes: Vec<String>,
    gets: AtomicUsize,
    ranged_gets: AtomicUsize,
    list_calls: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            listing: Vec::new(),
            data: HashMap::new(),
            page_size: 1000,
            fail_listing_at_page: None,
            failing_gets: HashSet::new(),
            stalling_gets: HashSet::new(),
            delays: HashMap::new(),
            prefixes: Vec::new(),
            gets: AtomicUsize::new(0),
            ranged_gets: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Object whose listed size matches its content.
    pub fn with_object(mut self, key: &str, data: Vec<u8>) -> Self {
        self.listing
            .push(ObjectDescriptor::new(key, data.len() as u64));
        self.data.insert(key.to_string(), data);
        self
    }

    /// Object filled with `size` copies of the key's first byte.
    pub fn with_sized(self, key: &str, size: usize) -> Self {
        let fill = key.as_bytes()[0];
        self.with_object(key, vec![fill; size])
    }

    /// Zero-byte folder placeholder.
    pub fn with_marker(mut self, key: &str) -> Self {
        self.listing.push(ObjectDescriptor::new(key, 0));
        self.data.insert(key.to_string(), Vec::new());
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Listing request number `page` (0-based) fails.
    pub fn fail_listing_at_page(mut self, page: usize) -> Self {
        self.fail_listing_at_page = Some(page);
        self
    }

    pub fn fail_get(mut self, key: &str) -> Self {
        self.failing_gets.insert(key.to_string());
        self
    }

    /// The body yields its content, then never completes.
    pub fn stall_get(mut self, key: &str) -> Self {
        self.stalling_gets.insert(key.to_string());
        self
    }

    pub fn delay_get(mut self, key: &str, delay: Duration) -> Self {
        self.delays.insert(key.to_string(), delay);
        self
    }

    pub fn with_prefixes(mut self, prefixes: &[&str]) -> Self {
        self.prefixes = prefixes.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn ranged_gets(&self) -> usize {
        self.ranged_gets.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn requested_keys(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage, StoreError> {
        let call = self.list_calls.fetch_add(1, Ordering::SeqCst);
        if bucket != BUCKET {
            return Err(StoreError::NoSuchBucket(bucket.to_string()));
        }
        if self.fail_listing_at_page == Some(call) {
            return Err(StoreError::Service {
                operation: "ListObjectsV2",
                code: "InternalError".to_string(),
                message: "listing exploded".to_string(),
            });
        }

        let matching: Vec<_> = self
            .listing
            .iter()
            .filter(|o| o.key.starts_with(prefix))
            .cloned()
            .collect();
        let start: usize = continuation
            .map(|t| t.parse().expect("numeric token"))
            .unwrap_or(0);
        let end = (start + self.page_size).min(matching.len());
        let next_token = (end < matching.len()).then(|| end.to_string());

        Ok(ListPage {
            objects: matching[start..end].to_vec(),
            next_token,
        })
    }

    async fn get_object(
        &self,
        _bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<ObjectBody, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if range.is_some() {
            self.ranged_gets.fetch_add(1, Ordering::SeqCst);
        }
        self.requested.lock().unwrap().push(key.to_string());

        if let Some(delay) = self.delays.get(key) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing_gets.contains(key) {
            return Err(StoreError::Transport(format!("connection reset on {}", key)));
        }

        let data = self
            .data
            .get(key)
            .ok_or_else(|| StoreError::Service {
                operation: "GetObject",
                code: "NoSuchKey".to_string(),
                message: key.to_string(),
            })?;
        let bytes = match range {
            Some(r) => data[r.start as usize..=r.end as usize].to_vec(),
            None => data.clone(),
        };

        if self.stalling_gets.contains(key) {
            return Ok(Box::pin(StallingReader {
                head: io::Cursor::new(bytes),
            }));
        }
        Ok(Box::pin(io::Cursor::new(bytes)))
    }

    async fn head_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        if bucket == BUCKET {
            Ok(())
        } else {
            Err(StoreError::NoSuchBucket(bucket.to_string()))
        }
    }

    async fn list_prefixes(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        if bucket != BUCKET {
            return Err(StoreError::NoSuchBucket(bucket.to_string()));
        }
        Ok(self
            .prefixes
            .iter()
            .filter(|p| p.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Yields its bytes, then stays pending forever.
struct StallingReader {
    head: io::Cursor<Vec<u8>>,
}

impl AsyncRead for StallingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        match Pin::new(&mut self.head).poll_read(cx, buf) {
            Poll::Ready(Ok(())) if buf.filled().len() == before => Poll::Pending,
            other => other,
        }
    }
}
