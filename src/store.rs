//! Remote object storage abstraction.
//!
//! The engine only talks to storage through [`ObjectStore`], so it can be
//! driven by the S3 client in [`crate::s3`] or by any other backend that can
//! list a prefix page by page and stream an object body.

use crate::error::StoreError;
use crate::types::ObjectDescriptor;
use async_trait::async_trait;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Streamed object body.
pub type ObjectBody = Pin<Box<dyn AsyncRead + Send>>;

/// One page of a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectDescriptor>,
    /// Token for the next page, `None` on the last page.
    pub next_token: Option<String>,
}

/// Inclusive byte range, as in an HTTP `Range: bytes=start-end` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Renders the `Range` header value.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    /// Splits `[0, size)` into consecutive ranges of at most `part_size` bytes.
    pub fn split(size: u64, part_size: u64) -> Vec<ByteRange> {
        let mut parts = Vec::new();
        if part_size == 0 {
            return parts;
        }
        let mut start = 0;
        while start < size {
            let end = (start + part_size).min(size) - 1;
            parts.push(ByteRange { start, end });
            start = end + 1;
        }
        parts
    }
}

/// An already-authenticated client for one object storage service.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetches one page of objects whose key starts with `prefix`.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage, StoreError>;

    /// Opens the body of `key`, or only `range` of it when given.
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<ObjectBody, StoreError>;

    /// Single existence probe against the bucket.
    async fn head_bucket(&self, bucket: &str) -> Result<(), StoreError>;

    /// Lists the common prefixes one `/` level below `prefix`, all pages.
    async fn list_prefixes(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_covers_size_exactly() {
        let parts = ByteRange::split(25, 10);
        assert_eq!(
            parts,
            vec![
                ByteRange { start: 0, end: 9 },
                ByteRange { start: 10, end: 19 },
                ByteRange { start: 20, end: 24 },
            ]
        );
        assert_eq!(parts.iter().map(ByteRange::len).sum::<u64>(), 25);
    }

    #[test]
    fn split_of_exact_multiple_has_no_tail() {
        let parts = ByteRange::split(20, 10);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1], ByteRange { start: 10, end: 19 });
    }

    #[test]
    fn split_of_empty_object_is_empty() {
        assert!(ByteRange::split(0, 10).is_empty());
    }

    #[test]
    fn header_value_is_inclusive() {
        let range = ByteRange { start: 10, end: 19 };
        assert_eq!(range.header_value(), "bytes=10-19");
        assert_eq!(range.len(), 10);
    }
}
