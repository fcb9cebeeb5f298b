/// Object storage for attachment blobs.
/// This module provides a pluggable store architecture: the `ObjectStore`
/// trait, a sharded filesystem backend, and the attachment pipeline that
/// enforces checksum integrity and the streaming-vs-presigned dispatch.
pub mod fs;
pub mod pipeline;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub use fs::{FsObjectStore, Presigner};
pub use pipeline::{AttachmentDelivery, AttachmentDownload, AttachmentPipeline, DeliveryOptions};

/// Metadata returned by a HEAD request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: u64,
}

/// Outcome of one batched delete. Per-key failures are counted, never fatal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchDeleteSummary {
    pub deleted: usize,
    pub failed: usize,
}

/// Maximum keys per delete batch
pub const DELETE_BATCH_SIZE: usize = 1000;

/// A trait defining the interface for attachment object stores.
/// Implementations must be thread-safe and support asynchronous operations.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns object metadata, or `None` if the key does not exist
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>>;

    /// Reads the full object. Returns `None` if the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Writes an object; overwriting an existing key is allowed
    /// (content-addressed keys make it a no-op)
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Deletes up to [`DELETE_BATCH_SIZE`] keys. Missing keys count as
    /// deleted; other per-key failures are tallied in the summary.
    async fn delete_batch(&self, keys: &[String]) -> Result<BatchDeleteSummary>;

    /// Lists all keys that start with the specified prefix
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Issues a time-limited signed URL granting direct read access
    fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String>;
}
