use crate::core::{DocumentKey, Fields, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ARCHIVE_FORMAT_VERSION: u32 = 1;

/// Durable encoding of a phantomized document's full data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub format_version: u32,
    pub key: DocumentKey,
    pub archived_at: DateTime<Utc>,
    /// Document revision the data was captured at
    pub revision: u64,
    pub data: Fields,
}

impl ArchiveEntry {
    pub fn new(key: DocumentKey, revision: u64, data: Fields) -> Self {
        Self {
            format_version: ARCHIVE_FORMAT_VERSION,
            key,
            archived_at: Utc::now(),
            revision,
            data,
        }
    }
}

/// Archive store trait - pluggable durable backends addressed by document key.
///
/// `write` and `read` must each be atomic for a single document: a reader
/// never observes a partially written entry.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Create or open the backing storage. Idempotent.
    async fn initialize(&self) -> Result<()>;

    /// Store (or replace) the entry for `entry.key`.
    async fn write(&self, entry: &ArchiveEntry) -> Result<()>;

    /// Load the entry for `key`; `Ok(None)` when nothing is stored.
    async fn read(&self, key: &DocumentKey) -> Result<Option<ArchiveEntry>>;

    /// Remove the entry for `key`. Removing a missing entry is not an error.
    async fn delete(&self, key: &DocumentKey) -> Result<()>;

    async fn contains(&self, key: &DocumentKey) -> Result<bool> {
        Ok(self.read(key).await?.is_some())
    }
}
