//! Storage collaborators.
//!
//! - [`KvStore`]: versioned JSON documents keyed by string (`user:*`, `image:*`).
//! - [`BlobStore`]: image payloads with their content type.
//!
//! Both are object-safe so the service can hold either the SQLite/disk
//! backends or the in-memory ones behind an `Arc<dyn _>`.

pub mod db;
pub mod disk_blob;
pub mod memory;
pub mod records;
pub mod sqlite_kv;

use crate::models::blob::BlobMeta;
use async_trait::async_trait;
use bytes::Bytes;
use std::{io, pin::Pin};
use thiserror::Error;
use tokio::io::AsyncRead;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("version conflict on `{key}`")]
    VersionConflict { key: String },
    #[error("invalid storage key `{0}`")]
    InvalidKey(String),
    #[error("document `{key}` is not valid: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A stored document together with its version stamp.
///
/// Versions start at 1 and increase by one on every successful write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub value: String,
    pub version: i64,
}

/// Condition a `put` must satisfy to be applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precondition {
    /// Create only; fails if the key exists.
    Absent,
    /// Replace only if the current version matches.
    Version(i64),
    /// Unconditional write.
    Any,
}

impl Precondition {
    /// Precondition that replaces exactly what was read.
    pub fn matching(read: Option<i64>) -> Self {
        match read {
            Some(version) => Precondition::Version(version),
            None => Precondition::Absent,
        }
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> StorageResult<Option<Entry>>;

    /// Write `value` if `precondition` holds and return the new version.
    /// A failed precondition is [`StorageError::VersionConflict`].
    async fn put(&self, key: &str, value: &str, precondition: Precondition) -> StorageResult<i64>;

    /// All entries whose key starts with `prefix`, ordered by key.
    async fn list_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, Entry)>>;

    /// Cheap round trip used by readiness checks.
    async fn ping(&self) -> StorageResult<()>;
}

/// Streaming handle over a stored payload.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key`, replacing any previous payload.
    async fn put(&self, key: &str, content_type: &str, data: Bytes) -> StorageResult<BlobMeta>;

    /// Open a payload for reading, `None` if it does not exist.
    async fn open(&self, key: &str) -> StorageResult<Option<(BlobMeta, BlobReader)>>;

    /// Remove a payload. Returns whether anything was removed.
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Best-effort write/read/delete round trip used by readiness checks.
    async fn ping(&self) -> StorageResult<()>;
}

const MAX_BLOB_KEY_LEN: usize = 1024;

/// Reject blob keys that could escape the storage root.
pub fn ensure_blob_key_safe(key: &str) -> StorageResult<()> {
    if key.is_empty()
        || key.len() > MAX_BLOB_KEY_LEN
        || key.starts_with('/')
        || key.contains("..")
        || key.contains('/')
        || key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_keys_cannot_traverse() {
        assert!(ensure_blob_key_safe("img-1-2-a.png").is_ok());
        assert!(ensure_blob_key_safe("").is_err());
        assert!(ensure_blob_key_safe("/etc/passwd").is_err());
        assert!(ensure_blob_key_safe("a/../b").is_err());
        assert!(ensure_blob_key_safe("nested/key").is_err());
        assert!(ensure_blob_key_safe("bad\\key").is_err());
        assert!(ensure_blob_key_safe(&"x".repeat(2000)).is_err());
    }

    #[test]
    fn matching_precondition_follows_read() {
        assert_eq!(Precondition::matching(None), Precondition::Absent);
        assert_eq!(Precondition::matching(Some(4)), Precondition::Version(4));
    }
}
