//! In-memory storage backends.
//!
//! Used by `--in-memory` runs and by the test suites; nothing survives a
//! restart.

use super::{
    BlobReader, BlobStore, Entry, KvStore, Precondition, StorageError, StorageResult,
    ensure_blob_key_safe,
};
use crate::models::blob::BlobMeta;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::{collections::BTreeMap, io::Cursor};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Entry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str, precondition: Precondition) -> StorageResult<i64> {
        let mut entries = self.entries.write().await;
        let current = entries.get(key).map(|e| e.version);
        let admitted = match precondition {
            Precondition::Absent => current.is_none(),
            Precondition::Version(expected) => current == Some(expected),
            Precondition::Any => true,
        };
        if !admitted {
            return Err(StorageError::VersionConflict {
                key: key.to_string(),
            });
        }

        let version = current.map_or(1, |v| v + 1);
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                version,
            },
        );
        Ok(version)
    }

    async fn list_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, Entry)>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect())
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, (BlobMeta, Bytes)>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, content_type: &str, data: Bytes) -> StorageResult<BlobMeta> {
        ensure_blob_key_safe(key)?;
        let meta = BlobMeta {
            key: key.to_string(),
            content_type: content_type.to_string(),
            size_bytes: data.len() as i64,
            etag: format!("{:x}", md5::compute(&data)),
            created_at: Utc::now(),
        };
        self.blobs
            .write()
            .await
            .insert(key.to_string(), (meta.clone(), data));
        Ok(meta)
    }

    async fn open(&self, key: &str) -> StorageResult<Option<(BlobMeta, BlobReader)>> {
        ensure_blob_key_safe(key)?;
        let blobs = self.blobs.read().await;
        Ok(blobs.get(key).map(|(meta, data)| {
            let reader: BlobReader = Box::pin(Cursor::new(data.clone()));
            (meta.clone(), reader)
        }))
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        ensure_blob_key_safe(key)?;
        Ok(self.blobs.write().await.remove(key).is_some())
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }
}
