//! Image payloads on local disk, metadata in SQLite.
//!
//! Payloads are sharded beneath `base_path/{shard}/{shard}/{key}` using the
//! first two bytes of `md5(key)` so no single directory grows unbounded.

use super::{BlobReader, BlobStore, StorageError, StorageResult, ensure_blob_key_safe};
use crate::models::blob::BlobMeta;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct DiskBlobStore {
    /// Shared SQLite pool for the `blobs` table.
    db: Arc<SqlitePool>,

    /// Root directory for payloads.
    base_path: PathBuf,
}

impl DiskBlobStore {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Two-level shard directories for a key, as lowercase hex (00–ff).
    fn shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Full payload path. Parent directories may not exist yet.
    fn blob_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn fetch_meta(&self, key: &str) -> StorageResult<Option<BlobMeta>> {
        let meta = sqlx::query_as::<_, BlobMeta>(
            "SELECT key, content_type, size_bytes, etag, created_at FROM blobs WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;
        Ok(meta)
    }

    /// Write to a temp file, fsync, then rename into place.
    async fn write_payload(&self, file_path: &Path, data: &[u8]) -> StorageResult<()> {
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::other("blob path missing parent directory"))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        if let Err(err) = write_synced(&mut file, data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(file_path).await?;
                fs::rename(&tmp_path, file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }
        Ok(())
    }

    /// Remove empty shard directories up to, but not including, `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

async fn write_synced(file: &mut File, data: &[u8]) -> io::Result<()> {
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await
}

#[async_trait]
impl BlobStore for DiskBlobStore {
    async fn put(&self, key: &str, content_type: &str, data: Bytes) -> StorageResult<BlobMeta> {
        ensure_blob_key_safe(key)?;
        let file_path = self.blob_path(key);
        self.write_payload(&file_path, &data).await?;

        let inserted = sqlx::query_as::<_, BlobMeta>(
            r#"
            INSERT INTO blobs (key, content_type, size_bytes, etag, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                created_at = excluded.created_at
            RETURNING key, content_type, size_bytes, etag, created_at
            "#,
        )
        .bind(key)
        .bind(content_type)
        .bind(data.len() as i64)
        .bind(format!("{:x}", md5::compute(&data)))
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;

        match inserted {
            Ok(meta) => {
                debug!(key, size = meta.size_bytes, "stored blob");
                Ok(meta)
            }
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StorageError::Sqlx(err))
            }
        }
    }

    async fn open(&self, key: &str) -> StorageResult<Option<(BlobMeta, BlobReader)>> {
        ensure_blob_key_safe(key)?;
        let Some(meta) = self.fetch_meta(key).await? else {
            return Ok(None);
        };

        match File::open(self.blob_path(key)).await {
            Ok(file) => {
                let reader: BlobReader = Box::pin(file);
                Ok(Some((meta, reader)))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::warn!(key, "blob metadata present but payload missing");
                Ok(None)
            }
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        ensure_blob_key_safe(key)?;
        let result = sqlx::query("DELETE FROM blobs WHERE key = ?")
            .bind(key)
            .execute(&*self.db)
            .await?;

        let file_path = self.blob_path(key);
        let removed_file = match fs::remove_file(&file_path).await {
            Ok(_) => {
                debug!("removed physical file {}", file_path.display());
                true
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
                false
            }
            Err(err) => return Err(StorageError::Io(err)),
        };

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.base_path).await;
        }

        Ok(result.rows_affected() > 0 || removed_file)
    }

    async fn ping(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let read = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if read? == b"readyz" {
            Ok(())
        } else {
            Err(StorageError::Io(io::Error::other("file content mismatch")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::memory_pool;
    use tokio::io::AsyncReadExt;

    async fn store(dir: &Path) -> DiskBlobStore {
        DiskBlobStore::new(Arc::new(memory_pool().await), dir)
    }

    #[tokio::test]
    async fn put_writes_sharded_payload_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = store(dir.path()).await;

        let meta = blobs
            .put("img-3-1-wall.jpg", "image/jpeg", Bytes::from_static(b"jpegdata"))
            .await
            .unwrap();
        assert_eq!(meta.size_bytes, 8);
        assert_eq!(meta.content_type, "image/jpeg");

        let path = blobs.blob_path("img-3-1-wall.jpg");
        assert!(path.starts_with(dir.path()));
        assert_eq!(std::fs::read(&path).unwrap(), b"jpegdata");

        let (opened, mut reader) = blobs.open("img-3-1-wall.jpg").await.unwrap().unwrap();
        assert_eq!(opened, meta);
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"jpegdata");
    }

    #[tokio::test]
    async fn put_overwrites_existing_key() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = store(dir.path()).await;
        blobs
            .put("k.png", "image/png", Bytes::from_static(b"one"))
            .await
            .unwrap();
        let meta = blobs
            .put("k.png", "image/webp", Bytes::from_static(b"second"))
            .await
            .unwrap();
        assert_eq!(meta.size_bytes, 6);
        assert_eq!(meta.content_type, "image/webp");
    }

    #[tokio::test]
    async fn open_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = store(dir.path()).await;
        assert!(blobs.open("nothing.png").await.unwrap().is_none());
        assert!(matches!(
            blobs.open("../escape").await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn delete_removes_file_and_prunes_shards() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = store(dir.path()).await;
        blobs
            .put("gone.png", "image/png", Bytes::from_static(b"x"))
            .await
            .unwrap();
        let path = blobs.blob_path("gone.png");
        let shard_root = path.parent().unwrap().parent().unwrap().to_path_buf();

        assert!(blobs.delete("gone.png").await.unwrap());
        assert!(!path.exists());
        assert!(!shard_root.exists());
        assert!(dir.path().exists());
        assert!(!blobs.delete("gone.png").await.unwrap());
    }

    #[tokio::test]
    async fn ping_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = store(&dir.path().join("nested")).await;
        blobs.ping().await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path().join("nested")).unwrap().count(), 0);
    }
}
