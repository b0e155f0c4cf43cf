//! `KvStore` backed by the `kv_entries` SQLite table.

use super::{Entry, KvStore, Precondition, StorageError, StorageResult};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;

#[derive(Clone)]
pub struct SqliteKvStore {
    db: Arc<SqlitePool>,
}

#[derive(FromRow)]
struct EntryRow {
    key: String,
    value: String,
    version: i64,
}

impl From<EntryRow> for (String, Entry) {
    fn from(row: EntryRow) -> Self {
        (
            row.key,
            Entry {
                value: row.value,
                version: row.version,
            },
        )
    }
}

impl SqliteKvStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Entry>> {
        let row = sqlx::query_as::<_, EntryRow>(
            "SELECT key, value, version FROM kv_entries WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row.map(|r| Entry {
            value: r.value,
            version: r.version,
        }))
    }

    async fn put(&self, key: &str, value: &str, precondition: Precondition) -> StorageResult<i64> {
        let now = Utc::now();
        let version: Option<i64> = match precondition {
            Precondition::Absent => {
                sqlx::query_scalar(
                    "INSERT INTO kv_entries (key, value, version, updated_at)
                     VALUES (?, ?, 1, ?)
                     ON CONFLICT(key) DO NOTHING
                     RETURNING version",
                )
                .bind(key)
                .bind(value)
                .bind(now)
                .fetch_optional(&*self.db)
                .await?
            }
            Precondition::Version(expected) => {
                sqlx::query_scalar(
                    "UPDATE kv_entries
                     SET value = ?, version = version + 1, updated_at = ?
                     WHERE key = ? AND version = ?
                     RETURNING version",
                )
                .bind(value)
                .bind(now)
                .bind(key)
                .bind(expected)
                .fetch_optional(&*self.db)
                .await?
            }
            Precondition::Any => {
                sqlx::query_scalar(
                    "INSERT INTO kv_entries (key, value, version, updated_at)
                     VALUES (?, ?, 1, ?)
                     ON CONFLICT(key) DO UPDATE SET
                         value = excluded.value,
                         version = kv_entries.version + 1,
                         updated_at = excluded.updated_at
                     RETURNING version",
                )
                .bind(key)
                .bind(value)
                .bind(now)
                .fetch_optional(&*self.db)
                .await?
            }
        };

        version.ok_or_else(|| StorageError::VersionConflict {
            key: key.to_string(),
        })
    }

    async fn list_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, Entry)>> {
        // Case-sensitive, matching MemoryKvStore.
        let rows = sqlx::query_as::<_, EntryRow>(
            "SELECT key, value, version FROM kv_entries
             WHERE substr(key, 1, length(?)) = ?
             ORDER BY key ASC",
        )
        .bind(prefix)
        .bind(prefix)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn ping(&self) -> StorageResult<()> {
        let one = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if one == 1 {
            Ok(())
        } else {
            Err(StorageError::Io(std::io::Error::other(format!(
                "unexpected result: {}",
                one
            ))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::memory_pool;

    async fn store() -> SqliteKvStore {
        SqliteKvStore::new(Arc::new(memory_pool().await))
    }

    #[tokio::test]
    async fn create_then_replace_by_version() {
        let kv = store().await;
        assert_eq!(kv.get("user:1").await.unwrap(), None);

        let v1 = kv.put("user:1", "{}", Precondition::Absent).await.unwrap();
        assert_eq!(v1, 1);

        let v2 = kv
            .put("user:1", r#"{"a":1}"#, Precondition::Version(1))
            .await
            .unwrap();
        assert_eq!(v2, 2);

        let entry = kv.get("user:1").await.unwrap().unwrap();
        assert_eq!(entry.value, r#"{"a":1}"#);
        assert_eq!(entry.version, 2);
    }

    #[tokio::test]
    async fn stale_or_duplicate_writes_conflict() {
        let kv = store().await;
        kv.put("image:a", "1", Precondition::Absent).await.unwrap();

        let dup = kv.put("image:a", "2", Precondition::Absent).await;
        assert!(matches!(dup, Err(StorageError::VersionConflict { .. })));

        kv.put("image:a", "3", Precondition::Version(1)).await.unwrap();
        let stale = kv.put("image:a", "4", Precondition::Version(1)).await;
        assert!(matches!(stale, Err(StorageError::VersionConflict { .. })));

        let missing = kv.put("image:b", "5", Precondition::Version(1)).await;
        assert!(matches!(missing, Err(StorageError::VersionConflict { .. })));

        assert_eq!(kv.get("image:a").await.unwrap().unwrap().value, "3");
    }

    #[tokio::test]
    async fn unconditional_put_upserts() {
        let kv = store().await;
        assert_eq!(kv.put("k", "a", Precondition::Any).await.unwrap(), 1);
        assert_eq!(kv.put("k", "b", Precondition::Any).await.unwrap(), 2);
        assert_eq!(kv.get("k").await.unwrap().unwrap().value, "b");
    }

    #[tokio::test]
    async fn list_prefix_is_literal_and_ordered() {
        let kv = store().await;
        for key in ["image:b", "image:a", "user:1", "image_x", "imagez"] {
            kv.put(key, "{}", Precondition::Absent).await.unwrap();
        }

        let keys: Vec<String> = kv
            .list_prefix("image:")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["image:a".to_string(), "image:b".to_string()]);

        let underscored = kv.list_prefix("image_").await.unwrap();
        assert_eq!(underscored.len(), 1);
    }

    #[tokio::test]
    async fn ping_succeeds() {
        store().await.ping().await.unwrap();
    }

    #[tokio::test]
    async fn list_prefix_is_case_sensitive() {
        let kv = store().await;
        for key in ["image:a", "IMAGE:b", "Image:c"] {
            kv.put(key, "{}", Precondition::Absent).await.unwrap();
        }
        let keys: Vec<String> = kv
            .list_prefix("image:")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["image:a".to_string()]);
    }
}
