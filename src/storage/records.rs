//! Typed access to user and image documents in a [`KvStore`].

use super::{KvStore, Precondition, StorageError, StorageResult};
use crate::models::{
    image::{IMAGE_KEY_PREFIX, Image, image_key},
    user::{User, UserId, user_key},
};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tracing::warn;

/// A record together with the version it was read at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Versioned<T> {
    pub record: T,
    pub version: i64,
}

#[derive(Clone)]
pub struct Records {
    kv: Arc<dyn KvStore>,
}

impl Records {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<Versioned<T>>> {
        let Some(entry) = self.kv.get(key).await? else {
            return Ok(None);
        };
        let record = serde_json::from_str(&entry.value).map_err(|source| StorageError::Corrupt {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(Versioned {
            record,
            version: entry.version,
        }))
    }

    async fn save<T: Serialize>(
        &self,
        key: &str,
        record: &T,
        precondition: Precondition,
    ) -> StorageResult<i64> {
        let value = serde_json::to_string(record)?;
        self.kv.put(key, &value, precondition).await
    }

    pub async fn load_user(&self, id: UserId) -> StorageResult<Option<Versioned<User>>> {
        self.load(&user_key(id)).await
    }

    pub async fn load_image(&self, id: &str) -> StorageResult<Option<Versioned<Image>>> {
        self.load(&image_key(id)).await
    }

    pub async fn save_user(&self, user: &User, precondition: Precondition) -> StorageResult<i64> {
        self.save(&user.record_key(), user, precondition).await
    }

    pub async fn save_image(
        &self,
        image: &Image,
        precondition: Precondition,
    ) -> StorageResult<i64> {
        self.save(&image.record_key(), image, precondition).await
    }

    /// Every readable image record. Documents that fail to parse are logged
    /// and skipped.
    pub async fn list_images(&self) -> StorageResult<Vec<Image>> {
        let entries = self.kv.list_prefix(IMAGE_KEY_PREFIX).await?;
        let mut images = Vec::with_capacity(entries.len());
        for (key, entry) in entries {
            match serde_json::from_str::<Image>(&entry.value) {
                Ok(image) => images.push(image),
                Err(err) => warn!(%key, error = %err, "skipping unreadable image record"),
            }
        }
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryKvStore;

    fn records() -> Records {
        Records::new(Arc::new(MemoryKvStore::new()))
    }

    fn image(id: &str, uploader: i64) -> Image {
        Image {
            id: id.into(),
            uploader_id: UserId::new(uploader).unwrap(),
            storage_key: format!("{id}-a.png"),
            upload_timestamp: 10,
            vote_count: 0,
        }
    }

    #[tokio::test]
    async fn user_round_trip_keeps_version() {
        let records = records();
        let id = UserId::new(4).unwrap();
        assert!(records.load_user(id).await.unwrap().is_none());

        let user = User::new(id);
        let version = records
            .save_user(&user, Precondition::Absent)
            .await
            .unwrap();
        let loaded = records.load_user(id).await.unwrap().unwrap();
        assert_eq!(loaded.record, user);
        assert_eq!(loaded.version, version);
    }

    #[tokio::test]
    async fn list_images_skips_corrupt_documents() {
        let records = records();
        records
            .save_image(&image("img-1", 1), Precondition::Absent)
            .await
            .unwrap();
        records
            .kv()
            .put("image:broken", "{not json", Precondition::Absent)
            .await
            .unwrap();
        records
            .save_user(&User::new(UserId::new(1).unwrap()), Precondition::Absent)
            .await
            .unwrap();

        let images = records.list_images().await.unwrap();
        assert_eq!(images, vec![image("img-1", 1)]);
    }

    #[tokio::test]
    async fn corrupt_single_record_is_an_error() {
        let records = records();
        records
            .kv()
            .put("image:bad", "[]", Precondition::Absent)
            .await
            .unwrap();
        assert!(matches!(
            records.load_image("bad").await,
            Err(StorageError::Corrupt { .. })
        ));
    }
}
