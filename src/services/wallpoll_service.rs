//! WallPollService loads records, asks the admission rules, and persists the
//! result.
//!
//! Every record write carries the version it was read at. A user record
//! conflict re-runs the whole vote evaluation; an image record conflict only
//! re-applies the increment. The two writes are not atomic together: if the
//! image increment keeps conflicting after the user write landed, the vote
//! is spent but not tallied. That case is logged at `error`.

use super::{
    ServiceError, ServiceResult,
    eligibility::{VoteDecision, admit_upload, evaluate_vote, votes_remaining},
    gallery::rank_gallery,
};
use crate::{
    models::{
        blob::BlobMeta,
        image::{Image, image_key},
        user::{User, UserId, user_key},
    },
    storage::{
        BlobReader, BlobStore, KvStore, Precondition, StorageError,
        records::{Records, Versioned},
    },
};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Attempts per record before giving up with [`ServiceError::Contention`].
const MAX_WRITE_ATTEMPTS: usize = 5;

/// Result of an accepted vote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteOutcome {
    pub image_id: String,
    pub vote_count: u64,
    pub votes_remaining: u32,
}

/// Per-backend readiness, `Err` carrying a printable reason.
#[derive(Debug)]
pub struct ReadinessReport {
    pub kv: Result<(), String>,
    pub blobs: Result<(), String>,
}

impl ReadinessReport {
    pub fn is_ready(&self) -> bool {
        self.kv.is_ok() && self.blobs.is_ok()
    }
}

#[derive(Clone)]
pub struct WallPollService {
    records: Records,
    blobs: Arc<dyn BlobStore>,
}

/// A user record as read, or a fresh one if it was never persisted.
fn user_or_default(id: UserId, loaded: Option<Versioned<User>>) -> (User, Option<i64>) {
    match loaded {
        Some(v) => (v.record, Some(v.version)),
        None => (User::new(id), None),
    }
}

impl WallPollService {
    pub fn new(kv: Arc<dyn KvStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            records: Records::new(kv),
            blobs,
        }
    }

    /// Load the user, creating the record on first login.
    pub async fn login(&self, id: UserId) -> ServiceResult<User> {
        if let Some(existing) = self.records.load_user(id).await? {
            return Ok(existing.record);
        }

        let user = User::new(id);
        match self.records.save_user(&user, Precondition::Absent).await {
            Ok(_) => {
                info!(user_id = %id, "created user record");
                Ok(user)
            }
            // Created concurrently by another request.
            Err(StorageError::VersionConflict { .. }) => self
                .records
                .load_user(id)
                .await?
                .map(|v| v.record)
                .ok_or_else(|| ServiceError::Contention(user_key(id))),
            Err(err) => Err(err.into()),
        }
    }

    /// Current state of a user without creating anything.
    pub async fn user_status(&self, id: UserId) -> ServiceResult<User> {
        let loaded = self.records.load_user(id).await?;
        Ok(user_or_default(id, loaded).0)
    }

    pub async fn vote(&self, user_id: UserId, image_id: &str) -> ServiceResult<VoteOutcome> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let (voter, voter_version) =
                user_or_default(user_id, self.records.load_user(user_id).await?);
            let target = self
                .records
                .load_image(image_id)
                .await?
                .ok_or_else(|| ServiceError::ImageNotFound(image_id.to_string()))?;

            let (voter, image) = match evaluate_vote(&voter, &target.record, image_id)? {
                VoteDecision::Accepted { voter, image } => (voter, image),
                VoteDecision::Rejected(reason) => {
                    debug!(user_id = %user_id, image_id, reason = reason.tag(), "vote rejected");
                    return Err(ServiceError::VoteRejected(reason));
                }
            };

            match self
                .records
                .save_user(&voter, Precondition::matching(voter_version))
                .await
            {
                Ok(_) => {}
                Err(StorageError::VersionConflict { .. }) => {
                    debug!(user_id = %user_id, attempt, "user record changed, re-evaluating vote");
                    continue;
                }
                Err(err) => return Err(err.into()),
            }

            let vote_count = self
                .apply_increment(user_id, image, target.version)
                .await?;
            let remaining = votes_remaining(&voter);
            info!(
                user_id = %user_id,
                image_id,
                vote_count,
                votes_remaining = remaining,
                "vote recorded"
            );
            return Ok(VoteOutcome {
                image_id: image_id.to_string(),
                vote_count,
                votes_remaining: remaining,
            });
        }

        Err(ServiceError::Contention(user_key(user_id)))
    }

    /// Persist the incremented image, re-reading and re-incrementing on
    /// version conflicts.
    async fn apply_increment(
        &self,
        user_id: UserId,
        mut image: Image,
        mut read_version: i64,
    ) -> ServiceResult<u64> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            match self
                .records
                .save_image(&image, Precondition::Version(read_version))
                .await
            {
                Ok(_) => return Ok(image.vote_count),
                Err(StorageError::VersionConflict { .. }) => {
                    debug!(
                        image_id = %image.id,
                        attempt,
                        "image record changed, retrying increment"
                    );
                    let fresh = self
                        .records
                        .load_image(&image.id)
                        .await?
                        .ok_or_else(|| ServiceError::ImageNotFound(image.id.clone()))?;
                    image = fresh.record;
                    image.vote_count += 1;
                    read_version = fresh.version;
                }
                Err(err) => {
                    error!(
                        user_id = %user_id,
                        image_id = %image.id,
                        error = %err,
                        "vote stored on user but image tally not advanced"
                    );
                    return Err(err.into());
                }
            }
        }

        error!(
            user_id = %user_id,
            image_id = %image.id,
            "vote stored on user but image tally not advanced after {} attempts",
            MAX_WRITE_ATTEMPTS
        );
        Err(ServiceError::Contention(image_key(&image.id)))
    }

    /// Store an uploaded image for `user_id`.
    pub async fn upload(
        &self,
        user_id: UserId,
        file_name: &str,
        content_type: &str,
        data: Bytes,
    ) -> ServiceResult<Image> {
        let (user, version) = user_or_default(user_id, self.records.load_user(user_id).await?);
        if let Err(reason) = admit_upload(&user) {
            debug!(user_id = %user_id, reason = reason.tag(), "upload rejected");
            return Err(ServiceError::UploadRejected(reason));
        }
        if data.is_empty() {
            return Err(ServiceError::Validation("Uploaded image is empty.".into()));
        }

        let image = Image::new(user_id, file_name, Utc::now());
        let blob = self
            .blobs
            .put(&image.storage_key, content_type, data)
            .await?;

        if let Err(err) = self.claim_upload(user, version, &image).await {
            self.discard_blob(&image.storage_key).await;
            return Err(err);
        }

        if let Err(err) = self.records.save_image(&image, Precondition::Absent).await {
            error!(image_id = %image.id, error = %err, "failed to store image record");
            self.release_claim(user_id, &image.id).await;
            self.discard_blob(&image.storage_key).await;
            return Err(err.into());
        }

        info!(
            user_id = %user_id,
            image_id = %image.id,
            storage_key = %image.storage_key,
            size = blob.size_bytes,
            "image uploaded"
        );
        Ok(image)
    }

    /// Set `uploaded_image_id` on the user, re-checking admission whenever
    /// the record changed underneath.
    async fn claim_upload(
        &self,
        mut user: User,
        mut version: Option<i64>,
        image: &Image,
    ) -> ServiceResult<()> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut claimed = user.clone();
            claimed.uploaded_image_id = Some(image.id.clone());
            match self
                .records
                .save_user(&claimed, Precondition::matching(version))
                .await
            {
                Ok(_) => return Ok(()),
                Err(StorageError::VersionConflict { .. }) => {
                    debug!(user_id = %user.id, attempt, "user record changed during upload");
                    (user, version) =
                        user_or_default(user.id, self.records.load_user(user.id).await?);
                    admit_upload(&user).map_err(ServiceError::UploadRejected)?;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(ServiceError::Contention(user_key(user.id)))
    }

    /// Undo a claim whose image record was never written.
    async fn release_claim(&self, user_id: UserId, image_id: &str) {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let loaded = match self.records.load_user(user_id).await {
                Ok(Some(loaded)) => loaded,
                Ok(None) => return,
                Err(err) => {
                    warn!(
                        user_id = %user_id,
                        error = %err,
                        "could not reload user to release upload claim"
                    );
                    return;
                }
            };
            if loaded.record.uploaded_image_id.as_deref() != Some(image_id) {
                return;
            }
            let mut user = loaded.record;
            user.uploaded_image_id = None;
            match self
                .records
                .save_user(&user, Precondition::Version(loaded.version))
                .await
            {
                Ok(_) => return,
                Err(StorageError::VersionConflict { .. }) => continue,
                Err(err) => {
                    warn!(user_id = %user_id, error = %err, "could not release upload claim");
                    return;
                }
            }
        }
        warn!(user_id = %user_id, image_id, "gave up releasing upload claim");
    }

    async fn discard_blob(&self, key: &str) {
        if let Err(err) = self.blobs.delete(key).await {
            warn!(key, error = %err, "failed to remove orphaned blob");
        }
    }

    /// All images, ranked for display.
    pub async fn gallery(&self) -> ServiceResult<Vec<Image>> {
        let images = self.records.list_images().await?;
        debug!(count = images.len(), "fetched gallery");
        Ok(rank_gallery(images))
    }

    pub async fn open_image(&self, storage_key: &str) -> ServiceResult<(BlobMeta, BlobReader)> {
        self.blobs
            .open(storage_key)
            .await?
            .ok_or_else(|| ServiceError::BlobNotFound(storage_key.to_string()))
    }

    pub async fn ready(&self) -> ReadinessReport {
        let kv = self
            .records
            .kv()
            .ping()
            .await
            .map_err(|e| format!("error: {}", e));
        let blobs = self.blobs.ping().await.map_err(|e| format!("error: {}", e));
        ReadinessReport { kv, blobs }
    }
}
