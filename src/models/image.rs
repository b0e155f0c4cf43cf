//! An uploaded wallpaper and its running vote tally.

use crate::models::user::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An image as stored under `image:{id}`.
///
/// The record only references the payload; bytes live in the blob store
/// under `storage_key`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    /// Generated at upload time, see [`generate_image_id`].
    #[serde(rename = "imageId")]
    pub id: String,

    /// The user who uploaded it. Immutable.
    pub uploader_id: UserId,

    /// Blob store key of the payload.
    pub storage_key: String,

    /// Upload time in unix milliseconds.
    pub upload_timestamp: i64,

    /// Votes received so far.
    #[serde(rename = "votes")]
    pub vote_count: u64,
}

impl Image {
    /// Build a fresh record with zero votes.
    pub fn new(uploader_id: UserId, file_name: &str, uploaded_at: DateTime<Utc>) -> Self {
        let id = generate_image_id(uploader_id, uploaded_at);
        let storage_key = format!("{}-{}", id, sanitize_file_name(file_name));
        Self {
            id,
            uploader_id,
            storage_key,
            upload_timestamp: uploaded_at.timestamp_millis(),
            vote_count: 0,
        }
    }

    pub fn record_key(&self) -> String {
        image_key(&self.id)
    }

    /// Public URL the image bytes are served from.
    pub fn url(&self) -> String {
        format!("/images/{}", self.storage_key)
    }
}

/// Key-value key of an image record.
pub fn image_key(id: &str) -> String {
    format!("{}{}", IMAGE_KEY_PREFIX, id)
}

/// Prefix shared by every image record key.
pub const IMAGE_KEY_PREFIX: &str = "image:";

/// `img-{uploader}-{millis}-{8 hex}`.
///
/// Uploader plus timestamp is already unique under the one-upload rule; the
/// random suffix covers clock collisions in the racing-upload case.
pub fn generate_image_id(uploader_id: UserId, uploaded_at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "img-{}-{}-{}",
        uploader_id,
        uploaded_at.timestamp_millis(),
        &suffix[..8]
    )
}

/// Longest cleaned file name kept in a storage key, in bytes.
///
/// `{imageId}-{name}` has to fit in a single 255-byte path segment.
pub const MAX_FILE_NAME_LEN: usize = 100;

/// Longest suffix after the last `.` that is kept as an extension.
const MAX_EXTENSION_LEN: usize = 16;

/// Replace every character outside `[A-Za-z0-9._-]` with `_`, capping the
/// result at [`MAX_FILE_NAME_LEN`] while keeping a short extension.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = truncate_keeping_extension(cleaned);
    // ".." must never survive into a blob key.
    let cleaned = cleaned.replace("..", "__");
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// `name` is ASCII here, so byte offsets are char boundaries.
fn truncate_keeping_extension(mut name: String) -> String {
    if name.len() <= MAX_FILE_NAME_LEN {
        return name;
    }
    let extension = match name.rfind('.') {
        Some(dot) if dot > 0 && name.len() - dot <= MAX_EXTENSION_LEN => name[dot..].to_string(),
        _ => String::new(),
    };
    name.truncate(MAX_FILE_NAME_LEN - extension.len());
    if !extension.is_empty() {
        let stem_len = name.trim_end_matches('.').len();
        name.truncate(stem_len);
    }
    name.push_str(&extension);
    name
}
