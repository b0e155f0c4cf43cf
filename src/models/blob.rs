//! Metadata recorded for each stored image payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Describes a payload in the blob store. The bytes themselves are not part
/// of this struct.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct BlobMeta {
    /// Storage key, unique within the store.
    pub key: String,

    /// MIME type supplied at upload time.
    pub content_type: String,

    /// Size in bytes.
    pub size_bytes: i64,

    /// Hex MD5 of the payload.
    pub etag: String,

    /// When the payload was written.
    pub created_at: DateTime<Utc>,
}
