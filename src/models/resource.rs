//! Represents a content-addressed resource stored in a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata row for one stored blob.
///
/// `(bucket_id, hash)` is unique; the blob lives at
/// `{storage_root}/{bucket_id}/{hash}{extension}`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct Resource {
    pub id: Uuid,

    pub bucket_id: Uuid,

    /// Lowercase hex SHA-256 of the full content.
    pub hash: String,

    pub size_bytes: i64,

    /// Media type declared by the uploader.
    pub content_type: String,

    /// File-name extension including the leading dot, or empty.
    pub extension: String,

    pub created_at: DateTime<Utc>,
}

impl Resource {
    /// On-disk file name of the backing blob.
    pub fn filename(&self) -> String {
        blob_filename(&self.hash, &self.extension)
    }
}

pub fn blob_filename(hash: &str, extension: &str) -> String {
    format!("{}{}", hash, extension)
}

/// JSON shape returned to API callers.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ResourceResponse {
    pub id: Uuid,
    pub hash: String,
    pub size: i64,
    pub content_type: String,
    pub extension: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ResourceListResponse {
    pub resources: Vec<ResourceResponse>,
}
