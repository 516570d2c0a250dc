//! Represents a bucket as seen by the resource pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A storage bucket owned by exactly one client.
///
/// The pipeline only reads buckets: it checks ownership before touching
/// resources and copies the id/name into notification payloads.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Bucket {
    pub id: Uuid,

    /// Human-readable name, unique per owning client.
    pub name: String,

    /// Identifier of the client that owns this bucket.
    pub client_id: String,

    /// Public buckets expose an anonymous `public_url` on every resource.
    pub is_public: bool,

    pub created_at: DateTime<Utc>,
}

impl Bucket {
    /// Ownership and existence are reported the same way to callers.
    pub fn is_owned_by(&self, client_id: &str) -> bool {
        self.client_id == client_id
    }
}
