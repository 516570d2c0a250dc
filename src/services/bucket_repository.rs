//! Read access to buckets, plus the insert used for seeding.

use crate::{
    errors::{ServiceError, ServiceResult, is_unique_violation},
    models::bucket::Bucket,
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct BucketRepository {
    db: Arc<SqlitePool>,
}

impl BucketRepository {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Fetch bucket metadata. Returns NotFound if missing.
    pub async fn get_by_id(&self, id: Uuid) -> ServiceResult<Bucket> {
        sqlx::query_as::<_, Bucket>(
            "SELECT id, name, client_id, is_public, created_at FROM buckets WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| ServiceError::not_found("bucket"))
    }

    /// Fetch a bucket only if `client_id` owns it.
    ///
    /// Foreign buckets are reported as NotFound so their existence never leaks.
    pub async fn get_owned(&self, client_id: &str, id: Uuid) -> ServiceResult<Bucket> {
        let bucket = self.get_by_id(id).await?;
        if !bucket.is_owned_by(client_id) {
            return Err(ServiceError::not_found("bucket"));
        }
        Ok(bucket)
    }

    pub async fn create(&self, client_id: &str, name: &str, is_public: bool) -> ServiceResult<Bucket> {
        let bucket = Bucket {
            id: Uuid::new_v4(),
            name: name.to_string(),
            client_id: client_id.to_string(),
            is_public,
            created_at: Utc::now(),
        };

        match sqlx::query(
            "INSERT INTO buckets (id, name, client_id, is_public, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(bucket.id)
        .bind(&bucket.name)
        .bind(&bucket.client_id)
        .bind(bucket.is_public)
        .bind(bucket.created_at)
        .execute(&*self.db)
        .await
        {
            Ok(_) => Ok(bucket),
            Err(err) if is_unique_violation(&err) => {
                Err(ServiceError::Conflict(format!("bucket `{}`", name)))
            }
            Err(err) => Err(ServiceError::Database(err)),
        }
    }
}
