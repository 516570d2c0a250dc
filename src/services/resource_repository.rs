//! Resource metadata rows. `(bucket_id, hash)` is enforced unique by the
//! schema, which makes the insert the arbiter of concurrent uploads.

use crate::{
    errors::{ServiceError, ServiceResult, is_unique_violation},
    models::resource::Resource,
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

const RESOURCE_COLUMNS: &str =
    "id, bucket_id, hash, size_bytes, content_type, extension, created_at";

/// Fields for a new resource row; id and timestamp are assigned on insert.
#[derive(Debug, Clone)]
pub struct NewResource {
    pub bucket_id: Uuid,
    pub hash: String,
    pub size_bytes: i64,
    pub content_type: String,
    pub extension: String,
}

#[derive(Clone)]
pub struct ResourceRepository {
    db: Arc<SqlitePool>,
}

impl ResourceRepository {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub async fn get_by_bucket_and_hash(
        &self,
        bucket_id: Uuid,
        hash: &str,
    ) -> ServiceResult<Option<Resource>> {
        let row = sqlx::query_as::<_, Resource>(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources WHERE bucket_id = ? AND hash = ?"
        ))
        .bind(bucket_id)
        .bind(hash)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row)
    }

    /// Newest first.
    pub async fn list_by_bucket(&self, bucket_id: Uuid) -> ServiceResult<Vec<Resource>> {
        let rows = sqlx::query_as::<_, Resource>(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources WHERE bucket_id = ? \
             ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(bucket_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    /// Insert a row. A duplicate `(bucket_id, hash)` yields `Conflict`, never
    /// `NotFound`, so callers can resolve a lost race into a dedup hit.
    pub async fn create(&self, new: NewResource) -> ServiceResult<Resource> {
        let result = sqlx::query_as::<_, Resource>(&format!(
            "INSERT INTO resources ({RESOURCE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?) \
             RETURNING {RESOURCE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(new.bucket_id)
        .bind(&new.hash)
        .bind(new.size_bytes)
        .bind(&new.content_type)
        .bind(&new.extension)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;

        match result {
            Ok(resource) => Ok(resource),
            Err(err) if is_unique_violation(&err) => {
                Err(ServiceError::Conflict(format!("resource `{}`", new.hash)))
            }
            Err(err) => Err(ServiceError::Database(err)),
        }
    }

    /// Delete one row; NotFound when nothing matched (e.g. a concurrent delete won).
    pub async fn delete_by_bucket_and_hash(&self, bucket_id: Uuid, hash: &str) -> ServiceResult<()> {
        let result = sqlx::query("DELETE FROM resources WHERE bucket_id = ? AND hash = ?")
            .bind(bucket_id)
            .bind(hash)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("resource"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestEnv;

    fn new_resource(bucket_id: Uuid, hash: &str) -> NewResource {
        NewResource {
            bucket_id,
            hash: hash.to_string(),
            size_bytes: 3,
            content_type: "text/plain".into(),
            extension: ".txt".into(),
        }
    }

    #[tokio::test]
    async fn duplicate_insert_is_a_conflict() {
        let env = TestEnv::new().await;
        let bucket = env.bucket("alice", "docs", false).await;

        let first = env.resources.create(new_resource(bucket.id, "abc")).await.unwrap();
        let second = env.resources.create(new_resource(bucket.id, "abc")).await;
        assert!(matches!(second, Err(ServiceError::Conflict(_))));

        let stored = env
            .resources
            .get_by_bucket_and_hash(bucket.id, "abc")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, first.id);
    }

    #[tokio::test]
    async fn same_hash_in_other_bucket_is_allowed() {
        let env = TestEnv::new().await;
        let a = env.bucket("alice", "a", false).await;
        let b = env.bucket("alice", "b", false).await;

        let ra = env.resources.create(new_resource(a.id, "abc")).await.unwrap();
        let rb = env.resources.create(new_resource(b.id, "abc")).await.unwrap();
        assert_ne!(ra.id, rb.id);
    }

    #[tokio::test]
    async fn delete_missing_row_is_not_found() {
        let env = TestEnv::new().await;
        let bucket = env.bucket("alice", "docs", false).await;

        let result = env.resources.delete_by_bucket_and_hash(bucket.id, "nope").await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_returns_only_bucket_rows() {
        let env = TestEnv::new().await;
        let a = env.bucket("alice", "a", false).await;
        let b = env.bucket("alice", "b", false).await;
        env.resources.create(new_resource(a.id, "one")).await.unwrap();
        env.resources.create(new_resource(a.id, "two")).await.unwrap();
        env.resources.create(new_resource(b.id, "three")).await.unwrap();

        let rows = env.resources.list_by_bucket(a.id).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.bucket_id == a.id));
    }
}
