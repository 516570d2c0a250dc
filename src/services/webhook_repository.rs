//! Persistence for webhook subscriptions and their custom headers.

use crate::{
    errors::{ServiceError, ServiceResult, is_unique_violation},
    models::webhook::{ActiveSubscription, WebhookEventKind, WebhookHeader, WebhookSubscription},
};
use chrono::Utc;
use sqlx::{Executor, Sqlite, SqlitePool};
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

const SUBSCRIPTION_COLUMNS: &str = "id, bucket_id, url, event_type, is_active, created_at, updated_at";
const HEADER_COLUMNS: &str = "id, webhook_url_id, header_name, header_value, created_at";

#[derive(Clone)]
pub struct WebhookRepository {
    db: Arc<SqlitePool>,
}

impl WebhookRepository {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Active subscriptions of `bucket_id` listening for `kind`, each with its
    /// headers in insertion order.
    pub async fn list_active_by_bucket_and_event(
        &self,
        bucket_id: Uuid,
        kind: WebhookEventKind,
    ) -> ServiceResult<Vec<ActiveSubscription>> {
        let subscriptions = sqlx::query_as::<_, WebhookSubscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM webhook_urls \
             WHERE bucket_id = ? AND event_type = ? AND is_active = 1 ORDER BY rowid"
        ))
        .bind(bucket_id)
        .bind(kind)
        .fetch_all(&*self.db)
        .await?;

        if subscriptions.is_empty() {
            return Ok(Vec::new());
        }

        let headers = sqlx::query_as::<_, WebhookHeader>(
            "SELECT h.id, h.webhook_url_id, h.header_name, h.header_value, h.created_at \
             FROM webhook_headers h JOIN webhook_urls u ON u.id = h.webhook_url_id \
             WHERE u.bucket_id = ? AND u.event_type = ? AND u.is_active = 1 ORDER BY h.rowid",
        )
        .bind(bucket_id)
        .bind(kind)
        .fetch_all(&*self.db)
        .await?;

        let mut by_subscription: HashMap<Uuid, Vec<WebhookHeader>> = HashMap::new();
        for header in headers {
            by_subscription
                .entry(header.webhook_url_id)
                .or_default()
                .push(header);
        }

        Ok(subscriptions
            .into_iter()
            .map(|subscription| ActiveSubscription {
                headers: by_subscription.remove(&subscription.id).unwrap_or_default(),
                subscription,
            })
            .collect())
    }

    pub async fn get_subscription(&self, id: Uuid) -> ServiceResult<WebhookSubscription> {
        sqlx::query_as::<_, WebhookSubscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM webhook_urls WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| ServiceError::not_found("webhook"))
    }

    pub async fn list_by_bucket(&self, bucket_id: Uuid) -> ServiceResult<Vec<WebhookSubscription>> {
        let rows = sqlx::query_as::<_, WebhookSubscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM webhook_urls WHERE bucket_id = ? ORDER BY rowid"
        ))
        .bind(bucket_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    /// Insert a subscription. The same (bucket, url, event) twice is a `Conflict`.
    pub async fn create_subscription(
        &self,
        bucket_id: Uuid,
        url: &str,
        kind: WebhookEventKind,
        is_active: bool,
    ) -> ServiceResult<WebhookSubscription> {
        let result = insert_subscription(&*self.db, bucket_id, url, kind, is_active).await;
        map_subscription_write(result, url, kind)
    }

    /// Insert a subscription together with its headers. Either everything is
    /// stored or nothing is.
    pub async fn create_subscription_with_headers(
        &self,
        bucket_id: Uuid,
        url: &str,
        kind: WebhookEventKind,
        is_active: bool,
        headers: &[(String, String)],
    ) -> ServiceResult<(WebhookSubscription, Vec<WebhookHeader>)> {
        let mut tx = self.db.begin().await?;

        let result = insert_subscription(&mut *tx, bucket_id, url, kind, is_active).await;
        let subscription = map_subscription_write(result, url, kind)?;

        let mut stored = Vec::with_capacity(headers.len());
        for (name, value) in headers {
            stored.push(insert_header(&mut *tx, subscription.id, name, value).await?);
        }

        tx.commit().await?;
        Ok((subscription, stored))
    }

    pub async fn update_subscription(
        &self,
        id: Uuid,
        url: &str,
        kind: WebhookEventKind,
        is_active: bool,
    ) -> ServiceResult<WebhookSubscription> {
        let result = sqlx::query_as::<_, WebhookSubscription>(&format!(
            "UPDATE webhook_urls SET url = ?, event_type = ?, is_active = ?, updated_at = ? \
             WHERE id = ? RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(url)
        .bind(kind)
        .bind(is_active)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&*self.db)
        .await;

        match result {
            Err(sqlx::Error::RowNotFound) => Err(ServiceError::not_found("webhook")),
            other => map_subscription_write(other, url, kind),
        }
    }

    /// Headers are removed with the subscription by the cascade.
    pub async fn delete_subscription(&self, id: Uuid) -> ServiceResult<()> {
        let result = sqlx::query("DELETE FROM webhook_urls WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("webhook"));
        }
        Ok(())
    }

    pub async fn list_headers(&self, webhook_url_id: Uuid) -> ServiceResult<Vec<WebhookHeader>> {
        let rows = sqlx::query_as::<_, WebhookHeader>(&format!(
            "SELECT {HEADER_COLUMNS} FROM webhook_headers WHERE webhook_url_id = ? ORDER BY rowid"
        ))
        .bind(webhook_url_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    pub async fn get_header(&self, id: Uuid) -> ServiceResult<WebhookHeader> {
        sqlx::query_as::<_, WebhookHeader>(&format!(
            "SELECT {HEADER_COLUMNS} FROM webhook_headers WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| ServiceError::not_found("webhook header"))
    }

    pub async fn create_header(
        &self,
        webhook_url_id: Uuid,
        name: &str,
        value: &str,
    ) -> ServiceResult<WebhookHeader> {
        Ok(insert_header(&*self.db, webhook_url_id, name, value).await?)
    }

    pub async fn update_header(&self, id: Uuid, value: &str) -> ServiceResult<WebhookHeader> {
        sqlx::query_as::<_, WebhookHeader>(&format!(
            "UPDATE webhook_headers SET header_value = ? WHERE id = ? RETURNING {HEADER_COLUMNS}"
        ))
        .bind(value)
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| ServiceError::not_found("webhook header"))
    }

    pub async fn delete_header(&self, id: Uuid) -> ServiceResult<()> {
        let result = sqlx::query("DELETE FROM webhook_headers WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("webhook header"));
        }
        Ok(())
    }
}

async fn insert_subscription<'e, E>(
    executor: E,
    bucket_id: Uuid,
    url: &str,
    kind: WebhookEventKind,
    is_active: bool,
) -> Result<WebhookSubscription, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let now = Utc::now();
    sqlx::query_as::<_, WebhookSubscription>(&format!(
        "INSERT INTO webhook_urls ({SUBSCRIPTION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?) \
         RETURNING {SUBSCRIPTION_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(bucket_id)
    .bind(url)
    .bind(kind)
    .bind(is_active)
    .bind(now)
    .bind(now)
    .fetch_one(executor)
    .await
}

async fn insert_header<'e, E>(
    executor: E,
    webhook_url_id: Uuid,
    name: &str,
    value: &str,
) -> Result<WebhookHeader, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, WebhookHeader>(&format!(
        "INSERT INTO webhook_headers ({HEADER_COLUMNS}) VALUES (?, ?, ?, ?, ?) \
         RETURNING {HEADER_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(webhook_url_id)
    .bind(name)
    .bind(value)
    .bind(Utc::now())
    .fetch_one(executor)
    .await
}

fn map_subscription_write(
    result: Result<WebhookSubscription, sqlx::Error>,
    url: &str,
    kind: WebhookEventKind,
) -> ServiceResult<WebhookSubscription> {
    match result {
        Ok(row) => Ok(row),
        Err(err) if is_unique_violation(&err) => Err(ServiceError::Conflict(format!(
            "webhook `{}` for event `{}`",
            url, kind
        ))),
        Err(err) => Err(ServiceError::Database(err)),
    }
}
