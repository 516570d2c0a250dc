//! Webhook subscriptions and the notification events fanned out to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use super::{bucket::Bucket, resource::Resource};
use crate::errors::ServiceError;

/// Resource lifecycle events a subscription can listen for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
pub enum WebhookEventKind {
    #[serde(rename = "resource.new")]
    #[sqlx(rename = "resource.new")]
    ResourceNew,
    #[serde(rename = "resource.deleted")]
    #[sqlx(rename = "resource.deleted")]
    ResourceDeleted,
}

impl WebhookEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventKind::ResourceNew => "resource.new",
            WebhookEventKind::ResourceDeleted => "resource.deleted",
        }
    }
}

impl Display for WebhookEventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookEventKind {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resource.new" => Ok(WebhookEventKind::ResourceNew),
            "resource.deleted" => Ok(WebhookEventKind::ResourceDeleted),
            _ => Err(ServiceError::validation(format!(
                "event_type must be 'resource.new' or 'resource.deleted', got '{}'",
                s
            ))),
        }
    }
}

/// A registered webhook endpoint for one bucket and one event kind.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct WebhookSubscription {
    pub id: Uuid,
    pub bucket_id: Uuid,
    pub url: String,
    pub event_type: WebhookEventKind,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Custom header attached to a subscription, applied in insertion order.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct WebhookHeader {
    pub id: Uuid,
    pub webhook_url_id: Uuid,
    pub header_name: String,
    pub header_value: String,
    pub created_at: DateTime<Utc>,
}

/// Subscription resolved for delivery, together with its configured headers.
#[derive(Clone, Debug)]
pub struct ActiveSubscription {
    pub subscription: WebhookSubscription,
    pub headers: Vec<WebhookHeader>,
}

/// Caller-supplied headers forwarded verbatim to every delivery of one event.
pub type ExtraHeaders = Vec<(String, String)>;

#[derive(Clone, Debug, PartialEq)]
pub struct BucketSnapshot {
    pub id: Uuid,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResourceSnapshot {
    pub id: Uuid,
    pub hash: String,
    pub size_bytes: i64,
    pub content_type: String,
    pub extension: String,
}

/// Immutable description of one resource lifecycle occurrence.
///
/// Built once per successful upload or delete and discarded after fan-out.
#[derive(Clone, Debug, PartialEq)]
pub struct NotificationEvent {
    pub kind: WebhookEventKind,
    pub bucket: BucketSnapshot,
    pub resource: ResourceSnapshot,
    pub resource_url: String,
}

impl NotificationEvent {
    pub fn new(
        kind: WebhookEventKind,
        bucket: &Bucket,
        resource: &Resource,
        resource_url: String,
    ) -> Self {
        Self {
            kind,
            bucket: BucketSnapshot {
                id: bucket.id,
                name: bucket.name.clone(),
            },
            resource: ResourceSnapshot {
                id: resource.id,
                hash: resource.hash.clone(),
                size_bytes: resource.size_bytes,
                content_type: resource.content_type.clone(),
                extension: resource.extension.clone(),
            },
            resource_url,
        }
    }

    /// Render the wire payload, stamped with the current UTC time.
    pub fn payload(&self) -> WebhookPayload {
        WebhookPayload {
            event: self.kind,
            timestamp: Utc::now(),
            bucket_id: self.bucket.id.to_string(),
            bucket_name: self.bucket.name.clone(),
            resource_id: self.resource.id.to_string(),
            resource_url: self.resource_url.clone(),
            resource: ResourcePayload {
                hash: self.resource.hash.clone(),
                size: self.resource.size_bytes,
                content_type: self.resource.content_type.clone(),
                extension: self.resource.extension.clone(),
            },
        }
    }
}

/// JSON body POSTed to subscriber endpoints.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WebhookPayload {
    pub event: WebhookEventKind,
    pub timestamp: DateTime<Utc>,
    pub bucket_id: String,
    pub bucket_name: String,
    pub resource_id: String,
    pub resource_url: String,
    pub resource: ResourcePayload,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ResourcePayload {
    pub hash: String,
    pub size: i64,
    pub content_type: String,
    pub extension: String,
}

// --- Subscription management DTOs ---

#[derive(Deserialize, Debug, Clone)]
pub struct CreateSubscriptionRequest {
    pub url: String,
    pub event_type: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub headers: Vec<HeaderRequest>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct UpdateSubscriptionRequest {
    pub url: String,
    pub event_type: String,
    pub is_active: bool,
}

#[derive(Deserialize, Debug, Clone)]
pub struct HeaderRequest {
    pub name: String,
    pub value: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct UpdateHeaderRequest {
    pub value: String,
}

fn default_active() -> bool {
    true
}

#[derive(Serialize, Debug, Clone)]
pub struct HeaderResponse {
    pub id: Uuid,
    pub name: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

impl From<WebhookHeader> for HeaderResponse {
    fn from(h: WebhookHeader) -> Self {
        Self {
            id: h.id,
            name: h.header_name,
            value: h.header_value,
            created_at: h.created_at,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct SubscriptionResponse {
    pub id: Uuid,
    pub bucket_id: Uuid,
    pub url: String,
    pub event_type: WebhookEventKind,
    pub is_active: bool,
    pub headers: Vec<HeaderResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionResponse {
    pub fn new(subscription: WebhookSubscription, headers: Vec<WebhookHeader>) -> Self {
        Self {
            id: subscription.id,
            bucket_id: subscription.bucket_id,
            url: subscription.url,
            event_type: subscription.event_type,
            is_active: subscription.is_active,
            headers: headers.into_iter().map(HeaderResponse::from).collect(),
            created_at: subscription.created_at,
            updated_at: subscription.updated_at,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct SubscriptionListResponse {
    pub webhooks: Vec<SubscriptionResponse>,
}
