//! Subscription and header management for a caller's own buckets.

use crate::{
    errors::{ServiceError, ServiceResult},
    models::webhook::{
        CreateSubscriptionRequest, HeaderResponse, SubscriptionResponse, UpdateSubscriptionRequest,
        WebhookEventKind, WebhookSubscription,
    },
    services::{bucket_repository::BucketRepository, webhook_repository::WebhookRepository},
};
use reqwest::{
    Url,
    header::{HeaderName, HeaderValue},
};
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct WebhookService {
    buckets: BucketRepository,
    webhooks: WebhookRepository,
}

impl WebhookService {
    pub fn new(buckets: BucketRepository, webhooks: WebhookRepository) -> Self {
        Self { buckets, webhooks }
    }

    pub async fn create(
        &self,
        caller: &str,
        bucket_id: Uuid,
        req: CreateSubscriptionRequest,
    ) -> ServiceResult<SubscriptionResponse> {
        let bucket = self.buckets.get_owned(caller, bucket_id).await?;
        let url = validate_url(&req.url)?;
        let kind: WebhookEventKind = req.event_type.parse()?;
        for header in &req.headers {
            validate_header(&header.name, &header.value)?;
        }

        let initial_headers: Vec<(String, String)> = req
            .headers
            .iter()
            .map(|h| (h.name.trim().to_string(), h.value.clone()))
            .collect();
        let (subscription, headers) = self
            .webhooks
            .create_subscription_with_headers(bucket.id, &url, kind, req.is_active, &initial_headers)
            .await?;

        info!(
            bucket_id = %bucket.id,
            webhook_id = %subscription.id,
            event = %kind,
            "registered webhook"
        );
        Ok(SubscriptionResponse::new(subscription, headers))
    }

    pub async fn list(&self, caller: &str, bucket_id: Uuid) -> ServiceResult<Vec<SubscriptionResponse>> {
        let bucket = self.buckets.get_owned(caller, bucket_id).await?;
        let mut out = Vec::new();
        for subscription in self.webhooks.list_by_bucket(bucket.id).await? {
            let headers = self.webhooks.list_headers(subscription.id).await?;
            out.push(SubscriptionResponse::new(subscription, headers));
        }
        Ok(out)
    }

    pub async fn get(
        &self,
        caller: &str,
        bucket_id: Uuid,
        webhook_id: Uuid,
    ) -> ServiceResult<SubscriptionResponse> {
        let subscription = self.owned_subscription(caller, bucket_id, webhook_id).await?;
        let headers = self.webhooks.list_headers(subscription.id).await?;
        Ok(SubscriptionResponse::new(subscription, headers))
    }

    pub async fn update(
        &self,
        caller: &str,
        bucket_id: Uuid,
        webhook_id: Uuid,
        req: UpdateSubscriptionRequest,
    ) -> ServiceResult<SubscriptionResponse> {
        let subscription = self.owned_subscription(caller, bucket_id, webhook_id).await?;
        let url = validate_url(&req.url)?;
        let kind: WebhookEventKind = req.event_type.parse()?;

        let updated = self
            .webhooks
            .update_subscription(subscription.id, &url, kind, req.is_active)
            .await?;
        let headers = self.webhooks.list_headers(updated.id).await?;
        Ok(SubscriptionResponse::new(updated, headers))
    }

    pub async fn delete(&self, caller: &str, bucket_id: Uuid, webhook_id: Uuid) -> ServiceResult<()> {
        let subscription = self.owned_subscription(caller, bucket_id, webhook_id).await?;
        self.webhooks.delete_subscription(subscription.id).await?;
        info!(bucket_id = %bucket_id, webhook_id = %webhook_id, "removed webhook");
        Ok(())
    }

    pub async fn add_header(
        &self,
        caller: &str,
        bucket_id: Uuid,
        webhook_id: Uuid,
        name: &str,
        value: &str,
    ) -> ServiceResult<HeaderResponse> {
        let subscription = self.owned_subscription(caller, bucket_id, webhook_id).await?;
        validate_header(name, value)?;
        let header = self
            .webhooks
            .create_header(subscription.id, name.trim(), value)
            .await?;
        Ok(header.into())
    }

    pub async fn update_header(
        &self,
        caller: &str,
        bucket_id: Uuid,
        webhook_id: Uuid,
        header_id: Uuid,
        value: &str,
    ) -> ServiceResult<HeaderResponse> {
        let subscription = self.owned_subscription(caller, bucket_id, webhook_id).await?;
        let header = self.webhooks.get_header(header_id).await?;
        if header.webhook_url_id != subscription.id {
            return Err(ServiceError::not_found("webhook header"));
        }
        validate_header(&header.header_name, value)?;
        Ok(self.webhooks.update_header(header.id, value).await?.into())
    }

    pub async fn delete_header(
        &self,
        caller: &str,
        bucket_id: Uuid,
        webhook_id: Uuid,
        header_id: Uuid,
    ) -> ServiceResult<()> {
        let subscription = self.owned_subscription(caller, bucket_id, webhook_id).await?;
        let header = self.webhooks.get_header(header_id).await?;
        if header.webhook_url_id != subscription.id {
            return Err(ServiceError::not_found("webhook header"));
        }
        self.webhooks.delete_header(header.id).await
    }

    /// A subscription from another bucket is indistinguishable from a missing one.
    async fn owned_subscription(
        &self,
        caller: &str,
        bucket_id: Uuid,
        webhook_id: Uuid,
    ) -> ServiceResult<WebhookSubscription> {
        let bucket = self.buckets.get_owned(caller, bucket_id).await?;
        let subscription = self.webhooks.get_subscription(webhook_id).await?;
        if subscription.bucket_id != bucket.id {
            return Err(ServiceError::not_found("webhook"));
        }
        Ok(subscription)
    }
}

/// Accept absolute http(s) URLs with a host; returns the trimmed URL.
fn validate_url(raw: &str) -> ServiceResult<String> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed)
        .map_err(|err| ServiceError::validation(format!("invalid webhook url `{}`: {}", raw, err)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ServiceError::validation("webhook url must use http or https"));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ServiceError::validation("webhook url must include a host"));
    }
    Ok(trimmed.to_string())
}

fn validate_header(name: &str, value: &str) -> ServiceResult<()> {
    HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|_| ServiceError::validation(format!("invalid header name `{}`", name)))?;
    HeaderValue::from_str(value)
        .map_err(|_| ServiceError::validation(format!("invalid value for header `{}`", name)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::webhook::HeaderRequest, test_support::TestEnv};

    fn service(env: &TestEnv) -> WebhookService {
        WebhookService::new(env.buckets.clone(), env.webhooks.clone())
    }

    fn request(url: &str, event: &str) -> CreateSubscriptionRequest {
        CreateSubscriptionRequest {
            url: url.into(),
            event_type: event.into(),
            is_active: true,
            headers: vec![HeaderRequest {
                name: "X-Token".into(),
                value: "secret".into(),
            }],
        }
    }

    #[tokio::test]
    async fn create_lists_with_headers() {
        let env = TestEnv::new().await;
        let svc = service(&env);
        let bucket = env.bucket("alice", "photos", false).await;

        let created = svc
            .create("alice", bucket.id, request("https://hooks.example.com/a", "resource.new"))
            .await
            .unwrap();
        assert_eq!(created.event_type, WebhookEventKind::ResourceNew);
        assert_eq!(created.headers.len(), 1);

        let listed = svc.list("alice", bucket.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].headers[0].name, "X-Token");
        assert_eq!(listed[0].headers[0].value, "secret");
    }

    #[tokio::test]
    async fn malformed_url_or_event_is_a_validation_error() {
        let env = TestEnv::new().await;
        let svc = service(&env);
        let bucket = env.bucket("alice", "photos", false).await;

        for url in ["not a url", "ftp://example.com/x", "file:///etc/passwd"] {
            let result = svc.create("alice", bucket.id, request(url, "resource.new")).await;
            assert!(matches!(result, Err(ServiceError::Validation(_))), "{url}");
        }

        let result = svc
            .create("alice", bucket.id, request("https://example.com/x", "resource.updated"))
            .await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));
        assert!(svc.list("alice", bucket.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let env = TestEnv::new().await;
        let svc = service(&env);
        let bucket = env.bucket("alice", "photos", false).await;

        svc.create("alice", bucket.id, request("https://example.com/x", "resource.new"))
            .await
            .unwrap();
        let again = svc
            .create("alice", bucket.id, request("https://example.com/x", "resource.new"))
            .await;
        assert!(matches!(again, Err(ServiceError::Conflict(_))));

        // Same URL for the other event kind is a separate registration.
        svc.create("alice", bucket.id, request("https://example.com/x", "resource.deleted"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn header_failure_leaves_no_subscription_behind() {
        let env = TestEnv::new().await;
        let svc = service(&env);
        let bucket = env.bucket("alice", "photos", false).await;

        sqlx::query(
            "CREATE TRIGGER reject_headers BEFORE INSERT ON webhook_headers \
             BEGIN SELECT RAISE(ABORT, 'header store unavailable'); END",
        )
        .execute(&*env.db)
        .await
        .unwrap();

        let result = svc
            .create("alice", bucket.id, request("https://example.com/x", "resource.new"))
            .await;
        assert!(matches!(result, Err(ServiceError::Database(_))));
        assert!(svc.list("alice", bucket.id).await.unwrap().is_empty());

        // Without initial headers the same registration goes through.
        let mut bare = request("https://example.com/x", "resource.new");
        bare.headers.clear();
        svc.create("alice", bucket.id, bare).await.unwrap();
    }

    #[tokio::test]
    async fn foreign_bucket_subscriptions_are_hidden() {
        let env = TestEnv::new().await;
        let svc = service(&env);
        let mine = env.bucket("alice", "photos", false).await;
        let theirs = env.bucket("bob", "photos", false).await;

        let sub = svc
            .create("bob", theirs.id, request("https://example.com/x", "resource.new"))
            .await
            .unwrap();

        assert!(matches!(
            svc.get("alice", mine.id, sub.id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            svc.delete("alice", theirs.id, sub.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_and_header_lifecycle() {
        let env = TestEnv::new().await;
        let svc = service(&env);
        let bucket = env.bucket("alice", "photos", false).await;

        let sub = svc
            .create("alice", bucket.id, request("https://example.com/x", "resource.new"))
            .await
            .unwrap();

        let updated = svc
            .update(
                "alice",
                bucket.id,
                sub.id,
                UpdateSubscriptionRequest {
                    url: "https://example.com/y".into(),
                    event_type: "resource.deleted".into(),
                    is_active: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.url, "https://example.com/y");
        assert!(!updated.is_active);
        assert_eq!(updated.headers.len(), 1);

        let added = svc
            .add_header("alice", bucket.id, sub.id, "X-Extra", "1")
            .await
            .unwrap();
        let changed = svc
            .update_header("alice", bucket.id, sub.id, added.id, "2")
            .await
            .unwrap();
        assert_eq!(changed.value, "2");

        svc.delete_header("alice", bucket.id, sub.id, added.id).await.unwrap();
        assert_eq!(svc.get("alice", bucket.id, sub.id).await.unwrap().headers.len(), 1);

        assert!(matches!(
            svc.add_header("alice", bucket.id, sub.id, "bad name", "v").await,
            Err(ServiceError::Validation(_))
        ));

        svc.delete("alice", bucket.id, sub.id).await.unwrap();
        assert!(svc.list("alice", bucket.id).await.unwrap().is_empty());
    }
}
