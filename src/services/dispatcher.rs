//! Fire-and-forget webhook fan-out.
//!
//! Every matching, active subscription of the event's bucket gets its own
//! detached delivery task. Deliveries are attempted once with a fixed
//! deadline, their outcome is only logged, and one slow or failing endpoint
//! never holds up another. A shared semaphore caps in-flight deliveries and
//! a task tracker lets shutdown wait for them.

use crate::{
    errors::{ServiceError, ServiceResult},
    models::webhook::{ActiveSubscription, ExtraHeaders, NotificationEvent, WebhookEventKind},
    services::webhook_repository::WebhookRepository,
};
use bytes::Bytes;
use reqwest::{
    Client, StatusCode,
    header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT},
};
use std::{sync::Arc, time::Duration};
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);
pub const WEBHOOK_USER_AGENT: &str = "Resource-Store-Webhook/1.0";
pub const EVENT_HEADER: &str = "x-webhook-event";

/// Bytes of a subscriber's response body read before it is dropped.
const RESPONSE_PREFIX_LIMIT: usize = 4096;

/// The only capability the upload pipeline needs from the dispatcher.
///
/// Implementations must return without waiting on any delivery.
pub trait Notifier: Send + Sync {
    fn dispatch(&self, event: NotificationEvent, extra_headers: ExtraHeaders);
}

#[derive(Clone)]
pub struct WebhookDispatcher {
    repo: WebhookRepository,
    client: Client,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl WebhookDispatcher {
    pub fn new(repo: WebhookRepository, max_concurrent_deliveries: usize) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            repo,
            client,
            permits: Arc::new(Semaphore::new(max_concurrent_deliveries.max(1))),
            tracker: TaskTracker::new(),
        })
    }

    /// Resolve subscribers for `event` and launch one detached delivery per
    /// subscriber. Returns the number of deliveries launched, without waiting
    /// for any of them.
    pub async fn fan_out(
        &self,
        event: &NotificationEvent,
        extra_headers: &ExtraHeaders,
    ) -> ServiceResult<usize> {
        let subscriptions = self
            .repo
            .list_active_by_bucket_and_event(event.bucket.id, event.kind)
            .await?;

        if subscriptions.is_empty() {
            debug!(
                bucket_id = %event.bucket.id,
                event = %event.kind,
                "no active webhooks for event"
            );
            return Ok(0);
        }

        let body = Bytes::from(
            serde_json::to_vec(&event.payload())
                .map_err(|err| ServiceError::validation(format!("unserializable payload: {err}")))?,
        );

        info!(
            bucket_id = %event.bucket.id,
            event = %event.kind,
            webhook_count = subscriptions.len(),
            "dispatching webhooks"
        );

        let launched = subscriptions.len();
        for subscription in subscriptions {
            let headers = build_headers(&subscription, event.kind, extra_headers);
            let url = subscription.subscription.url;
            let client = self.client.clone();
            let permits = self.permits.clone();
            let body = body.clone();

            self.tracker.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                match deliver(&client, &url, headers, body).await {
                    Ok(status) if status.is_success() => {
                        info!(url = %url, status = status.as_u16(), "webhook delivered");
                    }
                    Ok(status) => {
                        warn!(url = %url, status = status.as_u16(), "webhook rejected by endpoint");
                    }
                    Err(err) => {
                        warn!(url = %url, error = %err, "webhook delivery failed");
                    }
                }
            });
        }

        Ok(launched)
    }

    /// Stop accepting new work and wait up to `grace` for in-flight
    /// deliveries. Returns false if the grace period ran out.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            info!(pending, "waiting for in-flight webhook deliveries");
        }
        tokio::time::timeout(grace, self.tracker.wait()).await.is_ok()
    }
}

impl Notifier for WebhookDispatcher {
    fn dispatch(&self, event: NotificationEvent, extra_headers: ExtraHeaders) {
        let dispatcher = self.clone();
        self.tracker.spawn(async move {
            if let Err(err) = dispatcher.fan_out(&event, &extra_headers).await {
                warn!(
                    bucket_id = %event.bucket.id,
                    event = %event.kind,
                    error = %err,
                    "failed to resolve webhook subscribers"
                );
            }
        });
    }
}

/// Assemble outbound headers: defaults, then the subscription's configured
/// headers, then the caller's extra headers. Each layer replaces same-named
/// entries of the previous one; names compare case-insensitively.
pub fn build_headers(
    subscription: &ActiveSubscription,
    kind: WebhookEventKind,
    extra_headers: &ExtraHeaders,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, HeaderValue::from_static(WEBHOOK_USER_AGENT));
    headers.insert(
        HeaderName::from_static(EVENT_HEADER),
        HeaderValue::from_static(kind.as_str()),
    );

    let configured = subscription
        .headers
        .iter()
        .map(|h| (h.header_name.as_str(), h.header_value.as_str()));
    let extra = extra_headers.iter().map(|(n, v)| (n.as_str(), v.as_str()));

    for (name, value) in configured.chain(extra) {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(
                webhook_id = %subscription.subscription.id,
                header = name,
                "skipping invalid webhook header"
            ),
        }
    }

    headers
}

async fn deliver(
    client: &Client,
    url: &str,
    headers: HeaderMap,
    body: Bytes,
) -> ServiceResult<StatusCode> {
    let mut response = client.post(url).headers(headers).body(body).send().await?;
    let status = response.status();

    let mut read = 0usize;
    while read < RESPONSE_PREFIX_LIMIT {
        match response.chunk().await {
            Ok(Some(chunk)) => read += chunk.len(),
            Ok(None) => break,
            Err(err) => {
                debug!(url = %url, error = %err, "stopped reading webhook response");
                break;
            }
        }
    }

    Ok(status)
}
