//! Defines routes for resource and webhook operations.
//!
//! ## Structure
//! - **Resources** (caller identity from `X-Client-Id`)
//!   - `GET    /buckets/{bucket_id}/resources`: list, newest first
//!   - `PUT    /buckets/{bucket_id}/resources`: upload raw body
//!   - `POST   /buckets/{bucket_id}/resources`: upload multipart `file` part
//!   - `GET    /buckets/{bucket_id}/resources/{hash}`: download
//!   - `HEAD   /buckets/{bucket_id}/resources/{hash}`: metadata headers only
//!   - `DELETE /buckets/{bucket_id}/resources/{hash}`: delete
//!
//! - **Webhooks**
//!   - `GET|POST /buckets/{bucket_id}/webhooks`
//!   - `GET|PUT|DELETE /buckets/{bucket_id}/webhooks/{webhook_id}`
//!   - `POST /buckets/{bucket_id}/webhooks/{webhook_id}/headers`
//!   - `PUT|DELETE /buckets/{bucket_id}/webhooks/{webhook_id}/headers/{header_id}`
//!
//! - **Public** (no identity): `GET /public/{bucket_id}/{hash}`
//!
//! `{hash}` accepts the bare digest or `{digest}{extension}`.

use crate::{
    handlers::{
        resource_handlers::{
            delete_resource, get_public_resource, get_resource, head_resource, list_resources,
            upload_multipart, upload_resource,
        },
        webhook_handlers::{
            add_webhook_header, create_webhook, delete_webhook, delete_webhook_header,
            get_webhook, list_webhooks, update_webhook, update_webhook_header,
        },
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

/// Build the router. Handlers share `AppState`.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/buckets/{bucket_id}/resources",
            get(list_resources)
                .put(upload_resource)
                .post(upload_multipart)
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route(
            "/buckets/{bucket_id}/resources/{hash}",
            get(get_resource)
                .head(head_resource)
                .delete(delete_resource),
        )
        .route(
            "/buckets/{bucket_id}/webhooks",
            get(list_webhooks).post(create_webhook),
        )
        .route(
            "/buckets/{bucket_id}/webhooks/{webhook_id}",
            get(get_webhook).put(update_webhook).delete(delete_webhook),
        )
        .route(
            "/buckets/{bucket_id}/webhooks/{webhook_id}/headers",
            post(add_webhook_header),
        )
        .route(
            "/buckets/{bucket_id}/webhooks/{webhook_id}/headers/{header_id}",
            put(update_webhook_header).delete(delete_webhook_header),
        )
        .route("/public/{bucket_id}/{hash}", get(get_public_resource))
}
