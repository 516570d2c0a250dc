//! HTTP handlers for resource upload, download, listing and deletion.
//! Request and response bodies are streamed; nothing is buffered whole.

use crate::{
    errors::AppError,
    handlers::caller::Caller,
    models::{
        resource::{Resource, ResourceListResponse},
        webhook::ExtraHeaders,
    },
    services::resource_service::{DEFAULT_CONTENT_TYPE, UploadOutcome},
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use std::io;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

pub const EXTENSION_HEADER: &str = "x-file-extension";
pub const HASH_HEADER: &str = "x-resource-hash";
/// Request headers with this prefix are forwarded to webhooks without it.
pub const WEBHOOK_HEADER_PREFIX: &str = "x-webhook-header-";

/// PUT `/buckets/{bucket_id}/resources`: upload the raw request body.
pub async fn upload_resource(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(bucket_id): Path<Uuid>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    let content_type = header_str(&headers, header::CONTENT_TYPE.as_str())
        .unwrap_or(DEFAULT_CONTENT_TYPE);
    let extension = header_str(&headers, EXTENSION_HEADER);

    let stream = body.into_data_stream().map(|chunk| chunk.map_err(io::Error::other));

    let outcome = state
        .resources
        .upload_stream(
            &caller,
            bucket_id,
            content_type,
            extension,
            stream,
            forwarded_webhook_headers(&headers),
        )
        .await?;

    Ok(upload_response(&state, outcome))
}

/// POST `/buckets/{bucket_id}/resources`: upload the multipart part named `file`.
pub async fn upload_multipart(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(bucket_id): Path<Uuid>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let extension = header_str(&headers, EXTENSION_HEADER);
    let extra = forwarded_webhook_headers(&headers);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let stream = field.map(|chunk| chunk.map_err(io::Error::other));

        let outcome = state
            .resources
            .upload_file(
                &caller,
                bucket_id,
                file_name.as_deref(),
                content_type.as_deref(),
                extension,
                stream,
                extra,
            )
            .await?;

        return Ok(upload_response(&state, outcome));
    }

    Err(AppError::bad_request("multipart body has no `file` part"))
}

/// GET `/buckets/{bucket_id}/resources`: newest first.
pub async fn list_resources(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(bucket_id): Path<Uuid>,
) -> Result<Json<ResourceListResponse>, AppError> {
    let (bucket, resources) = state.resources.list(&caller, bucket_id).await?;
    Ok(Json(ResourceListResponse {
        resources: resources
            .iter()
            .map(|r| state.resources.to_response(&bucket, r))
            .collect(),
    }))
}

/// GET `/buckets/{bucket_id}/resources/{hash}`: stream the content.
pub async fn get_resource(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((bucket_id, hash)): Path<(Uuid, String)>,
) -> Result<Response, AppError> {
    let (_, resource, file) = state.resources.download(&caller, bucket_id, &hash).await?;
    Ok(content_response(&resource, file))
}

/// HEAD `/buckets/{bucket_id}/resources/{hash}`: headers only.
pub async fn head_resource(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((bucket_id, hash)): Path<(Uuid, String)>,
) -> Result<Response, AppError> {
    let (_, resource) = state.resources.get(&caller, bucket_id, &hash).await?;
    let mut response = Response::new(Body::empty());
    set_resource_headers(response.headers_mut(), &resource);
    Ok(response)
}

/// DELETE `/buckets/{bucket_id}/resources/{hash}`
pub async fn delete_resource(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((bucket_id, hash)): Path<(Uuid, String)>,
) -> Result<StatusCode, AppError> {
    state.resources.delete(&caller, bucket_id, &hash).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET `/public/{bucket_id}/{hash}`: anonymous download from public buckets.
pub async fn get_public_resource(
    State(state): State<AppState>,
    Path((bucket_id, hash)): Path<(Uuid, String)>,
) -> Result<Response, AppError> {
    let (_, resource, file) = state.resources.download_public(bucket_id, &hash).await?;
    Ok(content_response(&resource, file))
}

fn upload_response(state: &AppState, outcome: UploadOutcome) -> Response {
    let UploadOutcome {
        bucket,
        resource,
        created,
    } = outcome;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (status, Json(state.resources.to_response(&bucket, &resource))).into_response()
}

fn content_response(resource: &Resource, file: tokio::fs::File) -> Response {
    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    set_resource_headers(response.headers_mut(), resource);
    response
}

fn set_resource_headers(headers: &mut HeaderMap, resource: &Resource) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&resource.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(resource.size_bytes.max(0)),
    );
    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", resource.hash)) {
        headers.insert(header::ETAG, value);
    }
    if let Ok(value) = HeaderValue::from_str(&resource.hash) {
        headers.insert(HeaderName::from_static(HASH_HEADER), value);
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Collect `X-Webhook-Header-*` request headers with the prefix stripped.
pub fn forwarded_webhook_headers(headers: &HeaderMap) -> ExtraHeaders {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let forwarded = name.as_str().strip_prefix(WEBHOOK_HEADER_PREFIX)?;
            if forwarded.is_empty() {
                return None;
            }
            let value = value.to_str().ok()?;
            Some((forwarded.to_string(), value.to_string()))
        })
        .collect()
}
