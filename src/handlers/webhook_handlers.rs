//! HTTP handlers for webhook subscriptions and their custom headers.

use crate::{
    errors::AppError,
    handlers::caller::Caller,
    models::webhook::{
        CreateSubscriptionRequest, HeaderRequest, HeaderResponse, SubscriptionListResponse,
        SubscriptionResponse, UpdateHeaderRequest, UpdateSubscriptionRequest,
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

pub async fn create_webhook(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(bucket_id): Path<Uuid>,
    Json(req): Json<CreateSubscriptionRequest>,
) -> Result<(StatusCode, Json<SubscriptionResponse>), AppError> {
    let created = state.webhooks.create(&caller, bucket_id, req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_webhooks(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(bucket_id): Path<Uuid>,
) -> Result<Json<SubscriptionListResponse>, AppError> {
    let webhooks = state.webhooks.list(&caller, bucket_id).await?;
    Ok(Json(SubscriptionListResponse { webhooks }))
}

pub async fn get_webhook(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((bucket_id, webhook_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<SubscriptionResponse>, AppError> {
    Ok(Json(state.webhooks.get(&caller, bucket_id, webhook_id).await?))
}

pub async fn update_webhook(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((bucket_id, webhook_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateSubscriptionRequest>,
) -> Result<Json<SubscriptionResponse>, AppError> {
    let updated = state
        .webhooks
        .update(&caller, bucket_id, webhook_id, req)
        .await?;
    Ok(Json(updated))
}

pub async fn delete_webhook(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((bucket_id, webhook_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    state.webhooks.delete(&caller, bucket_id, webhook_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_webhook_header(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((bucket_id, webhook_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<HeaderRequest>,
) -> Result<(StatusCode, Json<HeaderResponse>), AppError> {
    let header = state
        .webhooks
        .add_header(&caller, bucket_id, webhook_id, &req.name, &req.value)
        .await?;
    Ok((StatusCode::CREATED, Json(header)))
}

pub async fn update_webhook_header(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((bucket_id, webhook_id, header_id)): Path<(Uuid, Uuid, Uuid)>,
    Json(req): Json<UpdateHeaderRequest>,
) -> Result<Json<HeaderResponse>, AppError> {
    let header = state
        .webhooks
        .update_header(&caller, bucket_id, webhook_id, header_id, &req.value)
        .await?;
    Ok(Json(header))
}

pub async fn delete_webhook_header(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((bucket_id, webhook_id, header_id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    state
        .webhooks
        .delete_header(&caller, bucket_id, webhook_id, header_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
