//! Caller identity supplied by the authenticating gateway in front of us.

use crate::errors::AppError;
use axum::{extract::FromRequestParts, http::request::Parts};

pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Authenticated client id taken from `X-Client-Id`.
#[derive(Debug, Clone)]
pub struct Caller(pub String);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(CLIENT_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Caller(v.to_string()))
            .ok_or_else(|| AppError::unauthorized("missing X-Client-Id header"))
    }
}
