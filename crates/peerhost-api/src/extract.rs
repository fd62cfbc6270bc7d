//! Request extractors.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use peerhost_core::models::OdinId;
use peerhost_core::AppError;

use crate::error::HttpAppError;

/// Header carrying the authenticated calling identity, set by the upstream
/// authentication layer.
pub const SENDER_HEADER: &str = "x-odin-sender";

/// The identity on whose behalf the request is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(pub OdinId);

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = HttpAppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(SENDER_HEADER)
            .ok_or_else(|| AppError::Unauthorized("Missing caller identity".to_string()))?;

        let value = value
            .to_str()
            .map_err(|_| AppError::Unauthorized("Caller identity is not valid text".to_string()))?;

        let odin_id = value
            .parse::<OdinId>()
            .map_err(|e| AppError::Unauthorized(format!("Invalid caller identity: {}", e)))?;

        Ok(CallerIdentity(odin_id))
    }
}
