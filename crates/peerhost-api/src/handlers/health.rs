//! Health check handler.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use std::time::Duration;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Reports inbox reachability and backlog.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let in_flight_transfers = state.perimeter.tracker().len().await;

    match tokio::time::timeout(CHECK_TIMEOUT, state.inbox.status(None)).await {
        Ok(Ok(inbox)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "healthy",
                "inbox": inbox,
                "inFlightTransfers": in_flight_transfers,
            })),
        ),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Inbox health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "unhealthy",
                    "inbox": format!("error: {}", e),
                })),
            )
        }
        Err(_) => {
            tracing::error!("Inbox health check timed out");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "unhealthy", "inbox": "timeout" })),
            )
        }
    }
}
