//! Route configuration and setup.

use crate::handlers::{health, transit};
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use peerhost_core::Config;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Prefix of the peer-facing transit routes.
pub const TRANSIT_PREFIX: &str = "/api/v1/perimeter/transit";

/// Room for multipart boundaries and section headers on top of the part limits.
const BODY_LIMIT_HEADROOM: u64 = 64 * 1024;

pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Router {
    let transit_config = config.transit();
    let body_limit = transit_config
        .max_key_header_bytes
        .saturating_add(transit_config.max_metadata_bytes)
        .saturating_add(transit_config.max_payload_bytes)
        .saturating_add(BODY_LIMIT_HEADROOM);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    // Expiry drops the handler future, which aborts the transfer.
    let request_timeout = Duration::from_secs(config.request_timeout_secs());

    let transit_routes = Router::new()
        .route("/upload", post(transit::upload))
        .route("/deletelinkedfile", post(transit::delete_linked_file))
        .route("/markfileasread", post(transit::mark_file_as_read));

    Router::new()
        .route("/health", get(health::health))
        .nest(TRANSIT_PREFIX, transit_routes)
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}
