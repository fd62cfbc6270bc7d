//! Peerhost API Library
//!
//! HTTP handlers, extractors and application setup for the transit perimeter.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod setup;
pub mod state;
pub mod telemetry;

pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
