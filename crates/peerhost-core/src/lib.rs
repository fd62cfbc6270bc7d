//! Peerhost Core Library
//!
//! This crate provides the domain models, error types and configuration shared by
//! every peerhost component: the transit perimeter, the drive storage layer, the
//! inbox worker and the HTTP surface.

pub mod config;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::OdinId;
