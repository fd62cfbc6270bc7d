//! Peerhost Storage Library
//!
//! This crate provides the drive file system abstraction consumed by the transit
//! pipeline and a local filesystem implementation.
//!
//! # Layout
//!
//! Every drive has its own directory keyed by drive id:
//!
//! - **Temp parts**: `drives/{drive_id}/temp/{file_id}.{extension}`
//! - **Long-term files**: `drives/{drive_id}/files/{file_id}.payload` plus
//!   `drives/{drive_id}/files/{file_id}.header.json`
//!
//! Paths are only ever built from ids and validated extensions.

pub mod local;
pub mod traits;

// Re-export commonly used types
pub use local::LocalDriveFileSystem;
pub use traits::{DriveFileSystem, PartReader, StorageError, StorageResult};
