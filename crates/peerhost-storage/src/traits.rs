//! Drive file system abstraction
//!
//! This module defines the DriveFileSystem trait that every drive backend must implement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use peerhost_core::models::{
    FileMetadata, InternalDriveFileId, KeyHeader, OdinId, ServerFileHeader, ServerMetadata,
    TargetDrive,
};
use peerhost_core::AppError;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

/// Boxed reader used for temp part streams.
pub type PartReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Drive not found: {0}")]
    DriveNotFound(String),

    #[error("Invalid extension: {0}")]
    InvalidExtension(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Version tag mismatch for {file}: expected {expected:?}, found {found:?}")]
    VersionTagMismatch {
        file: InternalDriveFileId,
        expected: Option<Uuid>,
        found: Option<Uuid>,
    },

    #[error("Corrupt header: {0}")]
    CorruptHeader(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => AppError::NotFound(msg),
            StorageError::DriveNotFound(msg) => AppError::NotFound(format!("Drive {}", msg)),
            StorageError::InvalidExtension(msg) => AppError::InvalidInput(msg),
            StorageError::DuplicateKey(msg) => AppError::DriveSecurity(msg),
            err @ StorageError::VersionTagMismatch { .. } => AppError::FileWrite(err.to_string()),
            StorageError::WriteFailed(msg) => AppError::FileWrite(msg),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// Drive file system
///
/// Temp storage holds the parts of in-flight transfers; long-term storage holds
/// committed files and their headers. Lookups by client unique id and global
/// transit id return soft-deleted files too, so callers can tell "deleted" from
/// "never existed".
#[async_trait]
pub trait DriveFileSystem: Send + Sync {
    /// Resolve a target drive to the local drive id.
    async fn get_drive_id(&self, target_drive: &TargetDrive) -> StorageResult<Option<Uuid>>;

    /// Create the drive if missing and return its id.
    async fn create_drive(&self, target_drive: TargetDrive) -> StorageResult<Uuid>;

    /// Write a temp part, consuming the reader until EOF. Returns bytes written.
    async fn write_temp_stream(
        &self,
        file: &InternalDriveFileId,
        extension: &str,
        reader: PartReader,
    ) -> StorageResult<u64>;

    /// Open a temp part for reading.
    async fn get_temp_stream(
        &self,
        file: &InternalDriveFileId,
        extension: &str,
    ) -> StorageResult<PartReader>;

    /// Remove every temp part of `file`. Missing parts are not an error.
    async fn delete_temp_files(&self, file: &InternalDriveFileId) -> StorageResult<()>;

    /// Whether any temp part of `file` exists.
    async fn temp_file_exists(&self, file: &InternalDriveFileId) -> StorageResult<bool>;

    /// Promote the temp part `payload_extension` of `file` to a new long-term file with the same id.
    async fn commit_new_file(
        &self,
        file: &InternalDriveFileId,
        key_header: KeyHeader,
        metadata: FileMetadata,
        server_metadata: ServerMetadata,
        payload_extension: &str,
    ) -> StorageResult<ServerFileHeader>;

    /// Replace an existing long-term file with the temp part of `temp_file`.
    ///
    /// `metadata.version_tag` must equal the stored version tag; the committed
    /// header carries a fresh one.
    async fn overwrite_file(
        &self,
        temp_file: &InternalDriveFileId,
        target_file: &InternalDriveFileId,
        key_header: KeyHeader,
        metadata: FileMetadata,
        server_metadata: ServerMetadata,
        payload_extension: &str,
    ) -> StorageResult<ServerFileHeader>;

    /// Mark a long-term file deleted and drop its payload.
    async fn soft_delete_long_term_file(&self, file: &InternalDriveFileId) -> StorageResult<()>;

    /// Record that `reader` has read a long-term file. Only the first receipt
    /// per reader is kept. The version tag does not change.
    async fn record_read_receipt(
        &self,
        file: &InternalDriveFileId,
        reader: &OdinId,
        read_at: DateTime<Utc>,
    ) -> StorageResult<ServerFileHeader>;

    async fn get_file_by_client_unique_id(
        &self,
        drive_id: Uuid,
        unique_id: Uuid,
    ) -> StorageResult<Option<ServerFileHeader>>;

    async fn get_file_by_global_transit_id(
        &self,
        drive_id: Uuid,
        global_transit_id: Uuid,
    ) -> StorageResult<Option<ServerFileHeader>>;

    async fn file_exists(&self, file: &InternalDriveFileId) -> StorageResult<bool>;

    async fn get_server_file_header(
        &self,
        file: &InternalDriveFileId,
    ) -> StorageResult<Option<ServerFileHeader>>;

    /// Read a committed payload into memory.
    async fn get_payload(&self, file: &InternalDriveFileId) -> StorageResult<Vec<u8>>;

    /// Read a whole temp part into memory.
    async fn read_temp_bytes(
        &self,
        file: &InternalDriveFileId,
        extension: &str,
    ) -> StorageResult<Vec<u8>> {
        let mut reader = self.get_temp_stream(file, extension).await?;
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .await
            .map_err(|e| StorageError::ReadFailed(format!("{}.{}: {}", file, extension, e)))?;
        Ok(buf)
    }
}
