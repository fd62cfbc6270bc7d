//! Error types module
//!
//! All host errors are unified under the `AppError` enum: transit protocol failures,
//! reconciliation conflicts raised while writing received files, storage and inbox
//! failures, and the defensive "unhandled scenario" branch.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx` feature.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like protocol violations by a remote peer
    Debug,
    /// Warning level - for conflicts worth an operator's attention
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "DRIVE_SECURITY_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid instruction set: {0}")]
    InvalidInstructionSet(String),

    #[error("Transit protocol error: {0}")]
    Protocol(String),

    #[error("Transfer not found: {0}")]
    TransferNotFound(String),

    #[error("Transfer rejected: {0}")]
    TransferRejected(String),

    #[error("Drive security error: {0}")]
    DriveSecurity(String),

    #[error("Remote identity error: {0}")]
    RemoteIdentity(String),

    #[error("Invalid file: {0}")]
    InvalidFile(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("File write error: {0}")]
    FileWrite(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Unhandled scenario: {0}")]
    UnhandledScenario(String),
}

impl AppError {
    /// Client errors are caused by what a remote peer sent; retrying the same
    /// input cannot succeed.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status_code())
    }
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Storage(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("UUID parsing error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::Database(_) => (
            500,
            "DATABASE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InvalidInstructionSet(_) => (
            400,
            "INVALID_INSTRUCTION_SET",
            false,
            Some("Refresh the recipient's public key and send a new transfer"),
            false,
            LogLevel::Debug,
        ),
        AppError::Protocol(_) => (
            400,
            "TRANSIT_PROTOCOL_ERROR",
            false,
            Some("Send parts in order: transferkeyheader, metadata, payload"),
            false,
            LogLevel::Debug,
        ),
        AppError::TransferNotFound(_) => (
            404,
            "TRANSFER_NOT_FOUND",
            false,
            Some("Start a new transfer"),
            false,
            LogLevel::Debug,
        ),
        AppError::TransferRejected(_) => (
            400,
            "TRANSFER_REJECTED",
            false,
            Some("Start a new transfer"),
            false,
            LogLevel::Debug,
        ),
        AppError::DriveSecurity(_) => (
            403,
            "DRIVE_SECURITY_ERROR",
            false,
            None,
            false,
            LogLevel::Warn,
        ),
        AppError::RemoteIdentity(_) => (
            403,
            "REMOTE_IDENTITY_ERROR",
            false,
            None,
            false,
            LogLevel::Warn,
        ),
        AppError::InvalidFile(_) => (
            400,
            "INVALID_FILE",
            false,
            Some("Verify the target file is still active"),
            false,
            LogLevel::Debug,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the resource ID exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::FileWrite(_) => (
            500,
            "FILE_WRITE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::Storage(_) => (
            500,
            "STORAGE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::Unauthorized(_) => (
            401,
            "UNAUTHORIZED",
            false,
            Some("Authenticate the calling identity"),
            false,
            LogLevel::Debug,
        ),
        AppError::Internal(_) => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::UnhandledScenario(_) => (
            500,
            "UNHANDLED_SCENARIO",
            false,
            Some("Contact the host operator"),
            true,
            LogLevel::Error,
        ),
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::InvalidInstructionSet(ref msg) => msg.clone(),
            AppError::Protocol(ref msg) => msg.clone(),
            AppError::TransferNotFound(ref msg) => msg.clone(),
            AppError::TransferRejected(ref msg) => msg.clone(),
            AppError::DriveSecurity(ref msg) => msg.clone(),
            AppError::RemoteIdentity(ref msg) => msg.clone(),
            AppError::InvalidFile(ref msg) => msg.clone(),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::FileWrite(_) => "Failed to write file".to_string(),
            AppError::Storage(_) => "Failed to access storage".to_string(),
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::Unauthorized(ref msg) => msg.clone(),
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::InternalWithSource { .. } => "Internal server error".to_string(),
            AppError::UnhandledScenario(_) => "Internal server error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_metadata_database() {
        #[cfg(feature = "sqlx")]
        let err = AppError::from(sqlx::Error::PoolClosed);
        #[cfg(not(feature = "sqlx"))]
        let err = AppError::Database("pool closed".to_string());

        assert_eq!(err.http_status_code(), 500);
        assert_eq!(err.error_code(), "DATABASE_ERROR");
        assert!(err.is_recoverable());
        assert_eq!(err.client_message(), "Failed to access database");
        assert!(err.is_sensitive());
        assert_eq!(err.log_level(), LogLevel::Error);
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_error_metadata_drive_security() {
        let err = AppError::DriveSecurity(
            "UniqueId and GlobalTransitId are not the same file".to_string(),
        );

        assert_eq!(err.http_status_code(), 403);
        assert_eq!(err.error_code(), "DRIVE_SECURITY_ERROR");
        assert!(!err.is_recoverable());
        assert!(err.client_message().contains("not the same file"));
        assert!(!err.is_sensitive());
        assert_eq!(err.log_level(), LogLevel::Warn);
        assert!(err.is_client_error());
    }

    #[test]
    fn test_error_metadata_protocol() {
        let err = AppError::Protocol("payload must be the last part".to_string());

        assert_eq!(err.http_status_code(), 400);
        assert_eq!(err.error_code(), "TRANSIT_PROTOCOL_ERROR");
        assert!(err.is_client_error());
        assert_eq!(err.log_level(), LogLevel::Debug);
    }

    #[test]
    fn test_unhandled_scenario_is_fatal() {
        let err = AppError::UnhandledScenario("finalize".to_string());

        assert_eq!(err.http_status_code(), 500);
        assert!(!err.is_recoverable());
        assert!(err.is_sensitive());
        assert_eq!(err.client_message(), "Internal server error");
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn test_conversions() {
        let io_err = io::Error::new(io::ErrorKind::Other, "disk gone");
        assert!(matches!(AppError::from(io_err), AppError::Storage(_)));

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(AppError::from(json_err), AppError::InvalidInput(_)));

        let any = anyhow::anyhow!("boom");
        assert!(matches!(
            AppError::from(any),
            AppError::InternalWithSource { .. }
        ));
    }
}
