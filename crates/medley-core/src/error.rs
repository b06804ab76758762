//! Error types module
//!
//! All errors are unified under the `AppError` enum: upload validation,
//! session lookup, worker-side transcode failures and infrastructure errors.
//! `ErrorMetadata` lets the HTTP layer render each variant with a stable
//! status code and machine-readable code without matching on variants itself.

use std::io;

use sqlx::Error as SqlxError;
use uuid::Uuid;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// How an error should be presented at the HTTP boundary.
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "SESSION_NOT_FOUND")
    fn error_code(&self) -> &'static str;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Upload session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Upload incomplete: {0}")]
    IncompleteUpload(String),

    #[error("Media file metadata not found: {0}")]
    MetadataNotFound(Uuid),

    #[error("No chunks staged for upload {0}")]
    IncompleteArtifact(Uuid),

    #[error("Transcode failed: {0}")]
    Transcode(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON serialization error: {}", err))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Static metadata per variant: (http_status, error_code, log_level).
fn static_metadata(err: &AppError) -> (u16, &'static str, LogLevel) {
    match err {
        AppError::Validation(_) => (400, "VALIDATION_ERROR", LogLevel::Debug),
        AppError::SessionNotFound(_) => (404, "SESSION_NOT_FOUND", LogLevel::Debug),
        AppError::Forbidden(_) => (403, "FORBIDDEN", LogLevel::Warn),
        AppError::IncompleteUpload(_) => (409, "INCOMPLETE_UPLOAD", LogLevel::Debug),
        AppError::MetadataNotFound(_) => (404, "METADATA_NOT_FOUND", LogLevel::Warn),
        AppError::IncompleteArtifact(_) => (500, "INCOMPLETE_ARTIFACT", LogLevel::Error),
        AppError::Transcode(_) => (500, "TRANSCODE_FAILURE", LogLevel::Error),
        AppError::Io(_) => (500, "IO_FAILURE", LogLevel::Error),
        AppError::Database(_) => (500, "DATABASE_ERROR", LogLevel::Error),
        AppError::Unauthorized(_) => (401, "UNAUTHORIZED", LogLevel::Debug),
        AppError::Internal(_) => (500, "INTERNAL_ERROR", LogLevel::Error),
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        static_metadata(self).1
    }

    fn log_level(&self) -> LogLevel {
        static_metadata(self).2
    }

    fn client_message(&self) -> String {
        match self {
            // Infrastructure details stay server-side.
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::Io(_) => "Storage operation failed".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}
