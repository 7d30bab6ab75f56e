//! Error types for filedrop

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Who is at fault for a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed or disallowed request, unknown identifier. Not retried.
    Client,
    /// I/O failure or a broken storage invariant.
    Server,
}

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Request Errors ===
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("upload interrupted: {0}")]
    UploadInterrupted(String),

    #[error("upload too large: {0}")]
    PayloadTooLarge(String),

    #[error("invalid file id: {0}")]
    InvalidId(String),

    // === Storage Errors ===
    #[error("blob already exists: {0}")]
    BlobExists(String),

    #[error("blob missing for indexed file {0}")]
    BlobMissing(String),

    #[error("journal corrupted at line {line}: {reason}")]
    JournalCorrupted { line: u64, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // === Remote API Errors ===
    #[error("HTTP error: {0}")]
    Http(String),

    // === Config Errors ===
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::NotFound(_)
            | Error::InvalidUpload(_)
            | Error::UploadInterrupted(_)
            | Error::PayloadTooLarge(_)
            | Error::InvalidId(_) => ErrorClass::Client,
            _ => ErrorClass::Server,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.class() == ErrorClass::Client
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::InvalidUpload(_) | Error::UploadInterrupted(_) | Error::InvalidId(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.to_http_status();
        match self.class() {
            ErrorClass::Client => tracing::warn!(status = %status.as_u16(), "{}", self),
            ErrorClass::Server => tracing::error!(status = %status.as_u16(), "{}", self),
        }
        (status, axum::Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
