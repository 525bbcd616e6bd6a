//! Error kinds surfaced by the upload protocol
//!
//! Every variant maps to exactly one HTTP status. Storage failures are logged with
//! their full detail but rendered to clients only by their classification.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

/// Errors produced by the storage layers and the protocol engine
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("upload session not found")]
    FileNotFound,

    #[error("declared size {size} exceeds limit {max}")]
    SizeExceeded { size: u64, max: u64 },

    #[error("chunk of {size} bytes exceeds limit {max}")]
    PayloadTooLarge { size: u64, max: u64 },

    #[error("mime type not allowed: {0}")]
    MimeNotAllowed(String),

    #[error("file error: {0}")]
    FileError(#[from] std::io::Error),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl UploadError {
    /// Short client-facing message; never carries I/O detail
    pub fn public_message(&self) -> &'static str {
        match self {
            UploadError::Unauthenticated => "Unauthorized",
            UploadError::InvalidRequest(_) => "Bad Request",
            UploadError::FileNotFound => "Not Found",
            UploadError::SizeExceeded { .. } | UploadError::PayloadTooLarge { .. } => {
                "Payload Too Large"
            }
            UploadError::MimeNotAllowed(_) => "Unsupported Media Type",
            UploadError::FileError(_) | UploadError::InternalError(_) => "Internal Server Error",
        }
    }
}

impl From<rusqlite::Error> for UploadError {
    fn from(e: rusqlite::Error) -> Self {
        UploadError::InternalError(format!("metadata store: {}", e))
    }
}

impl From<serde_json::Error> for UploadError {
    fn from(e: serde_json::Error) -> Self {
        UploadError::InternalError(format!("metadata record: {}", e))
    }
}

impl From<tokio::task::JoinError> for UploadError {
    fn from(e: tokio::task::JoinError) -> Self {
        UploadError::InternalError(format!("blocking task failed: {}", e))
    }
}

impl ResponseError for UploadError {
    fn status_code(&self) -> StatusCode {
        match self {
            UploadError::Unauthenticated => StatusCode::UNAUTHORIZED,
            UploadError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            UploadError::FileNotFound => StatusCode::NOT_FOUND,
            UploadError::SizeExceeded { .. } | UploadError::PayloadTooLarge { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            UploadError::MimeNotAllowed(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            UploadError::FileError(_) | UploadError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type("text/plain")
            .body(self.public_message())
    }
}
