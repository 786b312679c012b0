use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use audio_blob_store::StorageError;
use retry_policy::{Classify, FailureClass};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::whisper::WhisperError;

#[derive(Debug, Error)]
pub enum TranscribeErr {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Transcription service rejected the request: {0}")]
    Upstream(WhisperError),

    #[error("Transcription service unavailable: {0}")]
    UpstreamUnavailable(WhisperError),

    #[error("Transcription {0} not found")]
    NotFound(Uuid),

    #[error("Bad upload: {0}")]
    BadUpload(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Upload exceeds {0} bytes")]
    TooLarge(usize),

    #[error("Background task failed")]
    Blocking(#[from] BlockingError),
}

impl TranscribeErr {
    /// Retryable failures that survived every attempt surface as 503 so the
    /// client may try again later.
    pub fn from_remote(err: WhisperError) -> Self {
        match err.failure_class() {
            FailureClass::Transient => TranscribeErr::UpstreamUnavailable(err),
            _ => TranscribeErr::Upstream(err),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            TranscribeErr::Storage(StorageError::InvalidPath(_)) => "invalid_path",
            TranscribeErr::Storage(StorageError::PermissionDenied { .. }) => "permission_denied",
            TranscribeErr::Storage(StorageError::DiskFull { .. }) => "disk_full",
            TranscribeErr::Storage(StorageError::StorageFailure { .. }) => "storage_failure",
            TranscribeErr::Upstream(_) => "upstream_rejected",
            TranscribeErr::UpstreamUnavailable(_) => "upstream_unavailable",
            TranscribeErr::NotFound(_) => "not_found",
            TranscribeErr::BadUpload(_) => "bad_upload",
            TranscribeErr::InvalidQuery(_) => "invalid_query",
            TranscribeErr::TooLarge(_) => "payload_too_large",
            TranscribeErr::Blocking(_) => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl ResponseError for TranscribeErr {
    fn status_code(&self) -> StatusCode {
        match self {
            TranscribeErr::Storage(StorageError::InvalidPath(_)) => StatusCode::BAD_REQUEST,
            TranscribeErr::Storage(StorageError::PermissionDenied { .. }) => StatusCode::FORBIDDEN,
            TranscribeErr::Storage(StorageError::DiskFull { .. }) => StatusCode::INSUFFICIENT_STORAGE,
            TranscribeErr::Storage(StorageError::StorageFailure { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            TranscribeErr::Upstream(_) => StatusCode::BAD_GATEWAY,
            TranscribeErr::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            TranscribeErr::NotFound(_) => StatusCode::NOT_FOUND,
            TranscribeErr::BadUpload(_) | TranscribeErr::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            TranscribeErr::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            TranscribeErr::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}: {}", self.kind(), self);
        }
        HttpResponse::build(status).json(ErrorBody { error: self.kind(), message: self.to_string() })
    }
}
