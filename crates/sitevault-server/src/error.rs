use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sitevault_core::{envelope::EnvelopeError, storage::StoreError};
use sitevault_site::SealedStoreError;
use thiserror::Error;
use tracing::error;

/// Handler error rendered as `{"error": "<message>"}` with a status code.
#[derive(Debug, Error)]
#[error("{status}: {message}")]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<EnvelopeError> for ApiError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            // Never say whether the passcode or the data was wrong.
            EnvelopeError::Authentication => ApiError::bad_request("Decryption failed"),
            EnvelopeError::Malformed { .. } => {
                ApiError::bad_request(format!("Decryption failed: {err}"))
            }
            EnvelopeError::Serialization { .. } => ApiError::bad_request(err.to_string()),
            EnvelopeError::Configuration { .. } => {
                error!(error = %err, "codec misconfigured");
                ApiError::internal("server misconfigured")
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { key } => {
                ApiError::not_found(format!("Data with ID '{key}' not found"))
            }
            StoreError::InvalidKey { .. } => ApiError::bad_request(err.to_string()),
            StoreError::Storage { .. } => {
                error!(error = %err, "storage backend failure");
                ApiError::internal("storage failure")
            }
        }
    }
}

impl From<SealedStoreError> for ApiError {
    fn from(err: SealedStoreError) -> Self {
        match err {
            SealedStoreError::Envelope(err) => err.into(),
            SealedStoreError::Store(err) => err.into(),
            SealedStoreError::Task(reason) => {
                error!(%reason, "codec task failed");
                ApiError::internal("internal error")
            }
        }
    }
}
