use std::fmt::Display;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Every failure the HTTP surface reports. Messages are safe to show to
/// clients; details stay in the server log.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No image file provided")]
    MissingImage,
    #[error("Invalid file type. Please upload an image.")]
    InvalidFileType,
    #[error("File too large. Maximum size is 10MB.")]
    FileTooLarge,
    #[error("Empty file")]
    EmptyFile,
    #[error("Invalid upload request")]
    MalformedUpload,
    #[error("Invalid reference image path")]
    InvalidReferencePath,
    #[error("Reference image not found")]
    ReferenceNotFound,
    #[error("Failed to connect to HeadSwapper service")]
    HeadSwapUnavailable,
    #[error("Invalid response from HeadSwapper service")]
    HeadSwapInvalidResponse,
    #[error("Failed to process HeadSwapper response")]
    HeadSwapFailed,
    #[error("Internal server error. Please try again.")]
    Internal,
}

impl ApiError {
    /// Logs the underlying cause and returns the generic 500.
    pub fn internal(context: &str, err: impl Display) -> Self {
        tracing::error!(context, error = %err, "request failed");
        ApiError::Internal
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingImage
            | ApiError::InvalidFileType
            | ApiError::FileTooLarge
            | ApiError::EmptyFile
            | ApiError::MalformedUpload
            | ApiError::InvalidReferencePath => StatusCode::BAD_REQUEST,
            ApiError::ReferenceNotFound => StatusCode::NOT_FOUND,
            ApiError::HeadSwapUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::HeadSwapInvalidResponse | ApiError::HeadSwapFailed | ApiError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.to_string(),
        });
        (self.status(), axum::Json(body)).into_response()
    }
}
