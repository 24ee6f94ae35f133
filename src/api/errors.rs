use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::answer_keys::AnswerKeyError;
use crate::services::export::ExportError;
use crate::services::pipeline::PipelineError;
use crate::services::upload_store::StoreError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };

        (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(message) => ApiError::BadRequest(message),
            StoreError::NotFound(_) => ApiError::NotFound("Image not found".to_string()),
            err @ StoreError::Io { .. } => ApiError::internal(err, "Failed to store image"),
        }
    }
}

impl From<AnswerKeyError> for ApiError {
    fn from(err: AnswerKeyError) -> Self {
        match err {
            AnswerKeyError::Validation(message) => ApiError::BadRequest(message),
            err => ApiError::internal(err, "Failed to store answer key"),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(message) => ApiError::BadRequest(message),
            PipelineError::Busy => {
                ApiError::Conflict("A grading run is already in progress".to_string())
            }
            err => ApiError::internal(err, "Grading run failed"),
        }
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Validation(message) => ApiError::BadRequest(message),
            err => ApiError::internal(err, "Failed to export results"),
        }
    }
}
