use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::schemas::grading::{ClearAllResponse, ExportRequest, PipelineStatus, ProcessImagesResponse};
use crate::services::export::XLSX_CONTENT_TYPE;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/process-images", post(process_images))
        .route("/process-status", get(process_status))
        .route("/export-results", post(export_results))
        .route("/clear-all", post(clear_all))
}

async fn process_images(State(state): State<AppState>) -> Result<Response, ApiError> {
    let report = state.pipeline().run(state.uploads(), state.answer_keys()).await?;

    let response = match report.engine_error {
        None => (
            StatusCode::OK,
            Json(ProcessImagesResponse {
                success: true,
                message: format!("Processed {} images", report.results.len()),
                results: report.results,
                error: None,
            }),
        ),
        Some(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ProcessImagesResponse {
                success: false,
                message: "Recognition engine failed".to_string(),
                results: report.results,
                error: Some(error),
            }),
        ),
    };

    Ok(response.into_response())
}

async fn process_status(State(state): State<AppState>) -> Json<PipelineStatus> {
    Json(state.pipeline().status())
}

async fn export_results(
    State(state): State<AppState>,
    Json(payload): Json<ExportRequest>,
) -> Result<Response, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let file = state.exports().export(&payload.results).await?;
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file.filename))
        .map_err(|e| ApiError::internal(e, "Failed to build download headers"))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(XLSX_CONTENT_TYPE)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.bytes,
    )
        .into_response())
}

async fn clear_all(State(state): State<AppState>) -> Result<Json<ClearAllResponse>, ApiError> {
    let report = state.reset_session().await?;

    Ok(Json(ClearAllResponse {
        success: true,
        message: "All data cleared successfully".to_string(),
        removed_files: report.removed,
    }))
}
