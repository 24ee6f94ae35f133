use axum::{
    extract::{Multipart, State},
    routing::{get, post},
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::multipart::{self, ReadOutcome};
use crate::api::validation::validate_answer_key_upload;
use crate::core::state::AppState;
use crate::schemas::answer_key::{AnswerKeyUploadResponse, AnswerKeysResponse};

const PREVIEW_ANSWERS: usize = 5;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/upload-answer-key", post(upload_answer_key))
        .route("/answer-keys", get(list_answer_keys))
}

async fn upload_answer_key(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnswerKeyUploadResponse>, ApiError> {
    let max_bytes = state.uploads().max_bytes();
    let mut workbook: Option<(String, Vec<u8>)> = None;
    let mut exam_code: Option<String> = None;

    while let Some(mut field) = multipart::next_field(&mut multipart).await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "answerKey" | "answer_key" => {
                let (filename, _) = multipart::file_meta(&field, "");
                validate_answer_key_upload(&filename)?;
                match multipart::read_limited(&mut field, max_bytes).await? {
                    ReadOutcome::Complete(bytes) => workbook = Some((filename, bytes)),
                    ReadOutcome::TooLarge => {
                        return Err(ApiError::BadRequest(multipart::size_limit_message(max_bytes)))
                    }
                }
            }
            "examCode" | "exam_code" => {
                let text = field
                    .text()
                    .await
                    .map_err(|_| ApiError::BadRequest("Invalid exam code".to_string()))?;
                exam_code = Some(text);
            }
            _ => {}
        }
    }

    let (filename, bytes) = workbook
        .ok_or_else(|| ApiError::BadRequest("No answer key file uploaded".to_string()))?;
    let key = state.answer_keys().ingest(bytes, exam_code.as_deref()).await?;
    tracing::debug!(filename = %filename, exam_code = %key.exam_code, "Answer key upload handled");

    Ok(Json(AnswerKeyUploadResponse {
        success: true,
        message: "Answer key uploaded successfully".to_string(),
        exam_code: key.exam_code,
        total_questions: key.total_questions,
        answers: key.answers.into_iter().take(PREVIEW_ANSWERS).collect(),
    }))
}

async fn list_answer_keys(State(state): State<AppState>) -> Json<AnswerKeysResponse> {
    Json(AnswerKeysResponse { answer_keys: state.answer_keys().list().await })
}
