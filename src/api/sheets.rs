use axum::{
    extract::{Multipart, Path, State},
    routing::{delete, get, post},
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::multipart::{self, FilePart, ReadOutcome};
use crate::api::validation::validate_batch_size;
use crate::core::metrics;
use crate::core::state::AppState;
use crate::schemas::sheet::{RejectedUpload, UploadImagesResponse, UploadedImagesResponse};
use crate::schemas::MessageResponse;
use crate::services::upload_store::StoreError;

const IMAGES_FIELD: &str = "images";

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/upload-images", post(upload_images))
        .route("/uploaded-images", get(list_images))
        .route("/images/:id", delete(delete_image))
}

async fn upload_images(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadImagesResponse>, ApiError> {
    let max_files = state.settings().uploads().max_images_per_upload;
    let max_bytes = state.uploads().max_bytes();

    let mut received = 0usize;
    let mut files: Vec<FilePart> = Vec::new();
    let mut rejected: Vec<RejectedUpload> = Vec::new();

    while let Some(mut field) = multipart::next_field(&mut multipart).await? {
        if field.name() != Some(IMAGES_FIELD) {
            continue;
        }
        received += 1;
        validate_batch_size(received, max_files)?;

        let (filename, content_type) = multipart::file_meta(&field, "image");
        match multipart::read_limited(&mut field, max_bytes).await? {
            ReadOutcome::Complete(bytes) => files.push(FilePart { filename, content_type, bytes }),
            ReadOutcome::TooLarge => rejected
                .push(RejectedUpload { filename, error: multipart::size_limit_message(max_bytes) }),
        }
    }
    validate_batch_size(received, max_files)?;

    let mut images = Vec::with_capacity(files.len());
    for file in files {
        match state.uploads().add_image(&file.filename, &file.content_type, file.bytes).await {
            Ok(sheet) => images.push(sheet),
            Err(StoreError::Validation(error)) => {
                rejected.push(RejectedUpload { filename: file.filename, error });
            }
            Err(err) => return Err(err.into()),
        }
    }

    metrics::record_upload(images.len(), rejected.len());
    if images.is_empty() {
        let reasons = rejected
            .iter()
            .map(|rejection| format!("{}: {}", rejection.filename, rejection.error))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ApiError::BadRequest(format!("No valid images uploaded ({reasons})")));
    }

    if !rejected.is_empty() {
        tracing::info!(
            accepted = images.len(),
            rejected = rejected.len(),
            "Upload batch partially rejected"
        );
    }

    Ok(Json(UploadImagesResponse {
        success: true,
        message: format!("{} images uploaded successfully", images.len()),
        images,
        rejected,
    }))
}

async fn list_images(State(state): State<AppState>) -> Json<UploadedImagesResponse> {
    Json(UploadedImagesResponse { images: state.uploads().list().await })
}

async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.uploads().remove(&id).await?;
    Ok(Json(MessageResponse { success: true, message: "Image deleted successfully".to_string() }))
}
