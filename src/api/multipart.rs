use axum::extract::multipart::{Field, Multipart};

use crate::api::errors::ApiError;

/// A file part read into memory.
pub(crate) struct FilePart {
    pub(crate) filename: String,
    pub(crate) content_type: String,
    pub(crate) bytes: Vec<u8>,
}

pub(crate) enum ReadOutcome {
    Complete(Vec<u8>),
    /// The part exceeded the limit; the rest of it is skipped.
    TooLarge,
}

pub(crate) async fn next_field(multipart: &mut Multipart) -> Result<Option<Field<'_>>, ApiError> {
    multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))
}

pub(crate) async fn read_limited(
    field: &mut Field<'_>,
    max_bytes: u64,
) -> Result<ReadOutcome, ApiError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?
    {
        let next_size = bytes.len() as u64 + chunk.len() as u64;
        if next_size > max_bytes {
            return Ok(ReadOutcome::TooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(ReadOutcome::Complete(bytes))
}

pub(crate) fn file_meta(field: &Field<'_>, fallback_name: &str) -> (String, String) {
    let filename = field.file_name().unwrap_or(fallback_name).to_string();
    let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
    (filename, content_type)
}

pub(crate) fn size_limit_message(max_bytes: u64) -> String {
    format!("File size exceeds {}MB limit", max_bytes / (1024 * 1024))
}
