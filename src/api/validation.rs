use crate::api::errors::ApiError;
use std::path::Path;

pub(crate) const ANSWER_KEY_EXTENSIONS: &[&str] = &["xlsx", "xls"];

pub(crate) fn validate_answer_key_upload(filename: &str) -> Result<(), ApiError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| ApiError::BadRequest("File must have an extension".to_string()))?;

    if ANSWER_KEY_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(ApiError::BadRequest("Only Excel files (.xlsx, .xls) are allowed".to_string()))
    }
}

pub(crate) fn validate_batch_size(count: usize, max: usize) -> Result<(), ApiError> {
    if count == 0 {
        return Err(ApiError::BadRequest("No files uploaded".to_string()));
    }
    if count > max {
        return Err(ApiError::BadRequest(format!("Too many files (maximum {max} per upload)")));
    }
    Ok(())
}
