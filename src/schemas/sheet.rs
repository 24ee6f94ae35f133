use std::path::PathBuf;

use serde::Serialize;

/// One uploaded answer-sheet image and its thumbnail.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct UploadedSheet {
    pub(crate) id: String,
    /// Name on disk, unique per sheet.
    pub(crate) filename: String,
    pub(crate) original_name: String,
    pub(crate) path: PathBuf,
    pub(crate) thumbnail_path: PathBuf,
    pub(crate) url: String,
    pub(crate) thumbnail_url: String,
    pub(crate) size: u64,
    pub(crate) mime_type: String,
    pub(crate) uploaded_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct RejectedUpload {
    pub(crate) filename: String,
    pub(crate) error: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadImagesResponse {
    pub(crate) success: bool,
    pub(crate) message: String,
    pub(crate) images: Vec<UploadedSheet>,
    pub(crate) rejected: Vec<RejectedUpload>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadedImagesResponse {
    pub(crate) images: Vec<UploadedSheet>,
}
