use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::config::Settings;
use crate::core::time::now_rfc3339;
use crate::schemas::sheet::UploadedSheet;
use crate::services::files::{self, remove_if_exists, sanitized_filename, ClearReport};
use crate::services::thumbnails::{write_thumbnail, ThumbnailError};

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("{0}")]
    Validation(String),
    #[error("sheet {0} not found")]
    NotFound(String),
    #[error("{context} ({}): {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn io(context: &'static str, path: &Path, source: io::Error) -> Self {
        StoreError::Io { context, path: path.to_path_buf(), source }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct UploadPolicy {
    pub(crate) allowed_extensions: Vec<String>,
    pub(crate) max_bytes: u64,
    pub(crate) thumbnail_max_dimension: u32,
}

/// Uploaded sheets in upload order. The order is what the pipeline stages
/// and correlates against, so it only ever changes by append or removal.
pub(crate) struct UploadStore {
    dir: PathBuf,
    policy: UploadPolicy,
    sheets: RwLock<Vec<UploadedSheet>>,
}

impl UploadStore {
    pub(crate) fn new(dir: PathBuf, policy: UploadPolicy) -> Self {
        Self { dir, policy, sheets: RwLock::new(Vec::new()) }
    }

    pub(crate) fn from_settings(settings: &Settings) -> Self {
        let uploads = settings.uploads();
        Self::new(
            settings.paths().upload_dir.clone(),
            UploadPolicy {
                allowed_extensions: uploads.allowed_image_extensions.clone(),
                max_bytes: uploads.max_upload_bytes(),
                thumbnail_max_dimension: uploads.thumbnail_max_dimension,
            },
        )
    }

    pub(crate) fn max_bytes(&self) -> u64 {
        self.policy.max_bytes
    }

    /// Checks extension, MIME type and size. Returns the normalized extension.
    pub(crate) fn validate(
        &self,
        original_name: &str,
        content_type: &str,
        size: u64,
    ) -> Result<String, StoreError> {
        let extension = Path::new(original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .ok_or_else(|| StoreError::Validation("File must have an extension".to_string()))?;

        if !self.policy.allowed_extensions.iter().any(|allowed| allowed == &extension) {
            return Err(StoreError::Validation(format!(
                "File type '.{extension}' is not allowed (allowed: {})",
                self.policy.allowed_extensions.join(", ")
            )));
        }

        let mime = content_type.trim().to_ascii_lowercase();
        if !mime_allowed_for_extension(&mime, &extension) {
            return Err(StoreError::Validation(format!(
                "MIME type '{mime}' does not match extension '.{extension}'"
            )));
        }

        if size == 0 {
            return Err(StoreError::Validation("File is empty".to_string()));
        }

        if size > self.policy.max_bytes {
            return Err(StoreError::Validation(format!(
                "File size exceeds {}MB limit",
                self.policy.max_bytes / (1024 * 1024)
            )));
        }

        Ok(extension)
    }

    pub(crate) async fn add_image(
        &self,
        original_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedSheet, StoreError> {
        self.validate(original_name, content_type, bytes.len() as u64)?;

        let id = Uuid::new_v4().to_string();
        let filename = format!("{id}_{}", sanitized_filename(original_name));
        let thumbnail_name = format!("thumb_{}.jpg", files::file_stem(&filename));
        let path = self.dir.join(&filename);
        let thumbnail_path = self.dir.join(&thumbnail_name);
        let size = bytes.len() as u64;

        // Held until the record is appended, so `clear` never sees the files
        // without the record or the record without the files.
        let mut sheets = self.sheets.write().await;
        files::write_atomic(&path, &bytes)
            .await
            .map_err(|err| StoreError::io("Failed to store upload", &path, err))?;

        if let Err(err) =
            write_thumbnail(bytes, &thumbnail_path, self.policy.thumbnail_max_dimension).await
        {
            discard(&path).await;
            return Err(match err {
                ThumbnailError::Decode(_) => StoreError::Validation(format!(
                    "File '{original_name}' is not a readable image"
                )),
                ThumbnailError::Io(source) => {
                    StoreError::io("Failed to write thumbnail", &thumbnail_path, source)
                }
                other => StoreError::io(
                    "Failed to render thumbnail",
                    &thumbnail_path,
                    io::Error::new(io::ErrorKind::Other, other.to_string()),
                ),
            });
        }

        let sheet = UploadedSheet {
            id,
            url: format!("/uploads/{filename}"),
            thumbnail_url: format!("/uploads/{thumbnail_name}"),
            filename,
            original_name: original_name.to_string(),
            path,
            thumbnail_path,
            size,
            mime_type: content_type.trim().to_ascii_lowercase(),
            uploaded_at: now_rfc3339(),
        };

        sheets.push(sheet.clone());
        drop(sheets);
        tracing::info!(
            sheet_id = %sheet.id,
            filename = %sheet.filename,
            size = sheet.size,
            "Sheet uploaded"
        );

        Ok(sheet)
    }

    /// Snapshot of every sheet, in upload order.
    pub(crate) async fn list(&self) -> Vec<UploadedSheet> {
        self.sheets.read().await.clone()
    }

    pub(crate) async fn len(&self) -> usize {
        self.sheets.read().await.len()
    }

    pub(crate) async fn remove(&self, id: &str) -> Result<UploadedSheet, StoreError> {
        let mut sheets = self.sheets.write().await;
        let index = sheets
            .iter()
            .position(|sheet| sheet.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let sheet = &sheets[index];
        for path in [&sheet.path, &sheet.thumbnail_path] {
            remove_if_exists(path)
                .await
                .map_err(|err| StoreError::io("Failed to delete sheet file", path, err))?;
        }

        let removed = sheets.remove(index);
        tracing::info!(sheet_id = %removed.id, filename = %removed.filename, "Sheet removed");
        Ok(removed)
    }

    /// Deletes every file of every sheet, then anything else left in the
    /// upload directory, and empties the store. File errors are logged and
    /// counted; the records are dropped regardless.
    pub(crate) async fn clear(&self) -> ClearReport {
        let mut sheets = self.sheets.write().await;
        let mut report = ClearReport::default();

        for sheet in sheets.iter() {
            for path in [&sheet.path, &sheet.thumbnail_path] {
                match remove_if_exists(path).await {
                    Ok(true) => report.removed += 1,
                    Ok(false) => {}
                    Err(err) => {
                        tracing::warn!(error = %err, path = %path.display(), "Failed to delete sheet file");
                        report.failed += 1;
                    }
                }
            }
        }

        report = report.merge(files::remove_files_in(&self.dir).await);
        sheets.clear();
        report
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }
}

async fn discard(path: &Path) {
    if let Err(err) = remove_if_exists(path).await {
        tracing::warn!(error = %err, path = %path.display(), "Failed to discard rejected upload");
    }
}

fn mime_allowed_for_extension(mime: &str, extension: &str) -> bool {
    match extension {
        "jpg" | "jpeg" => matches!(mime, "image/jpeg" | "image/jpg"),
        "png" => mime == "image/png",
        _ => false,
    }
}

#[cfg(test)]
pub(crate) fn test_store(dir: &Path) -> UploadStore {
    UploadStore::new(
        dir.to_path_buf(),
        UploadPolicy {
            allowed_extensions: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
            max_bytes: 10 * 1024 * 1024,
            thumbnail_max_dimension: 200,
        },
    )
}
