use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

/// Writes `bytes` to a hidden sibling and renames it into place, so readers
/// never observe a partially written file. The sibling is removed on failure.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let partial = partial_path(path);

    let result = async {
        let mut file = tokio::fs::File::create(&partial).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&partial, path).await
    }
    .await;

    if result.is_err() {
        if let Err(err) = tokio::fs::remove_file(&partial).await {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!(error = %err, path = %partial.display(), "Failed to remove partial file");
            }
        }
    }

    result
}

fn partial_path(path: &Path) -> PathBuf {
    let name = path.file_name().map(|name| name.to_string_lossy()).unwrap_or_default();
    path.with_file_name(format!(".{name}.part"))
}

/// Removes a file, treating a missing file as success. Returns whether a file was removed.
pub(crate) async fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ClearReport {
    pub(crate) removed: usize,
    pub(crate) failed: usize,
}

impl ClearReport {
    pub(crate) fn merge(self, other: ClearReport) -> ClearReport {
        ClearReport { removed: self.removed + other.removed, failed: self.failed + other.failed }
    }
}

/// Deletes every regular file directly inside `dir`. Subdirectories are left
/// alone and per-file failures are logged and counted, never fatal.
pub(crate) async fn remove_files_in(dir: &Path) -> ClearReport {
    let mut report = ClearReport::default();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return report,
        Err(err) => {
            tracing::warn!(error = %err, dir = %dir.display(), "Failed to read directory");
            report.failed += 1;
            return report;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, dir = %dir.display(), "Failed to list directory entry");
                report.failed += 1;
                break;
            }
        };

        let path = entry.path();
        match entry.file_type().await {
            Ok(file_type) if file_type.is_file() => {}
            Ok(_) => continue,
            Err(err) => {
                tracing::warn!(error = %err, path = %path.display(), "Failed to stat file");
                report.failed += 1;
                continue;
            }
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => report.removed += 1,
            Err(err) => {
                tracing::warn!(error = %err, path = %path.display(), "Failed to delete file");
                report.failed += 1;
            }
        }
    }

    report
}

pub(crate) fn sanitized_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '_' || *c == '-')
        .collect();
    let sanitized = sanitized.trim_start_matches('.');

    if sanitized.is_empty() {
        "upload".to_string()
    } else {
        sanitized.to_string()
    }
}

pub(crate) fn file_stem(name: &str) -> &str {
    Path::new(name).file_stem().and_then(|stem| stem.to_str()).unwrap_or(name)
}
