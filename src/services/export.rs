use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::config::Settings;
use crate::core::time::{now_utc, unix_millis};
use crate::schemas::grading::GradingResult;
use crate::services::files::{remove_if_exists, write_atomic};
use crate::services::spreadsheet::{self, CellValue, SpreadsheetError};

pub(crate) const EXPORT_SHEET_NAME: &str = "Grading results";
pub(crate) const EXPORT_HEADERS: [&str; 7] = [
    "Student ID",
    "Exam code",
    "Correct answers",
    "Total questions",
    "Score",
    "Image file",
    "Processed at",
];
pub(crate) const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Error)]
pub(crate) enum ExportError {
    #[error("{0}")]
    Validation(String),
    #[error("failed to render export: {0}")]
    Render(#[source] SpreadsheetError),
    #[error("failed to write export ({}): {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug)]
pub(crate) struct ExportFile {
    pub(crate) filename: String,
    pub(crate) bytes: Vec<u8>,
}

/// Writes result spreadsheets to the export directory and deletes each one
/// after the grace period. Pending deletions run early on `shutdown`.
pub(crate) struct ExportService {
    dir: PathBuf,
    grace_period: Duration,
    shutdown_tx: watch::Sender<bool>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl ExportService {
    pub(crate) fn new(dir: PathBuf, grace_period: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self { dir, grace_period, shutdown_tx, pending: Mutex::new(Vec::new()) }
    }

    pub(crate) fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.paths().export_dir.clone(), settings.export().grace_period)
    }

    pub(crate) async fn export(&self, results: &[GradingResult]) -> Result<ExportFile, ExportError> {
        if results.is_empty() {
            return Err(ExportError::Validation("No results to export".to_string()));
        }

        let suffix = Uuid::new_v4().simple().to_string();
        let filename =
            format!("grading_results_{}_{}.xlsx", unix_millis(now_utc()), &suffix[..8]);
        let path = self.dir.join(&filename);
        let _cleanup = CleanupGuard { service: self, path: path.clone() };

        let rows: Vec<Vec<CellValue>> = results.iter().map(export_row).collect();
        let bytes = spreadsheet::render_workbook(EXPORT_SHEET_NAME, &EXPORT_HEADERS, &rows)
            .map_err(ExportError::Render)?;
        write_atomic(&path, &bytes)
            .await
            .map_err(|source| ExportError::Io { path: path.clone(), source })?;

        tracing::info!(filename = %filename, rows = results.len(), "Results exported");
        Ok(ExportFile { filename, bytes })
    }

    /// Cancels every pending wait and deletes the files now.
    pub(crate) async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        self.wait_pending().await;
    }

    pub(crate) async fn wait_pending(&self) {
        let handles = std::mem::take(&mut *self.lock_pending());
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "Export cleanup task failed");
            }
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.lock_pending().iter().filter(|handle| !handle.is_finished()).count()
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule_cleanup(&self, path: PathBuf) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            if let Err(err) = std::fs::remove_file(&path) {
                if err.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(error = %err, path = %path.display(), "Failed to delete export");
                }
            }
            return;
        };

        let handle =
            runtime.spawn(remove_after(path, self.grace_period, self.shutdown_tx.subscribe()));
        let mut pending = self.lock_pending();
        pending.retain(|handle| !handle.is_finished());
        pending.push(handle);
    }
}

/// Schedules deletion of the export file however `export` returns.
struct CleanupGuard<'a> {
    service: &'a ExportService,
    path: PathBuf,
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        self.service.schedule_cleanup(std::mem::take(&mut self.path));
    }
}

async fn remove_after(path: PathBuf, grace_period: Duration, mut shutdown: watch::Receiver<bool>) {
    tokio::select! {
        _ = tokio::time::sleep(grace_period) => {}
        _ = shutdown.wait_for(|stop| *stop) => {}
    }
    remove_export(&path).await;
}

async fn remove_export(path: &Path) {
    match remove_if_exists(path).await {
        Ok(true) => tracing::debug!(path = %path.display(), "Export deleted"),
        Ok(false) => {}
        Err(err) => tracing::warn!(error = %err, path = %path.display(), "Failed to delete export"),
    }
}

fn export_row(result: &GradingResult) -> Vec<CellValue> {
    vec![
        result.student_id.as_str().into(),
        result.exam_code.as_str().into(),
        result.correct_answers.into(),
        result.total_questions.into(),
        result.score.into(),
        result.file_name.as_str().into(),
        result.processed_at.as_str().into(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::spreadsheet::Sheet;

    fn result(student_id: &str, score: f64) -> GradingResult {
        GradingResult {
            student_id: student_id.to_string(),
            exam_code: "101".to_string(),
            score,
            correct_answers: (score * 4.0) as u32,
            total_questions: 40,
            original_image: "/uploads/a.png".to_string(),
            processed_image: "/output/a_full.jpg".to_string(),
            file_name: format!("{student_id}.png"),
            processed_at: "2025-01-02T10:20:30Z".to_string(),
            error: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn export_renders_rows_and_deletes_after_grace() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = ExportService::new(dir.path().to_path_buf(), Duration::from_secs(60));
        let started = tokio::time::Instant::now();

        let file = service
            .export(&[result("S1", 8.0), result("S2", 5.0), result("S3", 10.0)])
            .await
            .expect("export");

        assert!(file.filename.starts_with("grading_results_"));
        assert!(file.filename.ends_with(".xlsx"));
        let sheet = spreadsheet::read_first_sheet(file.bytes.clone()).expect("read export");
        assert_eq!(sheet.headers, EXPORT_HEADERS.map(str::to_string).to_vec());
        assert_eq!(sheet.rows.len(), 3);
        assert_eq!(Sheet::text(&sheet.rows[0], 0).as_deref(), Some("S1"));
        assert_eq!(Sheet::number(&sheet.rows[0], 2), Some(32.0));
        assert_eq!(Sheet::number(&sheet.rows[2], 4), Some(10.0));
        assert_eq!(Sheet::text(&sheet.rows[1], 5).as_deref(), Some("S2.png"));

        let path = dir.path().join(&file.filename);
        assert!(path.exists());
        assert_eq!(service.pending(), 1);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(path.exists());

        service.wait_pending().await;
        assert!(!path.exists());
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_deletes_pending_exports_immediately() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = ExportService::new(dir.path().to_path_buf(), Duration::from_secs(60));
        let started = tokio::time::Instant::now();

        let first = service.export(&[result("S1", 1.0)]).await.expect("export");
        let second = service.export(&[result("S2", 2.0)]).await.expect("export");
        assert_ne!(first.filename, second.filename);

        service.shutdown().await;

        assert!(!dir.path().join(&first.filename).exists());
        assert!(!dir.path().join(&second.filename).exists());
        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(service.pending(), 0);
    }

    #[tokio::test]
    async fn empty_export_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = ExportService::new(dir.path().to_path_buf(), Duration::from_secs(60));

        let err = service.export(&[]).await.unwrap_err();

        assert!(matches!(err, ExportError::Validation(message) if message == "No results to export"));
        assert_eq!(service.pending(), 0);
    }

    #[tokio::test]
    async fn write_failure_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service =
            ExportService::new(dir.path().join("missing"), Duration::from_millis(10));

        let err = service.export(&[result("S1", 1.0)]).await.unwrap_err();

        assert!(matches!(err, ExportError::Io { .. }));
        service.wait_pending().await;
    }
}
