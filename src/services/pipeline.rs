use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use calamine::Data;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;

use crate::core::config::{GradingSettings, PathSettings, Settings};
use crate::core::metrics;
use crate::core::time::now_rfc3339;
use crate::schemas::answer_key::AnswerKey;
use crate::schemas::grading::{GradingResult, PipelineStatus, RunState, UNKNOWN};
use crate::schemas::sheet::UploadedSheet;
use crate::services::answer_keys::AnswerKeyStore;
use crate::services::engine::RecognitionEngine;
use crate::services::files::{file_stem, remove_files_in, remove_if_exists};
use crate::services::spreadsheet::{self, Sheet, SpreadsheetError};
use crate::services::upload_store::UploadStore;

const UNMATCHED: &str = "Recognition engine returned no result for this sheet";

#[derive(Debug, Error)]
pub(crate) enum PipelineError {
    #[error("{0}")]
    Validation(String),
    #[error("a grading run is already in progress")]
    Busy,
    #[error("{context} ({}): {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("result workbook could not be read: {0}")]
    Artifact(#[source] SpreadsheetError),
}

impl PipelineError {
    fn io(context: &'static str, path: &Path, source: io::Error) -> Self {
        PipelineError::Io { context, path: path.to_path_buf(), source }
    }
}

/// Outcome of one run. `engine_error` is set when the engine failed, in which
/// case every result carries the error marker.
#[derive(Debug)]
pub(crate) struct RunReport {
    pub(crate) results: Vec<GradingResult>,
    pub(crate) engine_error: Option<String>,
}

impl RunReport {
    pub(crate) fn succeeded(&self) -> bool {
        self.engine_error.is_none()
    }
}

#[derive(Debug, Clone)]
struct StagedSheet {
    sheet: UploadedSheet,
    staged_name: String,
}

struct ArtifactColumns {
    student_id: Option<usize>,
    exam_code: Option<usize>,
    score: Option<usize>,
    file: Option<usize>,
}

impl ArtifactColumns {
    fn locate(sheet: &Sheet) -> Self {
        let column = |names: &[&str]| {
            sheet.find_column(|header| {
                let header = header.replace('_', " ");
                names.iter().any(|name| header == *name)
            })
        };
        Self {
            student_id: column(&["ma sinh vien", "student id"]),
            exam_code: column(&["ma de", "exam code"]),
            score: column(&["diem", "score"]),
            file: column(&["file", "ten file", "filename", "file name"]),
        }
    }
}

/// Runs the staging, recognition and correlation steps for the current batch.
/// At most one run (or reset) holds the run lock at a time.
pub(crate) struct Pipeline {
    engine: Arc<dyn RecognitionEngine>,
    staging_dir: PathBuf,
    output_dir: PathBuf,
    grading: GradingSettings,
    run_lock: Arc<tokio::sync::Mutex<()>>,
    status: Arc<Mutex<PipelineStatus>>,
}

impl Pipeline {
    pub(crate) fn new(
        engine: Arc<dyn RecognitionEngine>,
        paths: &PathSettings,
        grading: GradingSettings,
    ) -> Self {
        Self {
            engine,
            staging_dir: paths.staging_dir.clone(),
            output_dir: paths.output_dir.clone(),
            grading,
            run_lock: Arc::new(tokio::sync::Mutex::new(())),
            status: Arc::new(Mutex::new(PipelineStatus {
                state: RunState::Idle,
                sheets: 0,
                updated_at: now_rfc3339(),
                last_error: None,
            })),
        }
    }

    pub(crate) fn from_settings(settings: &Settings, engine: Arc<dyn RecognitionEngine>) -> Self {
        Self::new(engine, settings.paths(), settings.grading().clone())
    }

    pub(crate) fn status(&self) -> PipelineStatus {
        self.status.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Takes the run lock without waiting. Housekeeping holds it while it
    /// wipes the managed directories.
    pub(crate) fn try_lock(&self) -> Result<OwnedMutexGuard<()>, PipelineError> {
        self.run_lock.clone().try_lock_owned().map_err(|_| PipelineError::Busy)
    }

    pub(crate) async fn run(
        &self,
        uploads: &UploadStore,
        answer_keys: &AnswerKeyStore,
    ) -> Result<RunReport, PipelineError> {
        let _permit = self.try_lock()?;

        let sheets = uploads.list().await;
        if sheets.is_empty() {
            return Err(PipelineError::Validation("No images uploaded".to_string()));
        }

        let mut tracker = RunTracker::start(self.status.clone(), sheets.len());
        tracing::info!(sheets = sheets.len(), "Grading run started");

        match self.run_batch(&sheets, answer_keys, &mut tracker).await {
            Ok(report) => {
                match &report.engine_error {
                    None => {
                        tracker.finish(RunState::Succeeded, None);
                        metrics::record_run("succeeded", report.results.len());
                        tracing::info!(results = report.results.len(), "Grading run finished");
                    }
                    Some(error) => {
                        tracker.finish(RunState::Failed, Some(error.clone()));
                        metrics::record_run("engine_failed", report.results.len());
                    }
                }
                Ok(report)
            }
            Err(err) => {
                tracing::error!(error = %err, "Grading run failed");
                tracker.finish(RunState::Failed, Some(err.to_string()));
                metrics::record_run("failed", sheets.len());
                Err(err)
            }
        }
    }

    async fn run_batch(
        &self,
        sheets: &[UploadedSheet],
        answer_keys: &AnswerKeyStore,
        tracker: &mut RunTracker,
    ) -> Result<RunReport, PipelineError> {
        let staged = self.stage(sheets).await?;

        tracker.transition(RunState::Invoking);
        let artifact = match self.engine.recognize(&self.staging_dir).await {
            Ok(artifact) => artifact,
            Err(err) => return Ok(self.failed_batch(&staged, err.to_string())),
        };

        // An unreadable workbook breaks the engine's contract just like a bad exit.
        let sheet = match read_artifact(&artifact).await {
            Ok(sheet) => sheet,
            Err(err) => return Ok(self.failed_batch(&staged, err.to_string())),
        };
        let keys = answer_keys.list().await;

        let results = self.correlate(&staged, &sheet, &keys).await;
        Ok(RunReport { results, engine_error: None })
    }

    /// Replaces the staging directory contents with the batch, in upload
    /// order, and removes the previous run's result workbook.
    async fn stage(&self, sheets: &[UploadedSheet]) -> Result<Vec<StagedSheet>, PipelineError> {
        tokio::fs::create_dir_all(&self.staging_dir).await.map_err(|err| {
            PipelineError::io("Failed to create staging directory", &self.staging_dir, err)
        })?;

        let cleared = remove_files_in(&self.staging_dir).await;
        if cleared.failed > 0 {
            return Err(PipelineError::io(
                "Failed to clear staging directory",
                &self.staging_dir,
                io::Error::other(format!("{} stale files could not be removed", cleared.failed)),
            ));
        }

        let result_file = self.engine.result_file();
        remove_if_exists(result_file).await.map_err(|err| {
            PipelineError::io("Failed to remove stale result workbook", result_file, err)
        })?;

        let mut staged = Vec::with_capacity(sheets.len());
        for (position, sheet) in sheets.iter().enumerate() {
            let staged_name = format!("{position:04}_{}", staged_filename(&sheet.filename));
            let target = self.staging_dir.join(&staged_name);
            tokio::fs::copy(&sheet.path, &target)
                .await
                .map_err(|err| PipelineError::io("Failed to stage sheet", &sheet.path, err))?;
            staged.push(StagedSheet { sheet: sheet.clone(), staged_name });
        }

        tracing::debug!(
            staged = staged.len(),
            cleared = cleared.removed,
            dir = %self.staging_dir.display(),
            "Batch staged"
        );
        Ok(staged)
    }

    async fn correlate(
        &self,
        staged: &[StagedSheet],
        artifact: &Sheet,
        keys: &BTreeMap<String, AnswerKey>,
    ) -> Vec<GradingResult> {
        let columns = ArtifactColumns::locate(artifact);
        let processed_at = now_rfc3339();

        let rows: Vec<Option<&Vec<Data>>> = match columns.file {
            Some(file_column) => {
                // A name listed on more than one row cannot be attributed to a sheet.
                let mut by_name: HashMap<String, Option<&Vec<Data>>> = HashMap::new();
                for row in &artifact.rows {
                    if let Some(name) = Sheet::text(row, file_column) {
                        by_name.entry(name).and_modify(|slot| *slot = None).or_insert(Some(row));
                    }
                }
                staged
                    .iter()
                    .map(|staged| {
                        lookup_keys(staged)
                            .into_iter()
                            .find_map(|key| by_name.get(key).copied())
                            .flatten()
                    })
                    .collect()
            }
            None => (0..staged.len()).map(|index| artifact.rows.get(index)).collect(),
        };

        if artifact.rows.len() != staged.len() {
            tracing::warn!(
                rows = artifact.rows.len(),
                sheets = staged.len(),
                keyed = columns.file.is_some(),
                "Result workbook row count does not match the batch"
            );
        }

        let mut results = Vec::with_capacity(staged.len());
        for (staged, row) in staged.iter().zip(rows) {
            let result = match row {
                Some(row) => self.graded_result(staged, row, &columns, keys, &processed_at).await,
                None => self.failed_result(staged, UNMATCHED, &processed_at),
            };
            results.push(result);
        }
        results
    }

    async fn graded_result(
        &self,
        staged: &StagedSheet,
        row: &[Data],
        columns: &ArtifactColumns,
        keys: &BTreeMap<String, AnswerKey>,
        processed_at: &str,
    ) -> GradingResult {
        let text = |column: Option<usize>| {
            column.and_then(|column| Sheet::text(row, column)).unwrap_or_else(|| UNKNOWN.to_string())
        };
        let student_id = text(columns.student_id);
        let exam_code = text(columns.exam_code);
        let score = columns.score.and_then(|column| Sheet::number(row, column)).unwrap_or(0.0);

        let total_questions = keys
            .get(&exam_code)
            .map(|key| key.total_questions)
            .unwrap_or(self.grading.default_total_questions);
        let correct_answers = correct_answers(score, self.grading.max_score, total_questions);

        GradingResult {
            student_id,
            exam_code,
            score,
            correct_answers,
            total_questions,
            original_image: staged.sheet.url.clone(),
            processed_image: self.processed_image(staged).await,
            file_name: staged.sheet.original_name.clone(),
            processed_at: processed_at.to_string(),
            error: None,
        }
    }

    fn failed_batch(&self, staged: &[StagedSheet], message: String) -> RunReport {
        tracing::warn!(error = %message, sheets = staged.len(), "Marking batch as failed");
        let processed_at = now_rfc3339();
        let results = staged
            .iter()
            .map(|staged| self.failed_result(staged, &message, &processed_at))
            .collect();
        RunReport { results, engine_error: Some(message) }
    }

    fn failed_result(
        &self,
        staged: &StagedSheet,
        message: &str,
        processed_at: &str,
    ) -> GradingResult {
        GradingResult {
            student_id: UNKNOWN.to_string(),
            exam_code: UNKNOWN.to_string(),
            score: 0.0,
            correct_answers: 0,
            total_questions: self.grading.default_total_questions,
            original_image: staged.sheet.url.clone(),
            processed_image: staged.sheet.url.clone(),
            file_name: staged.sheet.original_name.clone(),
            processed_at: processed_at.to_string(),
            error: Some(message.to_string()),
        }
    }

    async fn processed_image(&self, staged: &StagedSheet) -> String {
        let name = format!("{}_full.jpg", file_stem(&staged.staged_name));
        let path = self.output_dir.join(&name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            format!("/output/{name}")
        } else {
            staged.sheet.url.clone()
        }
    }
}

/// Names that identify exactly one sheet of the batch. The client-supplied
/// name is left out since two uploads may share it.
fn lookup_keys(staged: &StagedSheet) -> [&str; 3] {
    [staged.staged_name.as_str(), file_stem(&staged.staged_name), staged.sheet.filename.as_str()]
}

/// The recognition engine only picks up `.jpg` and `.png` files.
fn staged_filename(filename: &str) -> String {
    let stem = file_stem(filename);
    match filename.get(stem.len()..) {
        Some(extension) if extension.eq_ignore_ascii_case(".jpeg") => format!("{stem}.jpg"),
        _ => filename.to_string(),
    }
}

async fn read_artifact(path: &Path) -> Result<Sheet, PipelineError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|err| PipelineError::io("Failed to read result workbook", path, err))?;
    spreadsheet::read_first_sheet(bytes).map_err(PipelineError::Artifact)
}

fn correct_answers(score: f64, max_score: f64, total_questions: u32) -> u32 {
    if max_score <= 0.0 {
        return 0;
    }
    let total = f64::from(total_questions);
    (score / max_score * total).round().clamp(0.0, total) as u32
}


/// Publishes state transitions. Dropped before `finish` (the run future was
/// cancelled), it leaves the status as failed.
struct RunTracker {
    status: Arc<Mutex<PipelineStatus>>,
    finished: bool,
}

impl RunTracker {
    fn start(status: Arc<Mutex<PipelineStatus>>, sheets: usize) -> Self {
        {
            let mut current = status.lock().unwrap_or_else(PoisonError::into_inner);
            *current = PipelineStatus {
                state: RunState::Staging,
                sheets,
                updated_at: now_rfc3339(),
                last_error: None,
            };
        }
        Self { status, finished: false }
    }

    fn transition(&mut self, state: RunState) {
        let mut current = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        current.state = state;
        current.updated_at = now_rfc3339();
    }

    fn finish(&mut self, state: RunState, error: Option<String>) {
        let mut current = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        current.state = state;
        current.updated_at = now_rfc3339();
        current.last_error = error;
        self.finished = true;
    }
}

impl Drop for RunTracker {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("Grading run cancelled before completion");
            self.finish(RunState::Failed, Some("Grading run was cancelled".to_string()));
        }
    }
}
