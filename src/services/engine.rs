use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::core::config::Settings;
use crate::core::metrics;

const DIAGNOSTIC_TAIL_CHARS: usize = 4000;

#[derive(Debug, Error)]
pub(crate) enum EngineError {
    #[error("failed to launch recognition engine '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("recognition engine failed: {diagnostics}")]
    Exit { code: Option<i32>, diagnostics: String },
    #[error("recognition engine timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("recognition engine produced no result file at {}", .0.display())]
    MissingArtifact(PathBuf),
}

/// Turns a staging directory of sheet images into an aggregate result workbook.
#[async_trait]
pub(crate) trait RecognitionEngine: Send + Sync {
    /// Returns the path of the result workbook on success.
    async fn recognize(&self, staging_dir: &Path) -> Result<PathBuf, EngineError>;

    /// Where the workbook will be written. The pipeline removes any stale copy
    /// before invoking the engine.
    fn result_file(&self) -> &Path;
}

/// Runs the engine as a child process. The child is killed if the call is
/// dropped, which is what happens on timeout or when the client disconnects.
#[derive(Debug, Clone)]
pub(crate) struct ProcessEngine {
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
    timeout: Duration,
    result_file: PathBuf,
    output_dir: PathBuf,
    answer_key_dir: PathBuf,
}

impl ProcessEngine {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        let engine = settings.engine();
        let paths = settings.paths();
        Self {
            program: engine.program.clone(),
            args: engine.args.clone(),
            working_dir: engine.working_dir.clone(),
            timeout: engine.timeout,
            result_file: paths.result_file.clone(),
            output_dir: paths.output_dir.clone(),
            answer_key_dir: paths.answer_key_dir.clone(),
        }
    }
}

#[async_trait]
impl RecognitionEngine for ProcessEngine {
    async fn recognize(&self, staging_dir: &Path) -> Result<PathBuf, EngineError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(&self.working_dir)
            .env("OMR_STAGING_DIR", staging_dir)
            .env("OMR_OUTPUT_DIR", &self.output_dir)
            .env("OMR_ANSWER_KEY_DIR", &self.answer_key_dir)
            .env("OMR_RESULT_FILE", &self.result_file)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let child = command
            .spawn()
            .map_err(|source| EngineError::Launch { program: self.program.clone(), source })?;
        tracing::info!(program = %self.program, pid = ?child.id(), "Recognition engine started");

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result
                .map_err(|source| EngineError::Launch { program: self.program.clone(), source })?,
            Err(_) => {
                tracing::warn!(timeout_seconds = self.timeout.as_secs(), "Recognition engine timed out");
                return Err(EngineError::Timeout(self.timeout));
            }
        };
        metrics::record_engine_duration(started.elapsed());

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::debug!(stdout = %tail(&stdout), stderr = %tail(&stderr), "Recognition engine output");

        if !output.status.success() {
            let code = output.status.code();
            let diagnostics = diagnostics(&stdout, &stderr, code);
            tracing::error!(exit_code = ?code, diagnostics = %diagnostics, "Recognition engine failed");
            return Err(EngineError::Exit { code, diagnostics });
        }

        if !tokio::fs::try_exists(&self.result_file).await.unwrap_or(false) {
            return Err(EngineError::MissingArtifact(self.result_file.clone()));
        }

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            result_file = %self.result_file.display(),
            "Recognition engine finished"
        );
        Ok(self.result_file.clone())
    }

    fn result_file(&self) -> &Path {
        &self.result_file
    }
}

fn tail(text: &str) -> &str {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= DIAGNOSTIC_TAIL_CHARS {
        return trimmed;
    }
    let skip = count - DIAGNOSTIC_TAIL_CHARS;
    let start = trimmed.char_indices().nth(skip).map(|(index, _)| index).unwrap_or(0);
    &trimmed[start..]
}

fn diagnostics(stdout: &str, stderr: &str, code: Option<i32>) -> String {
    let stderr = tail(stderr);
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    let stdout = tail(stdout);
    if !stdout.is_empty() {
        return stdout.to_string();
    }
    match code {
        Some(code) => format!("process exited with code {code}"),
        None => "process terminated by signal".to_string(),
    }
}


#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell_engine(root: &Path, script: &str, timeout: Duration) -> ProcessEngine {
        ProcessEngine {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            working_dir: root.to_path_buf(),
            timeout,
            result_file: root.join("grade.xlsx"),
            output_dir: root.join("output"),
            answer_key_dir: root.join("result"),
        }
    }

    #[tokio::test]
    async fn success_returns_result_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = shell_engine(
            dir.path(),
            "ls \"$OMR_STAGING_DIR\" > \"$OMR_RESULT_FILE\"",
            Duration::from_secs(5),
        );
        std::fs::write(dir.path().join("0000_sheet.jpg"), b"x").unwrap();

        let artifact = engine.recognize(dir.path()).await.expect("engine");

        assert_eq!(artifact, dir.path().join("grade.xlsx"));
        let listing = std::fs::read_to_string(&artifact).unwrap();
        assert!(listing.contains("0000_sheet.jpg"));
    }

    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine =
            shell_engine(dir.path(), "echo 'model missing' >&2; exit 3", Duration::from_secs(5));

        let err = engine.recognize(dir.path()).await.unwrap_err();

        match err {
            EngineError::Exit { code, diagnostics } => {
                assert_eq!(code, Some(3));
                assert_eq!(diagnostics, "model missing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn non_zero_exit_without_output_reports_code() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = shell_engine(dir.path(), "exit 2", Duration::from_secs(5));

        let err = engine.recognize(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("process exited with code 2"));
    }

    #[tokio::test]
    async fn zero_exit_without_artifact_is_missing_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = shell_engine(dir.path(), "true", Duration::from_secs(5));

        let err = engine.recognize(dir.path()).await.unwrap_err();
        assert!(matches!(err, EngineError::MissingArtifact(path) if path.ends_with("grade.xlsx")));
    }

    #[tokio::test]
    async fn slow_engine_times_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = shell_engine(dir.path(), "sleep 5", Duration::from_millis(200));

        let started = Instant::now();
        let err = engine.recognize(dir.path()).await.unwrap_err();

        assert!(matches!(err, EngineError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn missing_program_is_launch_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = shell_engine(dir.path(), "true", Duration::from_secs(5));
        engine.program = "definitely-not-an-omr-engine".to_string();

        let err = engine.recognize(dir.path()).await.unwrap_err();
        assert!(matches!(err, EngineError::Launch { .. }));
    }

    #[test]
    fn tail_keeps_the_end_of_long_output() {
        let long = format!("{}END", "x".repeat(DIAGNOSTIC_TAIL_CHARS + 10));
        let kept = tail(&long);
        assert_eq!(kept.chars().count(), DIAGNOSTIC_TAIL_CHARS);
        assert!(kept.ends_with("END"));
    }
}
