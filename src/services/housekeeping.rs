use std::collections::HashSet;
use std::io;
use std::path::Path;

use crate::core::config::PathSettings;
use crate::services::answer_keys::AnswerKeyStore;
use crate::services::files::{remove_files_in, ClearReport};
use crate::services::pipeline::{Pipeline, PipelineError};
use crate::services::upload_store::UploadStore;

pub(crate) async fn ensure_directories(paths: &PathSettings) -> io::Result<()> {
    for dir in paths.all_dirs() {
        tokio::fs::create_dir_all(dir).await.map_err(|err| {
            io::Error::new(err.kind(), format!("failed to create {}: {err}", dir.display()))
        })?;
    }
    Ok(())
}

/// Empties every session directory and both stores. Holds the pipeline's run
/// lock for the duration, so it fails with `Busy` while a run is in progress.
pub(crate) async fn reset(
    paths: &PathSettings,
    pipeline: &Pipeline,
    uploads: &UploadStore,
    answer_keys: &AnswerKeyStore,
) -> Result<ClearReport, PipelineError> {
    let _permit = pipeline.try_lock()?;

    let mut report = uploads.clear().await;
    let mut seen: HashSet<&Path> = HashSet::from([uploads.dir()]);
    for dir in paths.session_dirs() {
        if seen.insert(dir) {
            report = report.merge(remove_files_in(dir).await);
        }
    }
    let keys = answer_keys.clear().await;

    if report.failed > 0 {
        tracing::warn!(failed = report.failed, "Some files could not be removed during reset");
    }
    tracing::info!(removed_files = report.removed, answer_keys = keys, "Session reset");
    Ok(report)
}
