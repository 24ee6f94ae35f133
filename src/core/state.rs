use std::sync::Arc;

use crate::core::config::Settings;
use crate::services::answer_keys::AnswerKeyStore;
use crate::services::engine::{ProcessEngine, RecognitionEngine};
use crate::services::export::ExportService;
use crate::services::files::ClearReport;
use crate::services::housekeeping;
use crate::services::pipeline::{Pipeline, PipelineError};
use crate::services::upload_store::UploadStore;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    uploads: UploadStore,
    answer_keys: AnswerKeyStore,
    pipeline: Pipeline,
    exports: ExportService,
}

impl AppState {
    pub(crate) fn new(settings: Settings, engine: Arc<dyn RecognitionEngine>) -> Self {
        let uploads = UploadStore::from_settings(&settings);
        let answer_keys = AnswerKeyStore::new(settings.paths().answer_key_dir.clone());
        let pipeline = Pipeline::from_settings(&settings, engine);
        let exports = ExportService::from_settings(&settings);

        Self {
            inner: Arc::new(InnerState { settings, uploads, answer_keys, pipeline, exports }),
        }
    }

    pub(crate) fn from_settings(settings: Settings) -> Self {
        let engine = Arc::new(ProcessEngine::from_settings(&settings));
        Self::new(settings, engine)
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn uploads(&self) -> &UploadStore {
        &self.inner.uploads
    }

    pub(crate) fn answer_keys(&self) -> &AnswerKeyStore {
        &self.inner.answer_keys
    }

    pub(crate) fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    pub(crate) fn exports(&self) -> &ExportService {
        &self.inner.exports
    }

    pub(crate) async fn reset_session(&self) -> Result<ClearReport, PipelineError> {
        housekeeping::reset(
            self.settings().paths(),
            self.pipeline(),
            self.uploads(),
            self.answer_keys(),
        )
        .await
    }
}
