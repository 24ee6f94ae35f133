use serde::{Deserialize, Serialize};
use validator::Validate;

/// Placeholder for identifiers the engine did not report.
pub(crate) const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct GradingResult {
    #[serde(default = "unknown")]
    pub(crate) student_id: String,
    #[serde(default = "unknown")]
    pub(crate) exam_code: String,
    #[serde(default)]
    pub(crate) score: f64,
    #[serde(default)]
    pub(crate) correct_answers: u32,
    #[serde(default)]
    pub(crate) total_questions: u32,
    #[serde(default)]
    pub(crate) original_image: String,
    #[serde(default)]
    pub(crate) processed_image: String,
    #[serde(default)]
    pub(crate) file_name: String,
    #[serde(default)]
    pub(crate) processed_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

#[derive(Debug, Serialize)]
pub(crate) struct ProcessImagesResponse {
    pub(crate) success: bool,
    pub(crate) message: String,
    pub(crate) results: Vec<GradingResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExportRequest {
    #[validate(length(min = 1, message = "No results to export"))]
    #[serde(default)]
    pub(crate) results: Vec<GradingResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum RunState {
    Idle,
    Staging,
    Invoking,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct PipelineStatus {
    pub(crate) state: RunState,
    pub(crate) sheets: usize,
    pub(crate) updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) last_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ClearAllResponse {
    pub(crate) success: bool,
    pub(crate) message: String,
    pub(crate) removed_files: usize,
}
