use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AnswerKey {
    pub(crate) exam_code: String,
    /// Trimmed, uppercase, never empty.
    pub(crate) answers: Vec<String>,
    pub(crate) total_questions: u32,
    pub(crate) file_path: PathBuf,
    pub(crate) uploaded_at: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerKeyUploadResponse {
    pub(crate) success: bool,
    pub(crate) message: String,
    pub(crate) exam_code: String,
    pub(crate) total_questions: u32,
    /// First few answers only, for a quick visual check.
    pub(crate) answers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerKeysResponse {
    pub(crate) answer_keys: BTreeMap<String, AnswerKey>,
}
