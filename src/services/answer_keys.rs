use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::RwLock;

use crate::core::time::{now_rfc3339, now_utc};
use crate::schemas::answer_key::AnswerKey;
use crate::services::files::write_atomic;
use crate::services::spreadsheet::{self, CellValue, Sheet};

/// Header fragments that mark the answer column, compared lowercased.
const ANSWER_COLUMN_TOKENS: &[&str] = &["answer", "dap_an", "đáp án"];
const MAX_EXAM_CODE_LEN: usize = 32;

#[derive(Debug, Error)]
pub(crate) enum AnswerKeyError {
    #[error("{0}")]
    Validation(String),
    #[error("failed to persist answer key ({}): {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to render answer key: {0}")]
    Render(#[source] spreadsheet::SpreadsheetError),
}

/// Answer keys by exam code. Each key is also written to
/// `result{exam_code}.xlsx`, which is where the recognition engine looks for it.
pub(crate) struct AnswerKeyStore {
    dir: PathBuf,
    keys: RwLock<BTreeMap<String, AnswerKey>>,
}

impl AnswerKeyStore {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self { dir, keys: RwLock::new(BTreeMap::new()) }
    }

    pub(crate) async fn ingest(
        &self,
        workbook: Vec<u8>,
        requested_exam_code: Option<&str>,
    ) -> Result<AnswerKey, AnswerKeyError> {
        let exam_code = match requested_exam_code.map(str::trim).filter(|code| !code.is_empty()) {
            Some(code) => validate_exam_code(code)?,
            None => derived_exam_code(),
        };

        let sheet = spreadsheet::read_first_sheet(workbook).map_err(|err| {
            AnswerKeyError::Validation(format!("Answer key spreadsheet could not be read: {err}"))
        })?;
        if sheet.rows.is_empty() {
            return Err(AnswerKeyError::Validation(
                "Answer key sheet is empty or has no data rows".to_string(),
            ));
        }

        let answers = extract_answers(&sheet);
        let file_path = self.dir.join(format!("result{exam_code}.xlsx"));

        let rows: Vec<Vec<CellValue>> = answers
            .iter()
            .enumerate()
            .map(|(index, answer)| vec![(index as u32 + 1).into(), answer.as_str().into()])
            .collect();
        let rendered = spreadsheet::render_workbook("Answers", &["Question", "Answer"], &rows)
            .map_err(AnswerKeyError::Render)?;
        write_atomic(&file_path, &rendered)
            .await
            .map_err(|source| AnswerKeyError::Io { path: file_path.clone(), source })?;

        let key = AnswerKey {
            exam_code: exam_code.clone(),
            total_questions: answers.len() as u32,
            answers,
            file_path,
            uploaded_at: now_rfc3339(),
        };

        let replaced = self.keys.write().await.insert(exam_code.clone(), key.clone()).is_some();
        tracing::info!(
            exam_code = %exam_code,
            total_questions = key.total_questions,
            replaced,
            "Answer key stored"
        );

        Ok(key)
    }

    pub(crate) async fn list(&self) -> BTreeMap<String, AnswerKey> {
        self.keys.read().await.clone()
    }

    /// Forgets every key. The files are removed by housekeeping with the rest
    /// of the answer-key directory.
    pub(crate) async fn clear(&self) -> usize {
        let mut keys = self.keys.write().await;
        let count = keys.len();
        keys.clear();
        count
    }
}

fn answer_column(sheet: &Sheet) -> usize {
    sheet
        .find_column(|header| ANSWER_COLUMN_TOKENS.iter().any(|token| header.contains(token)))
        .unwrap_or(0)
}

fn extract_answers(sheet: &Sheet) -> Vec<String> {
    let column = answer_column(sheet);
    sheet
        .rows
        .iter()
        .filter_map(|row| Sheet::text(row, column))
        .map(|answer| answer.trim().to_uppercase())
        .filter(|answer| !answer.is_empty())
        .collect()
}

fn validate_exam_code(code: &str) -> Result<String, AnswerKeyError> {
    let valid = code.len() <= MAX_EXAM_CODE_LEN
        && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(code.to_string())
    } else {
        Err(AnswerKeyError::Validation(format!(
            "Exam code must be 1-{MAX_EXAM_CODE_LEN} letters, digits, '-' or '_'"
        )))
    }
}

/// Codes generated within the same second, or 1000 seconds apart, collide.
fn derived_exam_code() -> String {
    (now_utc().unix_timestamp().rem_euclid(1000)).to_string()
}
