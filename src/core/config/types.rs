use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(super) server: ServerSettings,
    pub(super) runtime: RuntimeSettings,
    pub(super) cors: CorsSettings,
    pub(super) paths: PathSettings,
    pub(super) engine: EngineSettings,
    pub(super) uploads: UploadSettings,
    pub(super) grading: GradingSettings,
    pub(super) export: ExportSettings,
    pub(super) telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub(crate) struct ServerSettings {
    pub(super) host: ServerHost,
    pub(super) port: ServerPort,
}

#[derive(Debug, Clone)]
pub(crate) struct CorsSettings {
    pub(crate) origins: Vec<String>,
}

/// Every directory the service owns. Housekeeping only ever touches these.
#[derive(Debug, Clone)]
pub(crate) struct PathSettings {
    pub(crate) upload_dir: PathBuf,
    pub(crate) staging_dir: PathBuf,
    pub(crate) output_dir: PathBuf,
    pub(crate) answer_key_dir: PathBuf,
    pub(crate) export_dir: PathBuf,
    pub(crate) result_file: PathBuf,
}

impl PathSettings {
    pub(crate) fn under_root(root: &Path) -> Self {
        Self {
            upload_dir: root.join("uploads"),
            staging_dir: root.join("images_test"),
            output_dir: root.join("output"),
            answer_key_dir: root.join("result"),
            export_dir: root.join("temp"),
            result_file: root.join("grade").join("grade.xlsx"),
        }
    }

    pub(crate) fn result_dir(&self) -> Option<&Path> {
        self.result_file.parent().filter(|parent| !parent.as_os_str().is_empty())
    }

    /// Directories emptied by a session reset. Exports clean up after themselves.
    pub(crate) fn session_dirs(&self) -> Vec<&Path> {
        let mut dirs = vec![
            self.upload_dir.as_path(),
            self.staging_dir.as_path(),
            self.answer_key_dir.as_path(),
            self.output_dir.as_path(),
        ];
        dirs.extend(self.result_dir());
        dirs
    }

    pub(crate) fn all_dirs(&self) -> Vec<&Path> {
        let mut dirs = self.session_dirs();
        dirs.push(self.export_dir.as_path());
        dirs
    }
}

#[derive(Debug, Clone)]
pub(crate) struct EngineSettings {
    pub(crate) program: String,
    pub(crate) args: Vec<String>,
    pub(crate) working_dir: PathBuf,
    pub(crate) timeout: Duration,
}

#[derive(Debug, Clone)]
pub(crate) struct UploadSettings {
    pub(crate) max_upload_size_mb: u64,
    pub(crate) max_images_per_upload: usize,
    pub(crate) allowed_image_extensions: Vec<String>,
    pub(crate) thumbnail_max_dimension: u32,
}

impl UploadSettings {
    pub(crate) fn max_upload_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }
}

#[derive(Debug, Clone)]
pub(crate) struct GradingSettings {
    pub(crate) default_total_questions: u32,
    pub(crate) max_score: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct ExportSettings {
    pub(crate) grace_period: Duration,
}

#[derive(Debug, Clone)]
pub(crate) struct TelemetrySettings {
    pub(crate) log_level: String,
    pub(crate) json: bool,
    pub(crate) prometheus_enabled: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeSettings {
    pub(crate) environment: Environment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ServerHost(pub(super) String);

#[derive(Debug, Clone, Copy)]
pub(crate) struct ServerPort(pub(super) u16);

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("invalid server host: {0}")]
    InvalidHost(String),
    #[error("invalid server port: {0}")]
    InvalidPort(String),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("invalid cors origins: {0}")]
    InvalidCors(String),
    #[error("unsupported image extension: {0}")]
    UnsupportedExtension(String),
}
