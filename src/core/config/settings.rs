use std::path::PathBuf;
use std::time::Duration;

use super::parsing::{
    env_optional, env_or_default, is_supported_image_extension, parse_args, parse_bool,
    parse_cors_origins, parse_environment, parse_positive_f64, parse_string_list, parse_u16,
    parse_u32, parse_u64,
};
use super::types::{
    ConfigError, CorsSettings, EngineSettings, ExportSettings, GradingSettings,
    PathSettings, RuntimeSettings, ServerHost, ServerPort, ServerSettings, Settings,
    TelemetrySettings, UploadSettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("OMR_HOST", "0.0.0.0");
        let port = env_or_default("OMR_PORT", "5000");

        let environment =
            parse_environment(env_optional("OMR_ENV").or_else(|| env_optional("ENVIRONMENT")));

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let data_root = PathBuf::from(env_or_default("OMR_DATA_DIR", "."));
        let defaults = PathSettings::under_root(&data_root);
        let paths = PathSettings {
            upload_dir: env_path("OMR_UPLOAD_DIR", defaults.upload_dir),
            staging_dir: env_path("OMR_STAGING_DIR", defaults.staging_dir),
            output_dir: env_path("OMR_OUTPUT_DIR", defaults.output_dir),
            answer_key_dir: env_path("OMR_ANSWER_KEY_DIR", defaults.answer_key_dir),
            export_dir: env_path("OMR_EXPORT_DIR", defaults.export_dir),
            result_file: env_path("OMR_RESULT_FILE", defaults.result_file),
        };

        let engine_program = env_or_default("OMR_ENGINE_PROGRAM", "python");
        let engine_args = parse_args(env_optional("OMR_ENGINE_ARGS"), &["demo.py"]);
        let engine_working_dir = env_path("OMR_ENGINE_WORKDIR", data_root.clone());
        let engine_timeout_seconds = parse_u64(
            "OMR_ENGINE_TIMEOUT_SECONDS",
            env_or_default("OMR_ENGINE_TIMEOUT_SECONDS", "600"),
        )?;

        let max_upload_size_mb =
            parse_u64("MAX_UPLOAD_SIZE_MB", env_or_default("MAX_UPLOAD_SIZE_MB", "10"))?;
        let max_images_per_upload =
            parse_u64("MAX_IMAGES_PER_UPLOAD", env_or_default("MAX_IMAGES_PER_UPLOAD", "10"))?;
        let allowed_image_extensions =
            parse_string_list(env_optional("ALLOWED_IMAGE_EXTENSIONS"), &["jpg", "jpeg", "png"]);
        let thumbnail_max_dimension = parse_u32(
            "THUMBNAIL_MAX_DIMENSION",
            env_or_default("THUMBNAIL_MAX_DIMENSION", "200"),
        )?;

        let default_total_questions = parse_u32(
            "DEFAULT_TOTAL_QUESTIONS",
            env_or_default("DEFAULT_TOTAL_QUESTIONS", "40"),
        )?;
        let max_score = parse_positive_f64("MAX_SCORE", env_or_default("MAX_SCORE", "10"))?;

        let export_grace_seconds =
            parse_u64("EXPORT_GRACE_SECONDS", env_or_default("EXPORT_GRACE_SECONDS", "60"))?;

        let log_level = env_or_default("LOG_LEVEL", "info");
        let json = env_optional("LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings { host: ServerHost(host), port: parse_port(port)? },
            runtime: RuntimeSettings { environment },
            cors: CorsSettings { origins: cors_origins },
            paths,
            engine: EngineSettings {
                program: engine_program,
                args: engine_args,
                working_dir: engine_working_dir,
                timeout: Duration::from_secs(engine_timeout_seconds),
            },
            uploads: UploadSettings {
                max_upload_size_mb,
                max_images_per_upload: max_images_per_upload as usize,
                allowed_image_extensions,
                thumbnail_max_dimension,
            },
            grading: GradingSettings { default_total_questions, max_score },
            export: ExportSettings { grace_period: Duration::from_secs(export_grace_seconds) },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Settings rooted in a scratch directory, with defaults for everything else.
    #[cfg(test)]
    pub(crate) fn for_data_root(root: &std::path::Path) -> Self {
        Self {
            server: ServerSettings {
                host: ServerHost("127.0.0.1".to_string()),
                port: ServerPort(0),
            },
            runtime: RuntimeSettings { environment: super::types::Environment::Test },
            cors: CorsSettings { origins: Vec::new() },
            paths: PathSettings::under_root(root),
            engine: EngineSettings {
                program: "true".to_string(),
                args: Vec::new(),
                working_dir: root.to_path_buf(),
                timeout: Duration::from_secs(5),
            },
            uploads: UploadSettings {
                max_upload_size_mb: 10,
                max_images_per_upload: 10,
                allowed_image_extensions: vec![
                    "jpg".to_string(),
                    "jpeg".to_string(),
                    "png".to_string(),
                ],
                thumbnail_max_dimension: 200,
            },
            grading: GradingSettings { default_total_questions: 40, max_score: 10.0 },
            export: ExportSettings { grace_period: Duration::from_secs(60) },
            telemetry: TelemetrySettings {
                log_level: "info".to_string(),
                json: false,
                prometheus_enabled: false,
            },
        }
    }

    #[cfg(test)]
    pub(crate) fn uploads_mut(&mut self) -> &mut UploadSettings {
        &mut self.uploads
    }

    #[cfg(test)]
    pub(crate) fn telemetry_mut(&mut self) -> &mut TelemetrySettings {
        &mut self.telemetry
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn paths(&self) -> &PathSettings {
        &self.paths
    }

    pub(crate) fn engine(&self) -> &EngineSettings {
        &self.engine
    }

    pub(crate) fn uploads(&self) -> &UploadSettings {
        &self.uploads
    }

    pub(crate) fn grading(&self) -> &GradingSettings {
        &self.grading
    }

    pub(crate) fn export(&self) -> &ExportSettings {
        &self.export
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.0.is_empty() || self.server.host.0.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidHost(self.server.host.0.clone()));
        }

        if self.uploads.allowed_image_extensions.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ALLOWED_IMAGE_EXTENSIONS",
                value: String::from("<empty>"),
            });
        }

        for extension in &self.uploads.allowed_image_extensions {
            if !is_supported_image_extension(extension) {
                return Err(ConfigError::UnsupportedExtension(extension.clone()));
            }
        }

        if self.uploads.max_images_per_upload == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_IMAGES_PER_UPLOAD",
                value: "0".to_string(),
            });
        }

        if self.uploads.thumbnail_max_dimension == 0 {
            return Err(ConfigError::InvalidValue {
                field: "THUMBNAIL_MAX_DIMENSION",
                value: "0".to_string(),
            });
        }

        if self.engine.timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "OMR_ENGINE_TIMEOUT_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.grading.default_total_questions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DEFAULT_TOTAL_QUESTIONS",
                value: "0".to_string(),
            });
        }

        Ok(())
    }
}

fn parse_port(value: String) -> Result<ServerPort, ConfigError> {
    parse_u16("OMR_PORT", value.clone())
        .map(ServerPort)
        .map_err(|_| ConfigError::InvalidPort(value))
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    env_optional(key).map(PathBuf::from).unwrap_or(default)
}
