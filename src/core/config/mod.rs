mod parsing;
mod settings;
mod types;

pub(crate) use types::{GradingSettings, PathSettings, Settings};

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::types::ConfigError;
    use super::*;
    use crate::test_support;

    const VARS: &[&str] = &[
        "OMR_HOST",
        "OMR_PORT",
        "OMR_ENV",
        "ENVIRONMENT",
        "OMR_DATA_DIR",
        "OMR_UPLOAD_DIR",
        "OMR_STAGING_DIR",
        "OMR_OUTPUT_DIR",
        "OMR_ENGINE_WORKDIR",
        "OMR_RESULT_FILE",
        "OMR_ENGINE_PROGRAM",
        "OMR_ENGINE_ARGS",
        "OMR_ENGINE_TIMEOUT_SECONDS",
        "ALLOWED_IMAGE_EXTENSIONS",
        "MAX_SCORE",
        "MAX_UPLOAD_SIZE_MB",
        "DEFAULT_TOTAL_QUESTIONS",
        "EXPORT_GRACE_SECONDS",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[tokio::test]
    async fn load_uses_original_layout_by_default() {
        let _guard = test_support::env_lock().await;
        clear_env();

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.server_port(), 5000);
        assert_eq!(settings.runtime().environment, types::Environment::Development);
        assert_eq!(settings.paths().staging_dir, std::path::Path::new("./images_test"));
        assert_eq!(settings.paths().result_file, std::path::Path::new("./grade/grade.xlsx"));
        assert_eq!(settings.engine().program, "python");
        assert_eq!(settings.engine().args, vec!["demo.py".to_string()]);
        assert_eq!(settings.uploads().max_upload_bytes(), 10 * 1024 * 1024);
        assert_eq!(settings.grading().default_total_questions, 40);
        assert_eq!(settings.export().grace_period, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn load_honours_overrides() {
        let _guard = test_support::env_lock().await;
        clear_env();
        std::env::set_var("OMR_DATA_DIR", "/srv/omr");
        std::env::set_var("OMR_UPLOAD_DIR", "/mnt/uploads");
        std::env::set_var("OMR_ENGINE_ARGS", "-u grade.py");
        std::env::set_var("EXPORT_GRACE_SECONDS", "5");

        let settings = Settings::load().expect("settings");
        clear_env();

        assert_eq!(settings.paths().upload_dir, std::path::Path::new("/mnt/uploads"));
        assert_eq!(settings.paths().output_dir, std::path::Path::new("/srv/omr/output"));
        assert_eq!(settings.engine().working_dir, std::path::Path::new("/srv/omr"));
        assert_eq!(settings.engine().args, vec!["-u".to_string(), "grade.py".to_string()]);
        assert_eq!(settings.export().grace_period, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn load_rejects_unsupported_extension() {
        let _guard = test_support::env_lock().await;
        clear_env();
        std::env::set_var("ALLOWED_IMAGE_EXTENSIONS", "jpg,tiff");

        let result = Settings::load();
        clear_env();

        assert!(matches!(result, Err(ConfigError::UnsupportedExtension(ext)) if ext == "tiff"));
    }

    #[tokio::test]
    async fn load_rejects_bad_port_and_zero_timeout() {
        let _guard = test_support::env_lock().await;
        clear_env();
        std::env::set_var("OMR_PORT", "http");
        assert!(matches!(Settings::load(), Err(ConfigError::InvalidPort(_))));

        std::env::remove_var("OMR_PORT");
        std::env::set_var("OMR_ENGINE_TIMEOUT_SECONDS", "0");
        let result = Settings::load();
        clear_env();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "OMR_ENGINE_TIMEOUT_SECONDS", .. })
        ));
    }
}
