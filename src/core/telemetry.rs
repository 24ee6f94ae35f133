use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Settings;

pub(crate) fn init_tracing(settings: &Settings) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.telemetry().log_level.clone()));

    let builder = fmt().with_env_filter(filter).with_target(false);

    if settings.telemetry().json {
        builder
            .json()
            .with_span_events(fmt::format::FmtSpan::CLOSE)
            .try_init()
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    } else {
        builder.compact().try_init().map_err(|err| anyhow::anyhow!(err.to_string()))?;
    }

    Ok(())
}

/// Logs where every managed directory and the engine live, once at startup.
pub(crate) fn log_layout(settings: &Settings) {
    let paths = settings.paths();
    let engine = settings.engine();
    tracing::info!(
        uploads = %paths.upload_dir.display(),
        staging = %paths.staging_dir.display(),
        output = %paths.output_dir.display(),
        answer_keys = %paths.answer_key_dir.display(),
        exports = %paths.export_dir.display(),
        result_file = %paths.result_file.display(),
        "Managed directories"
    );
    tracing::info!(
        program = %engine.program,
        args = ?engine.args,
        working_dir = %engine.working_dir.display(),
        timeout_seconds = engine.timeout.as_secs(),
        "Recognition engine"
    );
}
