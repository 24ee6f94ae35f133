use std::sync::OnceLock;
use std::time::Duration;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

pub(crate) fn record_upload(accepted: usize, rejected: usize) {
    metrics::counter!("sheets_uploaded_total", "outcome" => "accepted").increment(accepted as u64);
    metrics::counter!("sheets_uploaded_total", "outcome" => "rejected").increment(rejected as u64);
}

pub(crate) fn record_run(outcome: &'static str, sheets: usize) {
    metrics::counter!("grading_runs_total", "outcome" => outcome).increment(1);
    metrics::counter!("graded_sheets_total", "outcome" => outcome).increment(sheets as u64);
}

pub(crate) fn record_engine_duration(elapsed: Duration) {
    metrics::histogram!("engine_duration_seconds").record(elapsed.as_secs_f64());
}
