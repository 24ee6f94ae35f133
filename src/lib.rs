pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod schemas;
pub(crate) mod services;

#[cfg(test)]
mod test_support;

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::services::housekeeping;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;
    telemetry::log_layout(&settings);

    housekeeping::ensure_directories(settings.paths()).await?;
    let state = AppState::from_settings(settings);

    // A restart starts a fresh session, like the stores themselves.
    let cleared = state.reset_session().await?;
    tracing::info!(removed_files = cleared.removed, "Previous session cleared");

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "OMR grading API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    state.exports().shutdown().await;
    tracing::info!("Pending exports removed");

    result?;

    Ok(())
}
