use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::collections::HashMap;

use crate::core::metrics;
use crate::core::state::AppState;
use crate::schemas::{HealthResponse, RootResponse};

pub(crate) async fn root() -> Json<RootResponse> {
    let response = RootResponse {
        message: "OMR grading API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    Json(response)
}

pub(crate) async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut status = "healthy".to_string();
    let mut components = HashMap::new();

    let paths = state.settings().paths();
    let directories = [
        ("uploads", &paths.upload_dir),
        ("staging", &paths.staging_dir),
        ("output", &paths.output_dir),
        ("answer_keys", &paths.answer_key_dir),
        ("exports", &paths.export_dir),
    ];
    for (name, dir) in directories {
        if tokio::fs::metadata(dir).await.map(|meta| meta.is_dir()).unwrap_or(false) {
            components.insert(name.to_string(), "healthy".to_string());
        } else {
            components.insert(name.to_string(), "missing".to_string());
            status = "degraded".to_string();
        }
    }

    let pipeline = state.pipeline().status();
    components.insert("pipeline".to_string(), format!("{:?}", pipeline.state).to_lowercase());
    components.insert("uploaded_sheets".to_string(), state.uploads().len().await.to_string());
    components.insert("pending_exports".to_string(), state.exports().pending().to_string());

    Json(HealthResponse { service: "omr-grader".to_string(), status, components })
}

pub(crate) async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.settings().telemetry().prometheus_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    match metrics::render() {
        Some(body) => ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
