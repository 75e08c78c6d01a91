use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "subscribers": state.engine.registry().len(),
    }))
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state.engine.metrics().encode().map_err(anyhow::Error::from)?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
