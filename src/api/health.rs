//! Health check endpoint

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use super::ApiState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Calls currently streaming
    pub active_calls: usize,
    /// Completion providers in cascade order
    pub providers: Vec<String>,
    pub stt: bool,
}

/// Liveness probe with a little runtime detail
async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        active_calls: state.calls.registry.len().await,
        providers: state.calls.pipeline.cascade().names(),
        stt: state.calls.recognizer.is_some(),
    })
}

/// Build health check router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}
