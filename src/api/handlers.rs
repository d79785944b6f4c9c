use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::AppState;
use crate::error::Result;
use crate::hub::HubStats;
use crate::metrics;

/// Health check endpoint
pub async fn health_check() -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Diagnostic stats: clients, upstreams and per-channel subscriber counts
pub async fn stats(State(state): State<AppState>) -> Json<HubStats> {
    Json(state.hub.stats())
}

/// Prometheus text exposition
pub async fn metrics_text() -> String {
    metrics::gather_metrics()
}
