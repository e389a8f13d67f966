//! Store statistics and backend metrics.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;
use vellum_core::{BackendMetrics, DocumentStats};

/// Backend metrics plus process uptime.
#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub uptime_seconds: u64,
    #[serde(flatten)]
    pub backend: BackendMetrics,
}

/// GET /api/v1/stats
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<DocumentStats>> {
    let stats = state.store.stats(state.request_deadline()).await?;
    Ok(Json(stats))
}

/// GET /api/v1/metrics
pub async fn get_metrics(State(state): State<AppState>) -> ApiResult<Json<MetricsResponse>> {
    let backend = state.store.metrics(state.request_deadline()).await?;
    Ok(Json(MetricsResponse {
        uptime_seconds: state.uptime().as_secs(),
        backend,
    }))
}
