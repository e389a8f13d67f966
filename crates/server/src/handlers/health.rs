//! Health, readiness and version endpoints.

use crate::metrics;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;
use time::OffsetDateTime;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct ReadinessCheck {
    pub name: &'static str,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub checks: Vec<ReadinessCheck>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub backend: &'static str,
}

/// GET /health - 200 when the backend answers the probe, 503 otherwise.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let healthy = match state.store.health_check().await {
        Ok(()) => true,
        Err(e) => {
            metrics::HEALTH_CHECK_FAILURES.inc();
            tracing::error!(error = %e, "Database health check failed");
            false
        }
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "unhealthy" },
            database: healthy,
            version: env!("CARGO_PKG_VERSION"),
            timestamp: OffsetDateTime::now_utc(),
        }),
    )
}

/// GET /ready - Readiness with one entry per dependency.
pub async fn ready_check(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let database = match state.store.health_check().await {
        Ok(()) => ReadinessCheck {
            name: "database",
            status: "ok",
            error: None,
        },
        Err(e) => {
            metrics::HEALTH_CHECK_FAILURES.inc();
            ReadinessCheck {
                name: "database",
                status: "failed",
                error: Some(e.to_string()),
            }
        }
    };

    let checks = vec![database];
    let ready = checks.iter().all(|c| c.error.is_none());
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadyResponse {
            ready,
            checks,
            timestamp: OffsetDateTime::now_utc(),
        }),
    )
}

/// GET /version
pub async fn version(State(state): State<AppState>) -> Json<VersionResponse> {
    Json(VersionResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        backend: state.store.backend(),
    })
}
