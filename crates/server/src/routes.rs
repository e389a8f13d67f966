//! Route configuration.

use crate::auth::admin_auth_middleware;
use crate::handlers;
use crate::metrics::{metrics_handler, track_http_metrics};
use crate::state::AppState;
use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware;
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

/// Room for the request envelope around a maximum-size document.
const ENVELOPE_SLACK_BYTES: usize = 64 * 1024;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state
        .config
        .limits
        .max_document_bytes
        .saturating_add(ENVELOPE_SLACK_BYTES);

    let document_routes = Router::new()
        .route(
            "/api/v1/json",
            post(handlers::store_json).get(handlers::get_json_by_hash),
        )
        .route("/api/v1/json/raw", post(handlers::store_raw_json))
        .route(
            "/api/v1/json/batch",
            post(handlers::store_json_batch).get(handlers::get_json_batch),
        )
        .route("/api/v1/json/batch/get", post(handlers::post_json_batch_get))
        .route("/api/v1/json/{id}", get(handlers::get_json))
        .layer(DefaultBodyLimit::max(body_limit));

    // Admin endpoints require Basic auth when credentials are configured
    let admin_routes = Router::new()
        .route("/api/v1/stats", get(handlers::get_stats))
        .route("/api/v1/metrics", get(handlers::get_metrics))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ));

    // Probes are unauthenticated for load balancers and orchestrators
    let probe_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::ready_check))
        .route("/version", get(handlers::version));

    let mut router = Router::new()
        .merge(document_routes)
        .merge(admin_routes)
        .merge(probe_routes);

    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(middleware::from_fn(track_http_metrics))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http().make_span_with(|req: &Request| {
                        let request_id = req
                            .headers()
                            .get("x-request-id")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("-");
                        tracing::info_span!(
                            "request",
                            method = %req.method(),
                            uri = %req.uri(),
                            request_id = %request_id,
                        )
                    }),
                )
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}
