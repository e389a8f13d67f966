//! Prometheus metrics for the Vellum server.
//!
//! Exposes counters for stored, deduplicated and rejected documents, batch item
//! failures, health probe failures, and request latency by route.
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping and
//! should be network-restricted to scraper addresses.

use axum::extract::{MatchedPath, Request};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};
use std::time::Instant;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Document metrics
pub static DOCUMENTS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vellum_documents_created_total",
        "Total number of documents inserted",
    )
    .expect("metric creation failed")
});

pub static DOCUMENTS_DEDUPLICATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vellum_documents_deduplicated_total",
        "Total number of stores that matched an existing document",
    )
    .expect("metric creation failed")
});

pub static DOCUMENTS_REJECTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vellum_documents_rejected_total",
        "Total number of documents rejected as invalid",
    )
    .expect("metric creation failed")
});

pub static BATCH_ITEMS_FAILED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vellum_batch_items_failed_total",
            "Total failed batch items by error code",
        ),
        &["code"],
    )
    .expect("metric creation failed")
});

pub static HEALTH_CHECK_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vellum_health_check_failures_total",
        "Total number of failed backend health probes",
    )
    .expect("metric creation failed")
});

// Timing metrics
pub static HTTP_REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "vellum_http_request_duration_seconds",
            "HTTP request latency by route, method and status",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
        ]),
        &["route", "method", "status"],
    )
    .expect("metric creation failed")
});

static REGISTER: Once = Once::new();

/// Register all metrics with the global registry. Safe to call more than once.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(DOCUMENTS_CREATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DOCUMENTS_DEDUPLICATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DOCUMENTS_REJECTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BATCH_ITEMS_FAILED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(HEALTH_CHECK_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(HTTP_REQUEST_DURATION.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record request latency against the matched route template.
pub async fn track_http_metrics(req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().to_string();
    // Unmatched paths share one label to keep cardinality bounded.
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    HTTP_REQUEST_DURATION
        .with_label_values(&[route.as_str(), method.as_str(), response.status().as_str()])
        .observe(started.elapsed().as_secs_f64());
    response
}

/// Record the outcome of a single-document store.
pub fn record_store(is_new: bool) {
    if is_new {
        DOCUMENTS_CREATED.inc();
    } else {
        DOCUMENTS_DEDUPLICATED.inc();
    }
}

/// Record a failed batch item by its error code.
pub fn record_batch_failure(code: &str) {
    BATCH_ITEMS_FAILED.with_label_values(&[code]).inc();
    if code == "invalid_document" {
        DOCUMENTS_REJECTED.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        // Panics if any metric creation failed
        register_metrics();
        register_metrics();
    }

    #[test]
    fn test_record_batch_failure_counts_rejections() {
        let before = DOCUMENTS_REJECTED.get();
        record_batch_failure("invalid_document");
        record_batch_failure("database_error");
        assert!(DOCUMENTS_REJECTED.get() >= before + 1);
        assert!(
            BATCH_ITEMS_FAILED
                .with_label_values(&["database_error"])
                .get()
                >= 1
        );
    }
}
