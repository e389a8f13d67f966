//! HTTP API server for the Vellum document store.
//!
//! This crate provides the HTTP surface:
//! - Single, raw and batch document storage
//! - Lookup by id, by fingerprint and in batches
//! - Store statistics and backend metrics (optionally behind Basic auth)
//! - Health, readiness and Prometheus endpoints

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use config::load_config;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
