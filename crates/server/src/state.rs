//! Application state shared across handlers.

use std::sync::Arc;
use std::time::{Duration, Instant};
use vellum_core::Deadline;
use vellum_core::config::AppConfig;
use vellum_store::DocumentStore;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Document store facade.
    pub store: DocumentStore,
    /// Process start, for uptime reporting.
    pub started_at: Instant,
}

impl AppState {
    /// Create a new application state.
    pub fn new(config: AppConfig, store: DocumentStore) -> Self {
        Self {
            config: Arc::new(config),
            store,
            started_at: Instant::now(),
        }
    }

    /// Deadline for a store call made on behalf of one request.
    pub fn request_deadline(&self) -> Deadline {
        Deadline::after(self.config.limits.request_timeout())
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
