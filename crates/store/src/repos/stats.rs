//! Aggregate statistics repository.

use crate::error::StoreResult;
use async_trait::async_trait;
use vellum_core::{BackendMetrics, DocumentStats};

/// Read-only aggregates over the document table and the backend.
#[async_trait]
pub trait StatsRepo: Send + Sync {
    /// Document totals plus per-day counts for the trailing week.
    async fn stats(&self) -> StoreResult<DocumentStats>;

    /// Pool figures and backend-reported table sizes.
    async fn metrics(&self) -> StoreResult<BackendMetrics>;
}
