//! Single entry point used by request handlers.

use crate::batch::{self, BatchLimits};
use crate::error::{StoreError, StoreResult};
use crate::store::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;
use vellum_core::config::LimitsConfig;
use vellum_core::{
    BackendMetrics, BatchGetResult, BatchItem, BatchStoreResult, Deadline, Document,
    DocumentStats, Fingerprint, Metadata, PreparedDocument, StoreOutcome,
};

/// Limits and probe timing for a [`DocumentStore`].
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    pub limits: BatchLimits,
    pub health_probe_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            limits: BatchLimits::default(),
            health_probe_timeout: Duration::from_secs(2),
        }
    }
}

impl From<&LimitsConfig> for StoreOptions {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            limits: BatchLimits {
                max_batch_size: config.max_batch_size,
                max_document_bytes: config.max_document_bytes,
            },
            health_probe_timeout: config.health_probe_timeout(),
        }
    }
}

/// Validates input and forwards every call to the storage engine.
///
/// Holds no state besides the engine handle; nothing is cached.
#[derive(Clone)]
pub struct DocumentStore {
    engine: Arc<dyn StorageEngine>,
    options: StoreOptions,
}

impl DocumentStore {
    pub fn new(engine: Arc<dyn StorageEngine>, options: StoreOptions) -> Self {
        Self { engine, options }
    }

    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn backend(&self) -> &'static str {
        self.engine.backend()
    }

    /// Store one document, returning the new or pre-existing record.
    #[instrument(skip(self, content, metadata), fields(op = "store_one", size = content.len()))]
    pub async fn store_one(
        &self,
        content: &[u8],
        metadata: Option<Metadata>,
        deadline: Deadline,
    ) -> StoreResult<StoreOutcome> {
        let prepared =
            PreparedDocument::prepare(content, metadata, self.options.limits.max_document_bytes)?;
        deadline.run(self.engine.store_document(&prepared)).await?
    }

    #[instrument(skip(self, items), fields(op = "store_batch", items = items.len()))]
    pub async fn store_batch(
        &self,
        items: Vec<BatchItem>,
        deadline: Deadline,
    ) -> StoreResult<BatchStoreResult> {
        deadline
            .run(batch::store_batch(
                self.engine.as_ref(),
                items,
                &self.options.limits,
            ))
            .await?
    }

    /// Get a document by id. Strings that are not UUIDs are `NotFound`.
    #[instrument(skip(self), fields(op = "get_by_id"))]
    pub async fn get_by_id(&self, id: &str, deadline: Deadline) -> StoreResult<Document> {
        let id = Uuid::parse_str(id.trim())
            .map_err(|_| StoreError::NotFound(format!("document {id}")))?;
        deadline.run(self.engine.get_by_id(id)).await?
    }

    /// Get a document by fingerprint. Strings that are not 64 hex chars are `NotFound`.
    #[instrument(skip(self), fields(op = "get_by_hash"))]
    pub async fn get_by_hash(&self, hash: &str, deadline: Deadline) -> StoreResult<Document> {
        let fingerprint = Fingerprint::from_hex(hash.trim())
            .map_err(|_| StoreError::NotFound(format!("document with hash {hash}")))?;
        deadline.run(self.engine.get_by_hash(&fingerprint)).await?
    }

    #[instrument(skip(self, ids), fields(op = "get_batch", ids = ids.len()))]
    pub async fn get_batch(&self, ids: &[String], deadline: Deadline) -> StoreResult<BatchGetResult> {
        deadline
            .run(batch::get_batch(
                self.engine.as_ref(),
                ids,
                &self.options.limits,
            ))
            .await?
    }

    #[instrument(skip(self), fields(op = "stats"))]
    pub async fn stats(&self, deadline: Deadline) -> StoreResult<DocumentStats> {
        deadline.run(self.engine.stats()).await?
    }

    #[instrument(skip(self), fields(op = "metrics"))]
    pub async fn metrics(&self, deadline: Deadline) -> StoreResult<BackendMetrics> {
        deadline.run(self.engine.metrics()).await?
    }

    /// Probe the backend with the configured probe timeout.
    ///
    /// Any failure, including the probe timing out, is reported as `Unavailable`.
    #[instrument(skip(self), fields(op = "health_check"))]
    pub async fn health_check(&self) -> StoreResult<()> {
        let deadline = Deadline::after(self.options.health_probe_timeout);
        match deadline.run(self.engine.health_check()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(StoreError::Unavailable(msg))) => Err(StoreError::Unavailable(msg)),
            Ok(Err(err)) => Err(StoreError::Unavailable(err.to_string())),
            Err(_) => Err(StoreError::Unavailable(format!(
                "health probe exceeded {}ms",
                self.options.health_probe_timeout.as_millis()
            ))),
        }
    }

    #[instrument(skip(self), fields(op = "migrate"))]
    pub async fn migrate(&self) -> StoreResult<()> {
        self.engine.migrate().await
    }

    #[instrument(skip(self), fields(op = "close"))]
    pub async fn close(&self) {
        self.engine.close().await;
    }
}
