//! Batch store and lookup with per-item failure reporting.
//!
//! A batch store runs inside one backend transaction. Validation and backend
//! errors of individual items are recorded at their index and never abort the
//! rest of the batch; only a failure to open or commit the transaction fails
//! the whole call.

use crate::error::{StoreError, StoreResult};
use crate::store::StorageEngine;
use std::collections::HashSet;
use std::time::Instant;
use uuid::Uuid;
use vellum_core::{
    BatchFailure, BatchGetResult, BatchItem, BatchItemResult, BatchStoreResult, PreparedDocument,
};

/// Size limits applied to batch calls.
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    pub max_batch_size: usize,
    pub max_document_bytes: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_batch_size: vellum_core::DEFAULT_MAX_BATCH_SIZE,
            max_document_bytes: vellum_core::DEFAULT_MAX_DOCUMENT_BYTES,
        }
    }
}

fn check_batch_len(len: usize, limits: &BatchLimits) -> StoreResult<()> {
    if len == 0 {
        return Err(StoreError::InvalidDocument("batch is empty".to_string()));
    }
    if len > limits.max_batch_size {
        return Err(StoreError::InvalidDocument(format!(
            "batch has {len} items, limit is {}",
            limits.max_batch_size
        )));
    }
    Ok(())
}

fn failure(index: usize, err: &StoreError) -> BatchFailure {
    BatchFailure {
        index,
        code: err.code().to_string(),
        message: err.to_string(),
    }
}

/// Store every item in one transaction, recording per-item outcomes.
pub async fn store_batch(
    engine: &dyn StorageEngine,
    items: Vec<BatchItem>,
    limits: &BatchLimits,
) -> StoreResult<BatchStoreResult> {
    check_batch_len(items.len(), limits)?;

    let started = Instant::now();
    let mut result = BatchStoreResult::new(items.len());
    let mut scope = engine.begin_batch().await?;

    for (index, item) in items.into_iter().enumerate() {
        let prepared =
            match PreparedDocument::prepare(&item.content, item.metadata, limits.max_document_bytes)
            {
                Ok(prepared) => prepared,
                Err(e) => {
                    let err = StoreError::from(e);
                    tracing::debug!(index, error = %err, "Batch item rejected");
                    result.push_failure(failure(index, &err));
                    continue;
                }
            };

        match scope.store_document(&prepared).await {
            Ok(outcome) => result.push_success(BatchItemResult::from_outcome(index, outcome)),
            Err(err) => {
                tracing::warn!(index, error = %err, "Batch item failed");
                result.push_failure(failure(index, &err));
            }
        }
    }

    scope.commit().await?;

    result.duration = started.elapsed();
    tracing::info!(
        total = result.total_count,
        created = result.created_count,
        existing = result.existing_count,
        failed = result.failure_count,
        duration_ms = result.duration.as_millis() as u64,
        "Batch store completed"
    );
    Ok(result)
}

/// Look up every id, recording unknown or malformed ids as failures.
pub async fn get_batch(
    engine: &dyn StorageEngine,
    ids: &[String],
    limits: &BatchLimits,
) -> StoreResult<BatchGetResult> {
    check_batch_len(ids.len(), limits)?;

    let started = Instant::now();
    let mut result = BatchGetResult::default();
    let mut parsed: Vec<(usize, Uuid)> = Vec::with_capacity(ids.len());

    for (index, raw) in ids.iter().enumerate() {
        match Uuid::parse_str(raw.trim()) {
            Ok(id) => parsed.push((index, id)),
            Err(_) => {
                let err = StoreError::NotFound(format!("document {raw}"));
                result.failures.push(failure(index, &err));
            }
        }
    }

    let mut unique: Vec<Uuid> = parsed.iter().map(|(_, id)| *id).collect();
    unique.sort_unstable();
    unique.dedup();

    let documents = engine.get_many(&unique).await?;
    let found: HashSet<Uuid> = documents.iter().map(|d| d.id).collect();

    for (index, id) in parsed {
        if found.contains(&id) {
            result.success_count += 1;
        } else {
            let err = StoreError::NotFound(format!("document {id}"));
            result.failures.push(failure(index, &err));
        }
    }

    result.failures.sort_by_key(|f| f.index);
    result.failure_count = result.failures.len();
    result.documents = documents;
    result.duration = started.elapsed();
    Ok(result)
}
