//! Batch request items and per-index results.

use crate::document::{Document, Metadata, StoreOutcome};
use serde::{Deserialize, Serialize};

/// One document submitted as part of a batch.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub content: Vec<u8>,
    pub metadata: Option<Metadata>,
}

impl BatchItem {
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: content.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Whether a successful item inserted a row or matched an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemOutcome {
    Created,
    Existing,
}

/// Successful item of a batch store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItemResult {
    pub index: usize,
    pub outcome: ItemOutcome,
    pub document: Document,
}

impl BatchItemResult {
    pub fn from_outcome(index: usize, outcome: StoreOutcome) -> Self {
        let kind = if outcome.is_new() {
            ItemOutcome::Created
        } else {
            ItemOutcome::Existing
        };
        Self {
            index,
            outcome: kind,
            document: outcome.into_document(),
        }
    }

    pub fn is_new(&self) -> bool {
        self.outcome == ItemOutcome::Created
    }
}

/// Failed item of a batch call, keyed by its input position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub index: usize,
    /// Stable machine-readable error code (e.g. "invalid_document").
    pub code: String,
    pub message: String,
}

/// Result of a batch store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStoreResult {
    pub total_count: usize,
    pub success_count: usize,
    pub created_count: usize,
    pub existing_count: usize,
    pub failure_count: usize,
    pub results: Vec<BatchItemResult>,
    pub failures: Vec<BatchFailure>,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: std::time::Duration,
}

impl BatchStoreResult {
    pub fn new(total_count: usize) -> Self {
        Self {
            total_count,
            ..Self::default()
        }
    }

    pub fn push_success(&mut self, item: BatchItemResult) {
        match item.outcome {
            ItemOutcome::Created => self.created_count += 1,
            ItemOutcome::Existing => self.existing_count += 1,
        }
        self.success_count += 1;
        self.results.push(item);
    }

    pub fn push_failure(&mut self, failure: BatchFailure) {
        self.failure_count += 1;
        self.failures.push(failure);
    }
}

/// Result of a batch lookup.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchGetResult {
    /// Request indices that resolved to a document.
    pub success_count: usize,
    pub failure_count: usize,
    pub documents: Vec<Document>,
    pub failures: Vec<BatchFailure>,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: std::time::Duration,
}

fn serialize_millis<S: serde::Serializer>(
    duration: &std::time::Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis().try_into().unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::now_micros;
    use uuid::Uuid;

    fn doc() -> Document {
        let now = now_micros();
        Document {
            id: Uuid::new_v4(),
            content_hash: "0".repeat(64),
            content: b"{}".to_vec(),
            size: 2,
            created_at: now,
            updated_at: now,
            metadata: None,
        }
    }

    #[test]
    fn test_store_result_counts_outcomes() {
        let mut result = BatchStoreResult::new(3);
        result.push_success(BatchItemResult::from_outcome(0, StoreOutcome::Created(doc())));
        result.push_success(BatchItemResult::from_outcome(1, StoreOutcome::Existing(doc())));
        result.push_failure(BatchFailure {
            index: 2,
            code: "invalid_document".to_string(),
            message: "bad".to_string(),
        });

        assert_eq!(result.success_count, 2);
        assert_eq!(result.created_count, 1);
        assert_eq!(result.existing_count, 1);
        assert_eq!(result.failure_count, 1);
        assert_eq!(
            result.success_count + result.failure_count,
            result.total_count
        );
    }

    #[test]
    fn test_store_result_serializes_duration_as_millis() {
        let mut result = BatchStoreResult::new(0);
        result.duration = std::time::Duration::from_millis(1500);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["duration_ms"], 1500);
        assert!(json.get("duration").is_none());
    }

    #[test]
    fn test_item_outcome_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ItemOutcome::Existing).unwrap(),
            "\"existing\""
        );
    }
}
