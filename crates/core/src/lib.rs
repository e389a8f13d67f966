//! Core domain types and shared logic for the Vellum JSON document store.
//!
//! This crate defines the data model used across all other crates:
//! - Canonical JSON encoding and content fingerprints
//! - Documents and the validated form handed to storage engines
//! - Batch results and store aggregates
//! - Deadlines and configuration

pub mod batch;
pub mod canonical;
pub mod config;
pub mod deadline;
pub mod document;
pub mod error;
pub mod hash;
pub mod stats;

pub use batch::{
    BatchFailure, BatchGetResult, BatchItem, BatchItemResult, BatchStoreResult, ItemOutcome,
};
pub use deadline::{Deadline, DeadlineExceeded};
pub use document::{Document, Metadata, PreparedDocument, StoreOutcome, now_micros};
pub use error::{Error, Result};
pub use hash::{FINGERPRINT_HEX_LEN, Fingerprint};
pub use stats::{BackendMetrics, DailyCount, DocumentStats, TableStats};

/// Default cap on items per batch call.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Default maximum document size: 10 MiB
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;
