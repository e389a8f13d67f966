//! Document repository.

use crate::error::StoreResult;
use async_trait::async_trait;
use uuid::Uuid;
use vellum_core::{Document, Fingerprint, PreparedDocument, StoreOutcome};

/// Repository for document storage and lookup.
#[async_trait]
pub trait DocumentRepo: Send + Sync {
    /// Store a document unless one with the same fingerprint exists.
    ///
    /// Concurrent stores of equal content converge on a single row: the loser
    /// of an insert race receives the winner as [`StoreOutcome::Existing`].
    /// Metadata of an existing document is never replaced.
    async fn store_document(&self, doc: &PreparedDocument) -> StoreResult<StoreOutcome>;

    /// Get a document by id. Fails with `NotFound` when absent.
    async fn get_by_id(&self, id: Uuid) -> StoreResult<Document>;

    /// Get a document by fingerprint. Fails with `NotFound` when absent.
    async fn get_by_hash(&self, hash: &Fingerprint) -> StoreResult<Document>;

    /// Get every document among `ids` that exists, newest first.
    ///
    /// Missing ids are simply not included in the result.
    async fn get_many(&self, ids: &[Uuid]) -> StoreResult<Vec<Document>>;

    /// Open a transaction for a batch of stores.
    async fn begin_batch(&self) -> StoreResult<Box<dyn BatchScope>>;
}

/// An open batch transaction.
///
/// Dropping a scope without calling [`BatchScope::commit`] rolls back every
/// store made through it.
#[async_trait]
pub trait BatchScope: Send {
    /// Store one document inside the batch.
    ///
    /// An error here affects only this document; the scope stays usable for
    /// the remaining items.
    async fn store_document(&mut self, doc: &PreparedDocument) -> StoreResult<StoreOutcome>;

    /// Commit every successful store made through this scope.
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
