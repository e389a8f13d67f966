//! Storage engine trait and the SQLite implementation.

use crate::error::{StoreError, StoreResult};
use crate::models::{DOCUMENT_COLUMNS, DOCUMENTS_TABLE, DocumentRow};
use crate::repos::{BatchScope, DocumentRepo, StatsRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::{Pool, Sqlite, SqliteConnection, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;
use vellum_core::stats::DAILY_WINDOW_DAYS;
use vellum_core::{
    BackendMetrics, DailyCount, Document, DocumentStats, Fingerprint, PreparedDocument,
    StoreOutcome, TableStats, now_micros,
};

/// Combined storage engine trait.
///
/// Both backends expose identical observable behavior through this trait;
/// nothing outside the adapters and `from_config` branches on the backend.
#[async_trait]
pub trait StorageEngine: DocumentRepo + StatsRepo + Send + Sync {
    /// Short backend name ("sqlite" or "postgres").
    fn backend(&self) -> &'static str;

    /// Create the schema if missing. Idempotent and never destroys data.
    async fn migrate(&self) -> StoreResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> StoreResult<()>;

    /// Close the connection pool. Later calls fail with `Unavailable`.
    async fn close(&self);
}

/// First day included in the trailing daily window, as UTC midnight.
pub(crate) fn daily_window_start(now: OffsetDateTime) -> OffsetDateTime {
    (now.date() - time::Duration::days(DAILY_WINDOW_DAYS - 1))
        .midnight()
        .assume_utc()
}

/// SQLite-based storage engine.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))
            .map_err(|e| StoreError::Config(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits one writer at a time; a single connection serializes
            // stores instead of failing them with "database is locked".
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::info!(path = %path.display(), "Opened SQLite document store");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl StorageEngine for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

async fn fetch_by_hash(
    conn: &mut SqliteConnection,
    content_hash: &str,
) -> StoreResult<Option<DocumentRow>> {
    let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM {DOCUMENTS_TABLE} WHERE content_hash = ?");
    let row = sqlx::query_as::<_, DocumentRow>(&sql)
        .bind(content_hash)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

/// Insert-or-lookup on one connection, shared by single and batch stores.
async fn store_on(
    conn: &mut SqliteConnection,
    doc: &PreparedDocument,
) -> StoreResult<StoreOutcome> {
    let content_hash = doc.content_hash();
    let now = now_micros();
    let sql = format!(
        r#"
        INSERT INTO {DOCUMENTS_TABLE}
            (id, content_hash, raw_content, json_data, size, metadata, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(content_hash) DO NOTHING
        RETURNING {DOCUMENT_COLUMNS}
        "#
    );

    let inserted = sqlx::query_as::<_, DocumentRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(&content_hash)
        .bind(&doc.raw)
        .bind(doc.canonical_str())
        .bind(doc.size())
        .bind(doc.metadata.as_ref().map(Json))
        .bind(now)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

    if let Some(row) = inserted {
        tracing::debug!(id = %row.id, hash = %content_hash, size = row.size, "Document created");
        return Ok(StoreOutcome::Created(row.into()));
    }

    let existing = fetch_by_hash(&mut *conn, &content_hash)
        .await?
        .ok_or_else(|| {
            StoreError::Internal(format!(
                "conflict on content_hash {content_hash} but no row found"
            ))
        })?;
    tracing::debug!(id = %existing.id, hash = %content_hash, "Document already exists");
    Ok(StoreOutcome::Existing(existing.into()))
}

/// Batch transaction on the single SQLite connection.
///
/// SQLite aborts only the failing statement, so items need no savepoints.
struct SqliteBatch {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl BatchScope for SqliteBatch {
    async fn store_document(&mut self, doc: &PreparedDocument) -> StoreResult<StoreOutcome> {
        store_on(&mut self.tx, doc).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentRepo for SqliteStore {
    async fn store_document(&self, doc: &PreparedDocument) -> StoreResult<StoreOutcome> {
        let mut conn = self.pool.acquire().await?;
        store_on(&mut conn, doc).await
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Document> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM {DOCUMENTS_TABLE} WHERE id = ?");
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Document::from)
            .ok_or_else(|| StoreError::NotFound(format!("document {id}")))
    }

    async fn get_by_hash(&self, hash: &Fingerprint) -> StoreResult<Document> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_hash(&mut conn, &hash.to_hex())
            .await?
            .map(Document::from)
            .ok_or_else(|| StoreError::NotFound(format!("document with hash {hash}")))
    }

    async fn get_many(&self, ids: &[Uuid]) -> StoreResult<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // SQLite has a limit of ~999 parameters, so we batch if needed
        const BATCH_SIZE: usize = 900;
        let mut rows = Vec::with_capacity(ids.len());

        for batch in ids.chunks(BATCH_SIZE) {
            let placeholders: Vec<&str> = batch.iter().map(|_| "?").collect();
            let sql = format!(
                "SELECT {DOCUMENT_COLUMNS} FROM {DOCUMENTS_TABLE} WHERE id IN ({})",
                placeholders.join(", ")
            );

            let mut query = sqlx::query_as::<_, DocumentRow>(&sql);
            for id in batch {
                query = query.bind(id);
            }
            rows.extend(query.fetch_all(&self.pool).await?);
        }

        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows.into_iter().map(Document::from).collect())
    }

    async fn begin_batch(&self) -> StoreResult<Box<dyn BatchScope>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteBatch { tx }))
    }
}

#[async_trait]
impl StatsRepo for SqliteStore {
    async fn stats(&self) -> StoreResult<DocumentStats> {
        let (total, total_size, max_size, min_size, unique): (i64, i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT COUNT(*), COALESCE(SUM(size), 0), COALESCE(MAX(size), 0),
                       COALESCE(MIN(size), 0), COUNT(DISTINCT content_hash)
                FROM json_documents
                "#,
            )
            .fetch_one(&self.pool)
            .await?;

        let last_updated: Option<OffsetDateTime> = sqlx::query_scalar(
            "SELECT created_at FROM json_documents ORDER BY created_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let since = daily_window_start(now_micros());
        let daily: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT substr(created_at, 1, 10) AS day, COUNT(*), COALESCE(SUM(size), 0)
            FROM json_documents
            WHERE created_at >= ?
            GROUP BY day
            ORDER BY day DESC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let daily_counts = daily
            .into_iter()
            .map(|(date, count, size)| DailyCount { date, count, size })
            .collect();

        Ok(DocumentStats::from_totals(
            total,
            total_size,
            max_size,
            min_size,
            unique,
            last_updated,
            daily_counts,
        ))
    }

    async fn metrics(&self) -> StoreResult<BackendMetrics> {
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await?;
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await?;
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM json_documents")
            .fetch_one(&self.pool)
            .await?;

        // dbstat is a compile-time option of SQLite; report zero sizes without it.
        let table_size: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(pgsize), 0) FROM dbstat WHERE name = 'json_documents'",
        )
        .fetch_one(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::debug!(error = %e, "dbstat unavailable");
            0
        });
        let index_size: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(pgsize), 0) FROM dbstat
            WHERE name IN (SELECT name FROM sqlite_master
                           WHERE type = 'index' AND tbl_name = 'json_documents')
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .unwrap_or(0);

        let pool_size = self.pool.size();
        let idle = u32::try_from(self.pool.num_idle()).unwrap_or(pool_size);

        Ok(BackendMetrics {
            backend: self.backend().to_string(),
            pool_size,
            idle_connections: idle,
            active_connections: pool_size.saturating_sub(idle),
            max_connections: self.pool.options().get_max_connections(),
            cache_hit_ratio: None,
            slow_queries: 0,
            database_size: page_count * page_size,
            tables: vec![TableStats {
                name: DOCUMENTS_TABLE.to_string(),
                rows,
                size: table_size,
                index_size,
                total_size: table_size + index_size,
            }],
            timestamp: now_micros(),
        })
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS json_documents (
    id BLOB PRIMARY KEY,
    content_hash TEXT NOT NULL UNIQUE,
    raw_content BLOB NOT NULL,
    json_data TEXT NOT NULL,
    size INTEGER NOT NULL,
    metadata TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_json_documents_created_at ON json_documents(created_at);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    async fn open() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("docs.db")).await.unwrap();
        (store, dir)
    }

    fn prepared(raw: &str) -> PreparedDocument {
        PreparedDocument::prepare(raw.as_bytes(), None, 1024).unwrap()
    }

    #[test]
    fn test_daily_window_covers_seven_dates() {
        let start = daily_window_start(datetime!(2024-03-10 15:30:00 UTC));
        assert_eq!(start, datetime!(2024-03-04 00:00:00 UTC));
    }

    #[tokio::test]
    async fn test_store_on_conflict_returns_existing() {
        let (store, _dir) = open().await;

        let first = store.store_document(&prepared(r#"{"a":1}"#)).await.unwrap();
        let second = store.store_document(&prepared(r#"{ "a" : 1 }"#)).await.unwrap();

        assert!(first.is_new());
        assert!(!second.is_new());
        assert_eq!(first.document().id, second.document().id);
        assert_eq!(second.document().content, br#"{"a":1}"#.to_vec());
    }

    #[tokio::test]
    async fn test_json_data_holds_canonical_text() {
        let (store, _dir) = open().await;
        let outcome = store
            .store_document(&prepared(r#"{"b": 2, "a": 1}"#))
            .await
            .unwrap();

        let json_data: String = sqlx::query_scalar("SELECT json_data FROM json_documents WHERE id = ?")
            .bind(outcome.document().id)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(json_data, r#"{"a":1,"b":2}"#);
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let (store, _dir) = open().await;
        store.store_document(&prepared("[1]")).await.unwrap();
        store.migrate().await.unwrap();
        store.migrate().await.unwrap();
        assert_eq!(store.stats().await.unwrap().total_documents, 1);
    }

    #[tokio::test]
    async fn test_metrics_reports_table() {
        let (store, _dir) = open().await;
        store.store_document(&prepared("[1]")).await.unwrap();

        let metrics = store.metrics().await.unwrap();
        assert_eq!(metrics.backend, "sqlite");
        assert_eq!(metrics.max_connections, 1);
        assert!(metrics.database_size > 0);
        assert_eq!(metrics.tables.len(), 1);
        assert_eq!(metrics.tables[0].rows, 1);
    }
}
