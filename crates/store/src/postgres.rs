//! PostgreSQL-based storage engine.

use crate::error::{StoreError, StoreResult, is_unique_violation};
use crate::models::{DOCUMENT_COLUMNS, DOCUMENTS_TABLE, DocumentRow};
use crate::repos::{BatchScope, DocumentRepo, StatsRepo};
use crate::store::{StorageEngine, daily_window_start};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::types::Json;
use sqlx::{PgConnection, Pool, Postgres, Transaction};
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;
use vellum_core::config::PgSslMode;
use vellum_core::{
    BackendMetrics, DailyCount, Document, DocumentStats, Fingerprint, PreparedDocument,
    StoreOutcome, TableStats, now_micros,
};

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

/// Advisory lock key serializing concurrent migrations ("vellum" in ASCII).
const MIGRATION_LOCK_KEY: i64 = 0x7665_6c6c_756d;

/// Queries running longer than this count as slow in metrics.
const SLOW_QUERY_THRESHOLD: &str = "1 second";

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// Connection pool sizing shared by both constructors.
#[derive(Debug, Clone, Copy)]
pub struct PgPoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Server-side statement timeout in milliseconds.
    pub statement_timeout_ms: Option<u64>,
}

impl Default for PgPoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 25,
            acquire_timeout: Duration::from_secs(5),
            statement_timeout_ms: Some(30_000),
        }
    }
}

/// PostgreSQL-based storage engine.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(url: &str, settings: PgPoolSettings) -> StoreResult<Self> {
        let opts = PgConnectOptions::from_str(url).map_err(|e| StoreError::Config(e.to_string()))?;
        Self::connect(opts, settings).await
    }

    /// Create a new PostgreSQL store from individual connection parameters.
    ///
    /// This allows credentials to be passed separately, e.g. the password via
    /// an environment variable.
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        settings: PgPoolSettings,
    ) -> StoreResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        if let Some(mode) = ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        // Log connection info without password
        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, settings).await
    }

    async fn connect(mut opts: PgConnectOptions, settings: PgPoolSettings) -> StoreResult<Self> {
        if let Some(timeout_ms) = settings.statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{timeout_ms}ms"))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl StorageEngine for PostgresStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn migrate(&self) -> StoreResult<()> {
        let migration_err = |e: sqlx::Error| StoreError::Migration(e.to_string());

        let mut tx = self.pool.begin().await.map_err(migration_err)?;
        // Held until commit; concurrent starters wait here instead of racing DDL.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(migration_err)?;

        // PostgreSQL doesn't allow multiple statements in a single prepared statement,
        // so we split the schema and execute each statement separately.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(migration_err)?;
        }

        tx.commit().await.map_err(migration_err)?;
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
    conn: &mut PgConnection,
    content_hash: &str,
) -> StoreResult<Option<DocumentRow>> {
    let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM {DOCUMENTS_TABLE} WHERE content_hash = $1");
    let row = sqlx::query_as::<_, DocumentRow>(&sql)
        .bind(content_hash)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

/// Probe for the fingerprint, then insert.
///
/// Returns `None` when the insert lost a race to a concurrent writer; the
/// caller looks the winner up once the failed statement is cleared.
async fn probe_then_insert(
    conn: &mut PgConnection,
    doc: &PreparedDocument,
) -> StoreResult<Option<StoreOutcome>> {
    let content_hash = doc.content_hash();

    if let Some(row) = fetch_by_hash(&mut *conn, &content_hash).await? {
        tracing::debug!(id = %row.id, hash = %content_hash, "Document already exists");
        return Ok(Some(StoreOutcome::Existing(row.into())));
    }

    let now = now_micros();
    let sql = format!(
        r#"
        INSERT INTO {DOCUMENTS_TABLE}
            (id, content_hash, raw_content, json_data, size, metadata, created_at, updated_at)
        VALUES ($1, $2, $3, $4::jsonb, $5, $6, $7, $8)
        RETURNING {DOCUMENT_COLUMNS}
        "#
    );

    let result = sqlx::query_as::<_, DocumentRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(&content_hash)
        .bind(&doc.raw)
        .bind(doc.canonical_str())
        .bind(doc.size())
        .bind(doc.metadata.as_ref().map(Json))
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await;

    match result {
        Ok(row) => {
            tracing::debug!(id = %row.id, hash = %content_hash, size = row.size, "Document created");
            Ok(Some(StoreOutcome::Created(row.into())))
        }
        Err(e) if is_unique_violation(&e) => {
            tracing::debug!(hash = %content_hash, "Lost insert race, using existing document");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

async fn fetch_race_winner(
    conn: &mut PgConnection,
    content_hash: &str,
) -> StoreResult<StoreOutcome> {
    let row = fetch_by_hash(conn, content_hash).await?.ok_or_else(|| {
        StoreError::Internal(format!(
            "unique violation on content_hash {content_hash} but no row found"
        ))
    })?;
    Ok(StoreOutcome::Existing(row.into()))
}

/// Batch transaction. Each item runs in its own savepoint, because a failed
/// statement aborts the whole PostgreSQL transaction otherwise.
struct PgBatch {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BatchScope for PgBatch {
    async fn store_document(&mut self, doc: &PreparedDocument) -> StoreResult<StoreOutcome> {
        let mut savepoint = sqlx::Connection::begin(&mut *self.tx).await?;

        match probe_then_insert(&mut savepoint, doc).await {
            Ok(Some(outcome)) => {
                savepoint.commit().await?;
                Ok(outcome)
            }
            Ok(None) => {
                savepoint.rollback().await?;
                fetch_race_winner(&mut self.tx, &doc.content_hash()).await
            }
            Err(err) => {
                if let Err(rollback_err) = savepoint.rollback().await {
                    tracing::warn!(error = %rollback_err, "Failed to roll back batch savepoint");
                }
                Err(err)
            }
        }
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentRepo for PostgresStore {
    async fn store_document(&self, doc: &PreparedDocument) -> StoreResult<StoreOutcome> {
        let mut conn = self.pool.acquire().await?;
        match probe_then_insert(&mut conn, doc).await? {
            Some(outcome) => Ok(outcome),
            None => fetch_race_winner(&mut conn, &doc.content_hash()).await,
        }
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Document> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM {DOCUMENTS_TABLE} WHERE id = $1");
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

        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM {DOCUMENTS_TABLE} WHERE id = ANY($1) ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Document::from).collect())
    }

    async fn begin_batch(&self) -> StoreResult<Box<dyn BatchScope>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgBatch { tx }))
    }
}

#[async_trait]
impl StatsRepo for PostgresStore {
    async fn stats(&self) -> StoreResult<DocumentStats> {
        let (total, total_size, max_size, min_size, unique, last_updated): (
            i64,
            i64,
            i64,
            i64,
            i64,
            Option<OffsetDateTime>,
        ) = sqlx::query_as(
            r#"
            SELECT COUNT(*)::BIGINT,
                   COALESCE(SUM(size), 0)::BIGINT,
                   COALESCE(MAX(size), 0)::BIGINT,
                   COALESCE(MIN(size), 0)::BIGINT,
                   COUNT(DISTINCT content_hash)::BIGINT,
                   MAX(created_at)
            FROM json_documents
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let since = daily_window_start(now_micros());
        let daily: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT to_char(created_at AT TIME ZONE 'UTC', 'YYYY-MM-DD') AS day,
                   COUNT(*)::BIGINT,
                   COALESCE(SUM(size), 0)::BIGINT
            FROM json_documents
            WHERE created_at >= $1
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
        let database_size: i64 =
            sqlx::query_scalar("SELECT pg_database_size(current_database())::BIGINT")
                .fetch_one(&self.pool)
                .await?;

        let cache_hit_ratio: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT CASE
                WHEN COALESCE(SUM(heap_blks_hit) + SUM(heap_blks_read), 0) = 0 THEN NULL
                ELSE (SUM(heap_blks_hit)::FLOAT8
                      / (SUM(heap_blks_hit) + SUM(heap_blks_read))::FLOAT8)
            END
            FROM pg_statio_user_tables
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let slow_queries: i64 = sqlx::query_scalar(&format!(
            r#"
            SELECT COUNT(*)::BIGINT FROM pg_stat_activity
            WHERE datname = current_database()
              AND state = 'active'
              AND now() - query_start > interval '{SLOW_QUERY_THRESHOLD}'
            "#
        ))
        .fetch_one(&self.pool)
        .await?;

        let tables: Vec<(String, i64, i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT relname::TEXT,
                   n_live_tup::BIGINT,
                   pg_relation_size(relid)::BIGINT,
                   pg_indexes_size(relid)::BIGINT,
                   pg_total_relation_size(relid)::BIGINT
            FROM pg_stat_user_tables
            ORDER BY relname
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let pool_size = self.pool.size();
        let idle = u32::try_from(self.pool.num_idle()).unwrap_or(pool_size);

        Ok(BackendMetrics {
            backend: self.backend().to_string(),
            pool_size,
            idle_connections: idle,
            active_connections: pool_size.saturating_sub(idle),
            max_connections: self.pool.options().get_max_connections(),
            cache_hit_ratio,
            slow_queries,
            database_size,
            tables: tables
                .into_iter()
                .map(|(name, rows, size, index_size, total_size)| TableStats {
                    name,
                    rows,
                    size,
                    index_size,
                    total_size,
                })
                .collect(),
            timestamp: now_micros(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::postgres_schema_statements;

    #[test]
    fn postgres_schema_statements_skips_empty_and_comment_only() {
        let schema = r#"
            -- comment only

            CREATE TABLE foo (id int);
            ;
            -- another comment
            CREATE TABLE bar (id int);
        "#;

        let statements = postgres_schema_statements(schema);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("CREATE TABLE foo"));
        assert!(statements[1].contains("CREATE TABLE bar"));
    }

    #[test]
    fn embedded_schema_has_table_and_indexes() {
        let statements = postgres_schema_statements(super::POSTGRES_SCHEMA);
        assert_eq!(statements.len(), 3);
        assert!(statements[0].contains("json_documents_content_hash_key UNIQUE"));
        assert!(statements[1].contains("USING GIN"));
    }
}
