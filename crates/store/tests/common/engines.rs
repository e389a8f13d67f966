//! Storage engine test utilities.

#![allow(dead_code)]

use std::sync::Arc;
use tempfile::TempDir;
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use vellum_store::{
    DocumentStore, PgPoolSettings, PostgresStore, SqliteStore, StorageEngine, StoreError,
    StoreOptions, StoreResult,
};

/// Stable prefix for Docker/container startup failures in Postgres test setup.
/// Tests use this marker to decide whether to skip due to unavailable Docker.
pub const POSTGRES_CONTAINER_START_ERR_PREFIX: &str = "postgres-container-start:";

/// A SQLite engine in a temporary directory that is removed on drop.
pub struct TestStore {
    pub sqlite_store: Arc<SqliteStore>,
    _temp_dir: TempDir,
}

impl TestStore {
    pub async fn new() -> StoreResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let store = SqliteStore::new(temp_dir.path().join("test.db")).await?;

        Ok(Self {
            sqlite_store: Arc::new(store),
            _temp_dir: temp_dir,
        })
    }

    pub fn engine(&self) -> Arc<dyn StorageEngine> {
        self.sqlite_store.clone()
    }
}

/// PostgreSQL engine backed by a testcontainer that stops on drop.
pub struct PostgresTestStore {
    pub postgres_store: Arc<PostgresStore>,
    pub url: String,
    _container: ContainerAsync<Postgres>,
}

impl PostgresTestStore {
    pub async fn new() -> StoreResult<Self> {
        let container = Postgres::default()
            .with_tag("15-alpine")
            .start()
            .await
            .map_err(|e| {
                StoreError::Internal(format!(
                    "{} Failed to start PostgreSQL container: {e}",
                    POSTGRES_CONTAINER_START_ERR_PREFIX
                ))
            })?;

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("Failed to get port");

        // Default credentials from testcontainers-modules postgres
        let url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

        let settings = PgPoolSettings {
            max_connections: 8,
            ..PgPoolSettings::default()
        };
        let store = PostgresStore::from_url(&url, settings).await?;

        Ok(Self {
            postgres_store: Arc::new(store),
            url,
            _container: container,
        })
    }

    pub fn engine(&self) -> Arc<dyn StorageEngine> {
        self.postgres_store.clone()
    }
}

/// Try to create a PostgreSQL test store, skipping if Docker is unavailable
/// or SKIP_POSTGRES_TESTS is set.
///
/// Only container-start failures cause a skip; schema or connection errors
/// still panic so real regressions are not silently swallowed.
pub async fn postgres_or_skip() -> Option<PostgresTestStore> {
    if std::env::var("SKIP_POSTGRES_TESTS").is_ok() {
        return None;
    }
    match PostgresTestStore::new().await {
        Ok(store) => Some(store),
        Err(err) => {
            let msg = err.to_string();
            if msg.contains(POSTGRES_CONTAINER_START_ERR_PREFIX) {
                eprintln!("Skipping PostgreSQL test (Docker unavailable): {msg}");
                None
            } else {
                panic!("PostgreSQL test setup failed: {msg}");
            }
        }
    }
}

/// Wrap an engine in a facade with default options.
pub fn facade(engine: Arc<dyn StorageEngine>) -> DocumentStore {
    DocumentStore::new(engine, StoreOptions::default())
}

/// Run a test against both SQLite and PostgreSQL backends.
pub async fn run_store_test_both<F, Fut>(test_fn: F)
where
    F: Fn(Arc<dyn StorageEngine>) -> Fut + Clone,
    Fut: std::future::Future<Output = ()>,
{
    let sqlite = TestStore::new()
        .await
        .expect("Failed to create SQLite test store");
    test_fn.clone()(sqlite.engine()).await;

    if let Some(postgres) = postgres_or_skip().await {
        test_fn(postgres.engine()).await;
    }
}
