//! Storage engines and the document store facade for Vellum.
//!
//! This crate provides the persistence layer:
//! - The `StorageEngine` trait composed from repository traits
//! - SQLite and PostgreSQL engines with identical observable behavior
//! - Batch store and lookup with per-item failure reporting
//! - The `DocumentStore` facade used by request handlers

pub mod batch;
pub mod error;
pub mod facade;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod store;

pub use batch::BatchLimits;
pub use error::{StoreError, StoreResult};
pub use facade::{DocumentStore, StoreOptions};
pub use postgres::{PgPoolSettings, PostgresStore};
pub use repos::{BatchScope, DocumentRepo, StatsRepo};
pub use store::{SqliteStore, StorageEngine};

use std::sync::Arc;
use std::time::Duration;
use vellum_core::config::DatabaseConfig;

/// Create a storage engine from configuration. Connects and migrates.
pub async fn from_config(config: &DatabaseConfig) -> StoreResult<Arc<dyn StorageEngine>> {
    config.validate().map_err(StoreError::Config)?;

    match config {
        DatabaseConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn StorageEngine>)
        }
        DatabaseConfig::Postgres {
            url,
            host,
            port,
            username,
            password,
            database,
            ssl_mode,
            max_connections,
            acquire_timeout_secs,
            statement_timeout_ms,
        } => {
            let settings = PgPoolSettings {
                max_connections: *max_connections,
                acquire_timeout: Duration::from_secs(*acquire_timeout_secs),
                statement_timeout_ms: *statement_timeout_ms,
            };
            let store = if let Some(url) = url {
                // URL takes precedence over individual fields
                tracing::info!("Connecting to PostgreSQL using connection URL");
                PostgresStore::from_url(url, settings).await?
            } else if let (Some(host), Some(database)) = (host.as_ref(), database.as_ref()) {
                PostgresStore::from_params(
                    host,
                    port.unwrap_or(5432),
                    username.as_deref(),
                    password.as_deref(),
                    database,
                    *ssl_mode,
                    settings,
                )
                .await?
            } else {
                return Err(StoreError::Config(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                ));
            };
            Ok(Arc::new(store) as Arc<dyn StorageEngine>)
        }
    }
}
