//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Seconds to wait for in-flight requests on shutdown.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Storage engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DatabaseConfig {
    /// SQLite database file (small deployments and tests).
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL. Takes precedence over individual fields.
        url: Option<String>,
        /// Database host (e.g., "localhost" or "db.example.com").
        host: Option<String>,
        /// Database port (default: 5432).
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        /// Database username.
        username: Option<String>,
        /// Database password.
        /// WARNING: Prefer VELLUM_DATABASE__PASSWORD over storing it in config.
        password: Option<String>,
        /// Database name.
        database: Option<String>,
        /// SSL mode for connections.
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Seconds to wait for a pooled connection before giving up.
        #[serde(default = "default_acquire_timeout_secs")]
        acquire_timeout_secs: u64,
        /// Statement timeout in milliseconds, enforced by the server.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_max_connections() -> u32 {
    25
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(30_000)
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/vellum.db"),
        }
    }
}

impl DatabaseConfig {
    /// Validate database configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            DatabaseConfig::Sqlite { path } => {
                if path.as_os_str().is_empty() {
                    return Err("sqlite config requires a non-empty 'path'".to_string());
                }
                Ok(())
            }
            DatabaseConfig::Postgres {
                url,
                host,
                database,
                max_connections,
                ..
            } => {
                if *max_connections == 0 {
                    return Err("postgres max_connections must be at least 1".to_string());
                }
                match (url.as_ref(), host.as_ref(), database.as_ref()) {
                    (Some(_), _, _) => Ok(()),
                    (None, Some(_), Some(_)) => Ok(()),
                    (None, None, _) => Err(
                        "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                    ),
                    (None, Some(_), None) => Err(
                        "postgres config requires 'database' when using individual fields"
                            .to_string(),
                    ),
                }
            }
        }
    }

    /// Short backend name used in logs and metrics.
    pub fn backend_name(&self) -> &'static str {
        match self {
            DatabaseConfig::Sqlite { .. } => "sqlite",
            DatabaseConfig::Postgres { .. } => "postgres",
        }
    }
}

/// Request limits applied by the document store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of items in one batch call.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Maximum size of a single document in bytes.
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: usize,
    /// Per-request deadline in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Deadline for health probes in milliseconds.
    #[serde(default = "default_health_probe_timeout_ms")]
    pub health_probe_timeout_ms: u64,
}

fn default_max_batch_size() -> usize {
    crate::DEFAULT_MAX_BATCH_SIZE
}

fn default_max_document_bytes() -> usize {
    crate::DEFAULT_MAX_DOCUMENT_BYTES
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_health_probe_timeout_ms() -> u64 {
    2_000
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_document_bytes: default_max_document_bytes(),
            request_timeout_ms: default_request_timeout_ms(),
            health_probe_timeout_ms: default_health_probe_timeout_ms(),
        }
    }
}

impl LimitsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn health_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.health_probe_timeout_ms)
    }

    /// Validate limits; zero values would reject every request.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_batch_size == 0 {
            return Err("limits.max_batch_size cannot be 0".to_string());
        }
        if self.max_document_bytes == 0 {
            return Err("limits.max_document_bytes cannot be 0".to_string());
        }
        if self.request_timeout_ms == 0 {
            return Err("limits.request_timeout_ms cannot be 0".to_string());
        }
        if self.health_probe_timeout_ms == 0 {
            return Err("limits.health_probe_timeout_ms cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration. `RUST_LOG` overrides `level` when set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Basic auth credentials guarding the stats and metrics endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminConfig {
    pub username: String,
    /// WARNING: Prefer VELLUM_ADMIN__PASSWORD over storing it in config.
    pub password: String,
}

impl AdminConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err("admin config requires non-empty 'username' and 'password'".to_string());
        }
        if self.username.contains(':') {
            return Err("admin username cannot contain ':'".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Admin credentials (optional). Without them the admin endpoints are open.
    pub admin: Option<AdminConfig>,
}

impl AppConfig {
    /// Validate every section.
    pub fn validate(&self) -> crate::Result<()> {
        self.database.validate().map_err(crate::Error::Config)?;
        self.limits.validate().map_err(crate::Error::Config)?;
        if let Some(admin) = &self.admin {
            admin.validate().map_err(crate::Error::Config)?;
        }
        Ok(())
    }

    /// Create a test configuration backed by the given SQLite file.
    ///
    /// **For testing only.**
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            database: DatabaseConfig::Sqlite { path: path.into() },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_defaults() {
        let limits = LimitsConfig::default();
        assert_eq!(limits.max_batch_size, 100);
        assert_eq!(limits.max_document_bytes, 10 * 1024 * 1024);
        assert_eq!(limits.request_timeout(), Duration::from_secs(30));
        assert_eq!(limits.health_probe_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_database_config_defaults_to_sqlite() {
        let config = AppConfig::default();
        assert_eq!(config.database.backend_name(), "sqlite");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_postgres_config_deserialize_with_defaults() {
        let json = r#"{"type":"postgres","url":"postgres://localhost/vellum"}"#;
        let config: DatabaseConfig = serde_json::from_str(json).unwrap();

        match config {
            DatabaseConfig::Postgres {
                port,
                max_connections,
                acquire_timeout_secs,
                statement_timeout_ms,
                ssl_mode,
                ..
            } => {
                assert_eq!(port, Some(5432));
                assert_eq!(max_connections, 25);
                assert_eq!(acquire_timeout_secs, 5);
                assert_eq!(statement_timeout_ms, Some(30_000));
                assert!(ssl_mode.is_none());
            }
            _ => panic!("expected postgres config"),
        }
    }

    #[test]
    fn test_postgres_config_requires_url_or_host_and_database() {
        let missing_all = DatabaseConfig::Postgres {
            url: None,
            host: None,
            port: None,
            username: None,
            password: None,
            database: None,
            ssl_mode: None,
            max_connections: 10,
            acquire_timeout_secs: 5,
            statement_timeout_ms: None,
        };
        assert!(missing_all.validate().is_err());

        let missing_db = DatabaseConfig::Postgres {
            url: None,
            host: Some("localhost".to_string()),
            port: Some(5432),
            username: None,
            password: None,
            database: None,
            ssl_mode: None,
            max_connections: 10,
            acquire_timeout_secs: 5,
            statement_timeout_ms: None,
        };
        assert!(missing_db.validate().is_err());

        let fields = DatabaseConfig::Postgres {
            url: None,
            host: Some("localhost".to_string()),
            port: Some(5432),
            username: Some("vellum".to_string()),
            password: None,
            database: Some("vellum".to_string()),
            ssl_mode: Some(PgSslMode::Require),
            max_connections: 10,
            acquire_timeout_secs: 5,
            statement_timeout_ms: None,
        };
        assert!(fields.validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = AppConfig::default();
        config.limits.max_batch_size = 0;
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let mut config = AppConfig::default();
        config.limits.request_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));

        let mut config = AppConfig::default();
        config.limits.health_probe_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_admin_config_validation() {
        let mut config = AppConfig::default();
        config.admin = Some(AdminConfig {
            username: "ad:min".to_string(),
            password: "secret".to_string(),
        });
        assert!(config.validate().is_err());

        config.admin = Some(AdminConfig {
            username: "admin".to_string(),
            password: "secret".to_string(),
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_format_deserialize() {
        let config: LoggingConfig = serde_json::from_str(r#"{"format":"json"}"#).unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "info");
    }
}
