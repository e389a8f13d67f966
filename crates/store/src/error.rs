//! Document store error types.

use thiserror::Error;

/// PostgreSQL SQLSTATE for unique_violation.
pub(crate) const PG_UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL SQLSTATE for query_canceled (raised by statement_timeout).
const PG_QUERY_CANCELED: &str = "57014";

/// Document store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("operation timed out")]
    Timeout,

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Stable machine-readable code, used in batch failures and API errors.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidDocument(_) => "invalid_document",
            Self::NotFound(_) => "not_found",
            Self::Unavailable(_) => "unavailable",
            Self::Timeout => "timeout",
            Self::Migration(_) => "migration_failed",
            Self::Database(_) => "database_error",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => Self::Unavailable(err.to_string()),
            sqlx::Error::Database(ref db_err)
                if db_err.code().as_deref() == Some(PG_QUERY_CANCELED) =>
            {
                Self::Timeout
            }
            other => Self::Database(other),
        }
    }
}

impl From<vellum_core::Error> for StoreError {
    fn from(err: vellum_core::Error) -> Self {
        match err {
            vellum_core::Error::InvalidDocument(msg) => Self::InvalidDocument(msg),
            vellum_core::Error::InvalidHash(msg) => Self::InvalidDocument(msg),
            vellum_core::Error::Config(msg) => Self::Config(msg),
        }
    }
}

impl From<vellum_core::DeadlineExceeded> for StoreError {
    fn from(_: vellum_core::DeadlineExceeded) -> Self {
        Self::Timeout
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Whether a database error is a unique constraint violation on either backend.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some(PG_UNIQUE_VIOLATION)
                || db_err.message().contains("UNIQUE constraint")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_unavailable_and_retryable() {
        let err = StoreError::from(sqlx::Error::PoolClosed);
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(err.is_retryable());

        let err = StoreError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn test_row_not_found_is_database_error() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Database(_)));
        assert!(!err.is_retryable());
        assert_eq!(err.code(), "database_error");
    }

    #[test]
    fn test_core_errors_convert() {
        let err = StoreError::from(vellum_core::Error::InvalidDocument("bad".to_string()));
        assert_eq!(err.code(), "invalid_document");
        assert!(!err.is_retryable());
        assert!(StoreError::Timeout.is_retryable());
    }
}
