//! Read-only aggregates reported by storage engines.

use serde::Serialize;
use time::OffsetDateTime;

/// Number of trailing days covered by [`DocumentStats::daily_counts`].
pub const DAILY_WINDOW_DAYS: i64 = 7;

/// Document totals across the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentStats {
    pub total_documents: i64,
    #[serde(rename = "total_size_bytes")]
    pub total_size: i64,
    #[serde(rename = "average_size_bytes")]
    pub average_size: f64,
    #[serde(rename = "max_size_bytes")]
    pub max_size: i64,
    #[serde(rename = "min_size_bytes")]
    pub min_size: i64,
    pub unique_hashes: i64,
    /// Creation time of the newest document, `None` for an empty store.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_updated: Option<OffsetDateTime>,
    /// Per-day counts for the trailing window, newest first.
    pub daily_counts: Vec<DailyCount>,
}

impl DocumentStats {
    /// Assemble stats from raw aggregates, deriving the average.
    pub fn from_totals(
        total_documents: i64,
        total_size: i64,
        max_size: i64,
        min_size: i64,
        unique_hashes: i64,
        last_updated: Option<OffsetDateTime>,
        daily_counts: Vec<DailyCount>,
    ) -> Self {
        let average_size = if total_documents > 0 {
            total_size as f64 / total_documents as f64
        } else {
            0.0
        };
        Self {
            total_documents,
            total_size,
            average_size,
            max_size,
            min_size,
            unique_hashes,
            last_updated,
            daily_counts,
        }
    }
}

/// Documents created on one UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    /// `YYYY-MM-DD`.
    pub date: String,
    pub count: i64,
    #[serde(rename = "size_bytes")]
    pub size: i64,
}

/// Backend health and pool figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendMetrics {
    pub backend: String,
    pub pool_size: u32,
    pub idle_connections: u32,
    pub active_connections: u32,
    pub max_connections: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_hit_ratio: Option<f64>,
    pub slow_queries: i64,
    #[serde(rename = "database_size_bytes")]
    pub database_size: i64,
    pub tables: Vec<TableStats>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub name: String,
    pub rows: i64,
    #[serde(rename = "size_bytes")]
    pub size: i64,
    #[serde(rename = "index_size_bytes")]
    pub index_size: i64,
    #[serde(rename = "total_size_bytes")]
    pub total_size: i64,
}
