//! Database rows mapping to the document schema.

use sqlx::FromRow;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;
use vellum_core::{Document, Metadata};

/// Name of the single document table on both backends.
pub const DOCUMENTS_TABLE: &str = "json_documents";

/// Columns selected for a [`DocumentRow`]. `json_data` is write-only from
/// the application's point of view.
pub(crate) const DOCUMENT_COLUMNS: &str =
    "id, content_hash, raw_content, size, metadata, created_at, updated_at";

/// Stored document record.
#[derive(Debug, Clone, FromRow)]
pub struct DocumentRow {
    pub id: Uuid,
    pub content_hash: String,
    pub raw_content: Vec<u8>,
    pub size: i64,
    pub metadata: Option<Json<Metadata>>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document {
            id: row.id,
            content_hash: row.content_hash,
            content: row.raw_content,
            size: row.size,
            created_at: row.created_at,
            updated_at: row.updated_at,
            metadata: row.metadata.map(|Json(m)| m),
        }
    }
}
