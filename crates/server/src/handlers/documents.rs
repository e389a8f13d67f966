//! Document store and lookup handlers.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use time::OffsetDateTime;
use uuid::Uuid;
use vellum_core::{
    BatchFailure, BatchGetResult, BatchItem, BatchStoreResult, Document, Metadata, StoreOutcome,
};
use vellum_store::StoreError;

const STORED_MESSAGE: &str = "JSON document stored successfully";
const EXISTING_MESSAGE: &str = "JSON document already exists, returning existing ID";

/// Store request envelope. `json_data` is kept as the submitted text.
#[derive(Debug, Deserialize)]
pub struct StoreRequest {
    pub json_data: Box<RawValue>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl StoreRequest {
    fn into_item(self) -> BatchItem {
        BatchItem {
            content: self.json_data.get().as_bytes().to_vec(),
            metadata: self.metadata,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StoreBatchRequest {
    pub documents: Vec<StoreRequest>,
}

#[derive(Debug, Deserialize)]
pub struct BatchGetRequest {
    pub ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct HashQuery {
    pub hash: Option<String>,
}

/// Comma-separated ids, e.g. `?ids=a,b,c`.
#[derive(Debug, Deserialize)]
pub struct IdsQuery {
    pub ids: Option<String>,
}

/// Store response.
#[derive(Debug, Serialize)]
pub struct StoreResponse {
    pub id: Uuid,
    pub content_hash: String,
    pub is_new: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub message: &'static str,
}

impl StoreResponse {
    fn new(doc: &Document, is_new: bool) -> Self {
        Self {
            id: doc.id,
            content_hash: doc.content_hash.clone(),
            is_new,
            created_at: doc.created_at,
            message: if is_new {
                STORED_MESSAGE
            } else {
                EXISTING_MESSAGE
            },
        }
    }
}

impl From<&StoreOutcome> for StoreResponse {
    fn from(outcome: &StoreOutcome) -> Self {
        Self::new(outcome.document(), outcome.is_new())
    }
}

#[derive(Debug, Serialize)]
pub struct StoreBatchItem {
    pub index: usize,
    #[serde(flatten)]
    pub response: StoreResponse,
}

#[derive(Debug, Serialize)]
pub struct StoreBatchResponse {
    pub total_count: usize,
    pub success_count: usize,
    pub created_count: usize,
    pub existing_count: usize,
    pub failure_count: usize,
    pub results: Vec<StoreBatchItem>,
    pub failures: Vec<BatchFailure>,
    pub duration_ms: u64,
}

impl From<BatchStoreResult> for StoreBatchResponse {
    fn from(result: BatchStoreResult) -> Self {
        let results = result
            .results
            .iter()
            .map(|item| StoreBatchItem {
                index: item.index,
                response: StoreResponse::new(&item.document, item.is_new()),
            })
            .collect();
        Self {
            total_count: result.total_count,
            success_count: result.success_count,
            created_count: result.created_count,
            existing_count: result.existing_count,
            failure_count: result.failure_count,
            results,
            failures: result.failures,
            duration_ms: millis(result.duration),
        }
    }
}

/// A stored document with `json_data` embedded as the submitted JSON.
#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub content_hash: String,
    pub json_data: Box<RawValue>,
    pub size: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl TryFrom<Document> for DocumentResponse {
    type Error = ApiError;

    fn try_from(doc: Document) -> ApiResult<Self> {
        let text = String::from_utf8(doc.content)
            .map_err(|e| ApiError::Internal(format!("document {} is not UTF-8: {e}", doc.id)))?;
        let json_data = RawValue::from_string(text)
            .map_err(|e| ApiError::Internal(format!("document {} is not JSON: {e}", doc.id)))?;
        Ok(Self {
            id: doc.id,
            content_hash: doc.content_hash,
            json_data,
            size: doc.size,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            metadata: doc.metadata,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct BatchGetResponse {
    pub success_count: usize,
    pub failure_count: usize,
    pub documents: Vec<DocumentResponse>,
    pub failures: Vec<BatchFailure>,
    pub duration_ms: u64,
}

impl TryFrom<BatchGetResult> for BatchGetResponse {
    type Error = ApiError;

    fn try_from(result: BatchGetResult) -> ApiResult<Self> {
        let documents = result
            .documents
            .into_iter()
            .map(DocumentResponse::try_from)
            .collect::<ApiResult<Vec<_>>>()?;
        Ok(Self {
            success_count: result.success_count,
            failure_count: result.failure_count,
            documents,
            failures: result.failures,
            duration_ms: millis(result.duration),
        })
    }
}

fn millis(duration: std::time::Duration) -> u64 {
    duration.as_millis().try_into().unwrap_or(u64::MAX)
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))
}

fn count_rejection(err: StoreError) -> ApiError {
    if matches!(err, StoreError::InvalidDocument(_)) {
        metrics::DOCUMENTS_REJECTED.inc();
    }
    ApiError::from(err)
}

async fn store_bytes(
    state: &AppState,
    content: &[u8],
    metadata: Option<Metadata>,
) -> ApiResult<Json<StoreResponse>> {
    let outcome = state
        .store
        .store_one(content, metadata, state.request_deadline())
        .await
        .map_err(count_rejection)?;
    metrics::record_store(outcome.is_new());

    let doc = outcome.document();
    tracing::info!(
        id = %doc.id,
        hash = %doc.content_hash,
        size = doc.size,
        is_new = outcome.is_new(),
        "JSON document stored"
    );
    Ok(Json(StoreResponse::from(&outcome)))
}

/// POST /api/v1/json - Store one document from a `{json_data, metadata}` envelope.
pub async fn store_json(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<StoreResponse>> {
    let req: StoreRequest = parse_body(&body)?;
    store_bytes(&state, req.json_data.get().as_bytes(), req.metadata).await
}

/// POST /api/v1/json/raw - Store the request body itself as the document.
pub async fn store_raw_json(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<StoreResponse>> {
    store_bytes(&state, &body, None).await
}

/// POST /api/v1/json/batch - Store many documents with per-item results.
pub async fn store_json_batch(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<StoreBatchResponse>> {
    let req: StoreBatchRequest = parse_body(&body)?;
    let items = req
        .documents
        .into_iter()
        .map(StoreRequest::into_item)
        .collect();

    let result = state
        .store
        .store_batch(items, state.request_deadline())
        .await?;

    for item in &result.results {
        metrics::record_store(item.is_new());
    }
    for failure in &result.failures {
        metrics::record_batch_failure(&failure.code);
    }
    Ok(Json(StoreBatchResponse::from(result)))
}

/// GET /api/v1/json/{id}
pub async fn get_json(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DocumentResponse>> {
    let doc = state
        .store
        .get_by_id(&id, state.request_deadline())
        .await?;
    Ok(Json(DocumentResponse::try_from(doc)?))
}

/// GET /api/v1/json?hash=<hex>
pub async fn get_json_by_hash(
    State(state): State<AppState>,
    Query(query): Query<HashQuery>,
) -> ApiResult<Json<DocumentResponse>> {
    let hash = query
        .hash
        .filter(|h| !h.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("query parameter 'hash' is required".to_string()))?;
    let doc = state
        .store
        .get_by_hash(&hash, state.request_deadline())
        .await?;
    Ok(Json(DocumentResponse::try_from(doc)?))
}

async fn get_batch(state: &AppState, ids: &[String]) -> ApiResult<Json<BatchGetResponse>> {
    let result = state
        .store
        .get_batch(ids, state.request_deadline())
        .await?;
    Ok(Json(BatchGetResponse::try_from(result)?))
}

/// GET /api/v1/json/batch?ids=a,b,c
pub async fn get_json_batch(
    State(state): State<AppState>,
    Query(query): Query<IdsQuery>,
) -> ApiResult<Json<BatchGetResponse>> {
    let ids: Vec<String> = query
        .ids
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    if ids.is_empty() {
        return Err(ApiError::BadRequest(
            "query parameter 'ids' is required".to_string(),
        ));
    }
    get_batch(&state, &ids).await
}

/// POST /api/v1/json/batch/get - Batch lookup with ids in the body.
pub async fn post_json_batch_get(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<BatchGetResponse>> {
    let req: BatchGetRequest = parse_body(&body)?;
    get_batch(&state, &req.ids).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_core::now_micros;

    fn document(content: &str) -> Document {
        let now = now_micros();
        Document {
            id: Uuid::new_v4(),
            content_hash: "a".repeat(64),
            content: content.as_bytes().to_vec(),
            size: content.len() as i64,
            created_at: now,
            updated_at: now,
            metadata: None,
        }
    }

    #[test]
    fn test_document_response_embeds_raw_json() {
        let response = DocumentResponse::try_from(document(r#"{"b": 2, "a": [1, 2]}"#)).unwrap();
        let rendered = serde_json::to_string(&response).unwrap();
        assert!(rendered.contains(r#""json_data":{"b": 2, "a": [1, 2]}"#));
        assert!(!rendered.contains("metadata"));
    }

    #[test]
    fn test_store_request_keeps_submitted_text() {
        let req: StoreRequest =
            serde_json::from_str(r#"{"json_data": {"z": 1,  "a": 2}, "metadata": {"src": "t"}}"#)
                .unwrap();
        assert_eq!(req.json_data.get(), r#"{"z": 1,  "a": 2}"#);
        let item = req.into_item();
        assert_eq!(item.content, br#"{"z": 1,  "a": 2}"#.to_vec());
        assert_eq!(item.metadata.unwrap()["src"], "t");
    }

    #[test]
    fn test_store_response_message() {
        let doc = document("[]");
        assert_eq!(StoreResponse::new(&doc, true).message, STORED_MESSAGE);
        assert_eq!(StoreResponse::new(&doc, false).message, EXISTING_MESSAGE);
    }

    #[test]
    fn test_metadata_must_be_an_object() {
        let body = Bytes::from_static(br#"{"json_data": 1, "metadata": [1]}"#);
        assert!(matches!(
            parse_body::<StoreRequest>(&body),
            Err(ApiError::BadRequest(_))
        ));
    }
}
