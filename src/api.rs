//! HTTP surface for docpipe.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /documents` – Ingest one document (local path or base64 buffer,
//!   optionally gzip-compressed) through the full pipeline. Returns
//!   `{document_id, chunk_count, embeddings_stored, processing_summary}`.
//! - `POST /query` – Retrieve relevant chunks for a tenant query, with an
//!   optional generated answer. Degraded fallback is flagged explicitly.
//! - `GET /documents` – List a tenant's documents.
//! - `DELETE /documents/{id}` – Delete a document and its chunks.
//! - `GET /metrics` – Observe ingestion and query counters.
//! - `GET /commands` – Machine-readable command catalog for discovery.
//!
//! Every response carries an explicit `success` flag plus either the payload
//! or a structured `error` object; absence of a field is never the failure
//! signal.

use crate::generation::ResponseStyle;
use crate::pipeline::chunking::ChunkStrategy;
use crate::pipeline::{
    DocumentSource, IngestError, IngestOptions, PipelineApi, ProcessingSummary, RetrievalError,
    ValidationError,
};
use crate::retrieval::{RetrievalRequest, RetrievedChunk, SearchParameters};
use crate::store::StoreError;
use crate::store::types::DocumentRecord;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Build the HTTP router exposing the pipeline API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: PipelineApi + 'static,
{
    Router::new()
        .route("/documents", post(ingest_document::<S>).get(list_documents::<S>))
        .route("/documents/:id", axum::routing::delete(delete_document::<S>))
        .route("/query", post(query_documents::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
}

/// Request body for the `POST /documents` endpoint.
#[derive(Deserialize)]
struct IngestRequest {
    /// Tenant the document belongs to.
    tenant_id: String,
    /// Optional filename recorded for citations.
    #[serde(default)]
    filename: Option<String>,
    /// Server-local path to read the document from.
    #[serde(default)]
    path: Option<String>,
    /// Base64-encoded document bytes supplied inline.
    #[serde(default)]
    content_base64: Option<String>,
    /// Whether `content_base64` is gzip-compressed.
    #[serde(default)]
    compressed: bool,
    /// Optional chunking overrides.
    #[serde(default)]
    chunking: Option<ChunkingParams>,
}

/// Chunking overrides accepted on ingestion requests.
#[derive(Deserialize, Default)]
struct ChunkingParams {
    #[serde(default)]
    strategy: Option<ChunkStrategy>,
    #[serde(default)]
    max_chunk_size: Option<usize>,
    #[serde(default)]
    overlap: Option<usize>,
    #[serde(default)]
    min_chunk_size: Option<usize>,
}

/// Success response for the `POST /documents` endpoint.
#[derive(Serialize)]
struct IngestResponse {
    success: bool,
    document_id: String,
    chunk_count: usize,
    embeddings_stored: usize,
    processing_summary: ProcessingSummary,
}

/// Ingest a document through the full pipeline.
async fn ingest_document<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, AppError>
where
    S: PipelineApi,
{
    let IngestRequest {
        tenant_id,
        filename,
        path,
        content_base64,
        compressed,
        chunking,
    } = request;

    let source = match (path, content_base64) {
        (Some(path), None) => DocumentSource::Path(path),
        (None, Some(encoded)) if compressed => DocumentSource::CompressedBase64(encoded),
        (None, Some(encoded)) => DocumentSource::Base64(encoded),
        (Some(_), Some(_)) => {
            return Err(AppError::validation(
                "supply either path or content_base64, not both",
            ));
        }
        (None, None) => {
            return Err(AppError::validation(
                "supply one of path or content_base64",
            ));
        }
    };

    let chunking = chunking.unwrap_or_default();
    let options = IngestOptions {
        strategy: chunking.strategy,
        max_chunk_size: chunking.max_chunk_size,
        overlap: chunking.overlap,
        min_chunk_size: chunking.min_chunk_size,
    };

    let report = service
        .ingest_document(&tenant_id, source, filename, options)
        .await?;
    tracing::info!(
        tenant = %tenant_id,
        document = %report.document_id,
        chunks = report.chunk_count,
        "Ingest request completed"
    );
    Ok(Json(IngestResponse {
        success: true,
        document_id: report.document_id,
        chunk_count: report.chunk_count,
        embeddings_stored: report.embeddings_stored,
        processing_summary: report.processing_summary,
    }))
}

/// Request body for the `POST /query` endpoint.
#[derive(Deserialize)]
struct QueryRequest {
    tenant_id: String,
    query: String,
    #[serde(default)]
    document_ids: Option<Vec<String>>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    threshold: Option<f32>,
    #[serde(default)]
    response_style: ResponseStyle,
    #[serde(default = "default_include_citations")]
    include_citations: bool,
}

fn default_include_citations() -> bool {
    true
}

/// Success response for the `POST /query` endpoint.
#[derive(Serialize)]
struct QueryResponse {
    success: bool,
    chunks: Vec<RetrievedChunk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<String>,
    degraded: bool,
    search_parameters: SearchParameters,
    message: String,
}

/// Retrieve relevant chunks, optionally with a generated answer.
async fn query_documents<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError>
where
    S: PipelineApi,
{
    let QueryRequest {
        tenant_id,
        query,
        document_ids,
        limit,
        threshold,
        response_style,
        include_citations,
    } = request;

    let outcome = service
        .retrieve(RetrievalRequest {
            tenant_id,
            query,
            document_ids,
            limit,
            threshold,
            response_style,
            include_citations,
        })
        .await?;

    Ok(Json(QueryResponse {
        success: true,
        chunks: outcome.chunks,
        response: outcome.response,
        degraded: outcome.degraded,
        search_parameters: outcome.search_parameters,
        message: outcome.message,
    }))
}

/// Query string carrying the requesting tenant.
#[derive(Deserialize)]
struct TenantQuery {
    tenant_id: String,
}

/// Response body for `GET /documents`.
#[derive(Serialize)]
struct DocumentsResponse {
    success: bool,
    documents: Vec<DocumentRecord>,
}

/// List a tenant's documents.
async fn list_documents<S>(
    State(service): State<Arc<S>>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<DocumentsResponse>, AppError>
where
    S: PipelineApi,
{
    let documents = service.list_documents(&query.tenant_id).await?;
    Ok(Json(DocumentsResponse {
        success: true,
        documents,
    }))
}

/// Delete a document and cascade to its chunks.
async fn delete_document<S>(
    State(service): State<Arc<S>>,
    Path(document_id): Path<String>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<serde_json::Value>, AppError>
where
    S: PipelineApi,
{
    service
        .delete_document(&query.tenant_id, &document_id)
        .await?;
    Ok(Json(json!({ "success": true })))
}

/// Return a concise metrics snapshot with pipeline counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<serde_json::Value>
where
    S: PipelineApi,
{
    let snapshot = service.metrics_snapshot();
    Json(json!({
        "success": true,
        "metrics": snapshot,
    }))
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "ingest",
                method: "POST",
                path: "/documents",
                description: "Extract, chunk, embed, and store one PDF document for a tenant. Response returns { \"document_id\": string, \"chunk_count\": number }.",
                request_example: Some(json!({
                    "tenant_id": "tenant-123",
                    "filename": "report.pdf",
                    "content_base64": "JVBERi0xLjUK...",
                    "compressed": false,
                    "chunking": {
                        "strategy": "sentence",
                        "max_chunk_size": 1000,
                        "overlap": 100,
                        "min_chunk_size": 10
                    }
                })),
            },
            CommandDescriptor {
                name: "query",
                method: "POST",
                path: "/query",
                description: "Retrieve relevant chunks for a natural-language query, optionally with a generated answer. Degraded fallback is flagged via \"degraded\": true.",
                request_example: Some(json!({
                    "tenant_id": "tenant-123",
                    "query": "What changed in Q3?",
                    "limit": 5,
                    "threshold": 0.25,
                    "response_style": "concise",
                    "include_citations": true
                })),
            },
            CommandDescriptor {
                name: "list_documents",
                method: "GET",
                path: "/documents",
                description: "Return the tenant's documents with upload status and chunk counts.",
                request_example: None,
            },
            CommandDescriptor {
                name: "delete_document",
                method: "DELETE",
                path: "/documents/{id}",
                description: "Delete a document and cascade to its stored chunks.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return pipeline counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

/// Structured error envelope returned by every failing handler.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn validation(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "validation_error",
            message: message.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": {
                "code": self.code,
                "message": self.message,
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<IngestError> for AppError {
    fn from(inner: IngestError) -> Self {
        let status = match &inner {
            IngestError::Validation(ValidationError::FileTooLarge { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            IngestError::Validation(_) => StatusCode::BAD_REQUEST,
            IngestError::Extraction(_) | IngestError::Chunking(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            IngestError::NoEmbeddings | IngestError::Store(_) | IngestError::NoChunksStored => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            code: inner.code(),
            message: inner.to_string(),
        }
    }
}

impl From<RetrievalError> for AppError {
    fn from(inner: RetrievalError) -> Self {
        let (status, code) = match &inner {
            RetrievalError::Embedding(_) => (StatusCode::INTERNAL_SERVER_ERROR, "embedding_error"),
            RetrievalError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "storage_error"),
        };
        Self {
            status,
            code,
            message: inner.to_string(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(inner: StoreError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "storage_error",
            message: inner.to_string(),
        }
    }
}
