//! Shared types used by the storage backends.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::chunking::ChunkStrategy;

/// Errors returned while interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid store URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Store responded with an unexpected status code.
    #[error("Unexpected store response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from the store.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Stored payload could not be interpreted.
    #[error("Malformed store payload: {0}")]
    MalformedPayload(String),
    /// A write carried rows scoped to a different tenant.
    #[error("Row tenant does not match the requested tenant scope")]
    TenantMismatch,
}

/// Lifecycle status of an uploaded document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Upload accepted, processing not yet started.
    Pending,
    /// Ingestion pipeline is running.
    Processing,
    /// All stages finished; chunk_count is final.
    Completed,
    /// Pipeline aborted; a fresh upload is required.
    Failed,
}

impl UploadStatus {
    /// Stable lowercase name used in payloads and API responses.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether moving to `next` respects the forward-only lifecycle.
    ///
    /// `failed` is reachable from any in-progress state; terminal states
    /// never transition again.
    pub fn can_transition(self, next: UploadStatus) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Processing | Self::Failed),
            Self::Processing => matches!(next, Self::Completed | Self::Failed),
            Self::Completed | Self::Failed => false,
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted document metadata row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Document identifier (UUID v4).
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Original filename supplied at upload.
    pub filename: String,
    /// Declared content type of the upload.
    pub mime_type: String,
    /// Size of the uploaded bytes.
    pub size_bytes: u64,
    /// Lifecycle status, persisted at every major pipeline transition.
    pub upload_status: UploadStatus,
    /// Number of chunk rows actually committed for the document.
    pub chunk_count: usize,
    /// SHA-256 digest of the uploaded bytes.
    pub content_sha256: String,
    /// Creation timestamp, RFC 3339.
    pub created_at: String,
    /// Last mutation timestamp, RFC 3339.
    pub updated_at: String,
}

/// Metadata stored alongside each chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Strategy that produced the chunk.
    pub strategy: ChunkStrategy,
    /// Whitespace-separated word count of the content.
    pub word_count: usize,
    /// Character count of the content.
    pub char_count: usize,
    /// Embedding model that produced the chunk vector.
    pub embedding_model: String,
}

/// Persisted chunk row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Chunk identifier (UUID v4).
    pub id: String,
    /// Owning document.
    pub document_id: String,
    /// Owning tenant, duplicated from the document for fast filtering.
    pub tenant_id: String,
    /// Chunk text content.
    pub content: String,
    /// Position of the chunk within the document.
    pub chunk_index: usize,
    /// Embedding vector, fixed dimensionality per model.
    pub embedding: Vec<f32>,
    /// Strategy and provenance metadata.
    pub metadata: ChunkMetadata,
    /// Creation timestamp, RFC 3339.
    pub created_at: String,
}

/// Parameters for a tenant-scoped similarity search.
#[derive(Debug, Clone)]
pub struct ChunkSearch {
    /// Query embedding vector.
    pub vector: Vec<f32>,
    /// Maximum number of hits to return.
    pub limit: usize,
    /// Minimum similarity score accepted.
    pub threshold: Option<f32>,
    /// Optional allow-list of document ids.
    pub document_ids: Option<Vec<String>>,
}

/// Scored hit returned by a similarity search.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// Chunk identifier.
    pub chunk_id: String,
    /// Owning document.
    pub document_id: String,
    /// Chunk text content.
    pub content: String,
    /// Position of the chunk within its document.
    pub chunk_index: usize,
    /// Similarity score computed by the store.
    pub score: f32,
}

/// Chunk row surfaced by a plain scan, without a score.
#[derive(Debug, Clone)]
pub struct ScannedChunk {
    /// Chunk identifier.
    pub chunk_id: String,
    /// Owning document.
    pub document_id: String,
    /// Chunk text content.
    pub content: String,
    /// Position of the chunk within its document.
    pub chunk_index: usize,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
        #[serde(default)]
        _count: Option<usize>,
    },
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Deserialize)]
pub(crate) struct RetrieveResponse {
    pub(crate) result: Vec<RetrievedPoint>,
}

#[derive(Deserialize)]
pub(crate) struct RetrievedPoint {
    #[serde(default)]
    pub(crate) payload: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Deserialize)]
pub(crate) struct CountResponse {
    pub(crate) result: CountResult,
}

#[derive(Deserialize)]
pub(crate) struct CountResult {
    pub(crate) count: usize,
}

#[derive(Deserialize)]
pub(crate) struct ScrollResponse {
    pub(crate) result: ScrollResult,
}

#[derive(Deserialize)]
pub(crate) struct ScrollResult {
    #[serde(default)]
    pub(crate) points: Vec<ScrollPoint>,
    #[serde(default)]
    pub(crate) next_page_offset: Option<serde_json::Value>,
}

#[derive(Deserialize)]
pub(crate) struct ScrollPoint {
    #[serde(default)]
    pub(crate) payload: Option<serde_json::Map<String, serde_json::Value>>,
}
