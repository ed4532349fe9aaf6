//! Core data types and error definitions for the ingestion pipeline.

use serde::Serialize;
use thiserror::Error;

use crate::embedding::EmbeddingClientError;
use crate::extract::ExtractionError;
use crate::store::StoreError;

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Requested an impossible character budget.
    #[error("max chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must leave room for fresh content in every chunk.
    #[error("overlap must be smaller than the max chunk size")]
    OverlapTooLarge,
    /// Non-empty input produced zero chunks after filtering.
    #[error("chunking produced no chunks from non-empty input")]
    NoChunks,
}

/// Errors that reject an upload before any document row is created.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Upload declared a content type other than PDF.
    #[error("unsupported mime type: {0}")]
    UnsupportedMimeType(String),
    /// Upload exceeds the configured size ceiling.
    #[error("file of {size} bytes exceeds the {max} byte limit")]
    FileTooLarge {
        /// Size of the rejected upload.
        size: u64,
        /// Configured ceiling.
        max: u64,
    },
    /// Content does not begin with the PDF signature.
    #[error("content does not start with the %PDF signature")]
    MissingSignature,
    /// Base64 payload could not be decoded.
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),
    /// Gzip payload could not be decompressed.
    #[error("invalid compressed payload: {0}")]
    InvalidCompression(String),
    /// Upload carried no bytes at all.
    #[error("upload contained no content")]
    EmptySource,
    /// Local file path could not be read.
    #[error("failed to read {path}: {source}")]
    FileRead {
        /// Path supplied by the caller.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Whole-document errors that abort an ingestion and mark it failed.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Upload rejected before a document row was created.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    /// Text extraction failed.
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    /// Chunking failed or produced nothing.
    #[error("chunking failed: {0}")]
    Chunking(#[from] ChunkingError),
    /// Every chunk failed to embed; nothing to store.
    #[error("embedding produced no vectors for any chunk")]
    NoEmbeddings,
    /// Store interaction failed while writing the document row.
    #[error("store request failed: {0}")]
    Store(#[from] StoreError),
    /// Every chunk sub-batch failed to commit after the document row was written.
    #[error("no chunk rows were committed")]
    NoChunksStored,
}

impl IngestError {
    /// Stable machine-readable code surfaced in API error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Extraction(_) => "extraction_error",
            Self::Chunking(_) => "chunking_error",
            Self::NoEmbeddings => "embedding_error",
            Self::Store(_) | Self::NoChunksStored => "storage_error",
        }
    }
}

/// Errors raised while embedding query text for retrieval.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Provider failed to return vectors.
    #[error("failed to generate embeddings: {0}")]
    Provider(#[from] EmbeddingClientError),
    /// Produced vector does not match the configured dimensionality.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensionality recorded for stored chunks.
        expected: usize,
        /// Dimensionality the provider returned.
        actual: usize,
    },
    /// Provider returned no vectors at all.
    #[error("embedding provider returned no vectors for the query")]
    EmptyEmbedding,
}

/// Errors emitted while orchestrating a retrieval request.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Query embedding failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    /// Both the similarity search and the substring fallback failed.
    #[error("store unavailable for search and fallback: {0}")]
    Store(#[from] StoreError),
}

/// Raw document content accepted by the ingestion surface.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// Path to a file readable by the server process.
    Path(String),
    /// Base64-encoded bytes supplied inline.
    Base64(String),
    /// Gzip-compressed, base64-encoded bytes supplied inline.
    CompressedBase64(String),
}

/// Per-request ingestion options; unset fields fall back to configuration.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Chunking strategy override.
    pub strategy: Option<super::chunking::ChunkStrategy>,
    /// Maximum chunk size override, in characters.
    pub max_chunk_size: Option<usize>,
    /// Overlap override, in characters.
    pub overlap: Option<usize>,
    /// Minimum chunk size override, in characters.
    pub min_chunk_size: Option<usize>,
}

/// One embedding batch that failed after retries.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingFailureReport {
    /// Chunk ids that were part of the failed batch.
    pub chunk_ids: Vec<String>,
    /// Provider error message.
    pub message: String,
}

/// One chunk sub-batch that failed to commit.
#[derive(Debug, Clone, Serialize)]
pub struct StorageFailureReport {
    /// First chunk index of the failed sub-batch.
    pub start_index: usize,
    /// Last chunk index of the failed sub-batch, inclusive.
    pub end_index: usize,
    /// Store error message.
    pub message: String,
}

/// Stage-by-stage accounting for a completed ingestion.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ProcessingSummary {
    /// Pages observed by the extractor.
    pub pages: usize,
    /// Chunks produced by the chunker after the minimum-size filter.
    pub chunks_produced: usize,
    /// Chunks successfully embedded.
    pub chunks_embedded: usize,
    /// Chunk rows actually committed to the store.
    pub chunks_stored: usize,
    /// Embedding batches that failed after retries.
    pub embedding_failures: Vec<EmbeddingFailureReport>,
    /// Chunk sub-batches that failed to commit.
    pub storage_failures: Vec<StorageFailureReport>,
}

/// Result of a completed ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// Identifier of the created document.
    pub document_id: String,
    /// Chunk rows committed for the document; matches the persisted
    /// `chunk_count`, not the attempted count.
    pub chunk_count: usize,
    /// Embeddings successfully stored alongside their chunks.
    pub embeddings_stored: usize,
    /// Stage-by-stage accounting, including partial failures.
    pub processing_summary: ProcessingSummary,
}
