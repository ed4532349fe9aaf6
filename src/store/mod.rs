//! Tenant-scoped storage for documents and chunk vectors.
//!
//! All access goes through the [`DocumentStore`] repository trait, whose
//! methods are tenant-id-qualified without exception; no pipeline component
//! ever holds an unscoped connection. Two backends are provided: a Qdrant
//! HTTP client and an in-process store for development and tests.

pub mod adapter;
pub mod client;
pub mod filters;
pub mod memory;
pub mod payload;
/// Streaming helpers for scroll pagination.
pub mod scroller;
pub mod types;

use async_trait::async_trait;

pub use adapter::{CHUNK_SUB_BATCH_SIZE, StoreOutcome, SubBatchFailure, persist_chunks};
pub use client::QdrantStore;
pub use memory::MemoryStore;
pub use payload::{compute_content_digest, current_timestamp_rfc3339};
pub use types::{
    ChunkMetadata, ChunkRecord, ChunkSearch, DocumentRecord, ScannedChunk, ScoredChunk,
    StoreError, UploadStatus,
};

/// Tenant-scoped repository over documents and chunk vectors.
///
/// Every method takes the requesting tenant explicitly. Implementations must
/// never return or mutate a row whose `tenant_id` differs from the argument,
/// even when the row id matches.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create or replace a document metadata row.
    async fn upsert_document(
        &self,
        tenant_id: &str,
        document: &DocumentRecord,
    ) -> Result<(), StoreError>;

    /// Fetch a document by id; `None` when absent or owned by another tenant.
    async fn get_document(
        &self,
        tenant_id: &str,
        document_id: &str,
    ) -> Result<Option<DocumentRecord>, StoreError>;

    /// Enumerate the tenant's documents.
    async fn list_documents(&self, tenant_id: &str) -> Result<Vec<DocumentRecord>, StoreError>;

    /// Delete a document and cascade to its chunks. A no-op when the document
    /// is absent or owned by another tenant.
    async fn delete_document(&self, tenant_id: &str, document_id: &str) -> Result<(), StoreError>;

    /// Insert one sub-batch of chunk rows.
    async fn insert_chunks(&self, tenant_id: &str, chunks: &[ChunkRecord])
    -> Result<(), StoreError>;

    /// Count committed chunk rows for a document.
    async fn count_chunks(&self, tenant_id: &str, document_id: &str) -> Result<usize, StoreError>;

    /// Tenant-scoped similarity search over chunk vectors.
    async fn search_chunks(
        &self,
        tenant_id: &str,
        search: ChunkSearch,
    ) -> Result<Vec<ScoredChunk>, StoreError>;

    /// Plain scan over the tenant's chunks, used by the degraded fallback.
    async fn scan_chunks(
        &self,
        tenant_id: &str,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<ScannedChunk>, StoreError>;
}
