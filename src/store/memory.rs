//! In-process [`DocumentStore`] used by tests and the `memory` backend.
//!
//! Enforces the same tenant-scoping contract as the Qdrant client: rows owned
//! by another tenant are invisible, whatever the row id. Similarity scoring
//! uses cosine similarity over the stored vectors.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::store::DocumentStore;
use crate::store::types::{
    ChunkRecord, ChunkSearch, DocumentRecord, ScannedChunk, ScoredChunk, StoreError,
};

#[derive(Default)]
struct Inner {
    documents: HashMap<String, DocumentRecord>,
    chunks: Vec<ChunkRecord>,
}

/// Tenant-scoped store held entirely in process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn allowed(document_ids: Option<&[String]>, document_id: &str) -> bool {
    document_ids.is_none_or(|ids| ids.iter().any(|id| id == document_id))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert_document(
        &self,
        tenant_id: &str,
        document: &DocumentRecord,
    ) -> Result<(), StoreError> {
        if document.tenant_id != tenant_id {
            return Err(StoreError::TenantMismatch);
        }
        let mut inner = self.inner.write().await;
        inner
            .documents
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn get_document(
        &self,
        tenant_id: &str,
        document_id: &str,
    ) -> Result<Option<DocumentRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .documents
            .get(document_id)
            .filter(|document| document.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_documents(&self, tenant_id: &str) -> Result<Vec<DocumentRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut documents: Vec<DocumentRecord> = inner
            .documents
            .values()
            .filter(|document| document.tenant_id == tenant_id)
            .cloned()
            .collect();
        documents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(documents)
    }

    async fn delete_document(&self, tenant_id: &str, document_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let owned = inner
            .documents
            .get(document_id)
            .is_some_and(|document| document.tenant_id == tenant_id);
        if !owned {
            return Ok(());
        }
        inner.documents.remove(document_id);
        inner
            .chunks
            .retain(|chunk| !(chunk.document_id == document_id && chunk.tenant_id == tenant_id));
        Ok(())
    }

    async fn insert_chunks(
        &self,
        tenant_id: &str,
        chunks: &[ChunkRecord],
    ) -> Result<(), StoreError> {
        if chunks.iter().any(|chunk| chunk.tenant_id != tenant_id) {
            return Err(StoreError::TenantMismatch);
        }
        let mut inner = self.inner.write().await;
        inner.chunks.extend_from_slice(chunks);
        Ok(())
    }

    async fn count_chunks(&self, tenant_id: &str, document_id: &str) -> Result<usize, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .chunks
            .iter()
            .filter(|chunk| chunk.tenant_id == tenant_id && chunk.document_id == document_id)
            .count())
    }

    async fn search_chunks(
        &self,
        tenant_id: &str,
        search: ChunkSearch,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let inner = self.inner.read().await;
        let mut hits: Vec<ScoredChunk> = inner
            .chunks
            .iter()
            .filter(|chunk| chunk.tenant_id == tenant_id)
            .filter(|chunk| allowed(search.document_ids.as_deref(), &chunk.document_id))
            .map(|chunk| ScoredChunk {
                chunk_id: chunk.id.clone(),
                document_id: chunk.document_id.clone(),
                content: chunk.content.clone(),
                chunk_index: chunk.chunk_index,
                score: cosine_similarity(&search.vector, &chunk.embedding),
            })
            .filter(|hit| search.threshold.is_none_or(|threshold| hit.score >= threshold))
            .collect();

        // stable sort: equal scores keep insertion order
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(search.limit);
        Ok(hits)
    }

    async fn scan_chunks(
        &self,
        tenant_id: &str,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<ScannedChunk>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .chunks
            .iter()
            .filter(|chunk| chunk.tenant_id == tenant_id)
            .filter(|chunk| allowed(document_ids, &chunk.document_id))
            .map(|chunk| ScannedChunk {
                chunk_id: chunk.id.clone(),
                document_id: chunk.document_id.clone(),
                content: chunk.content.clone(),
                chunk_index: chunk.chunk_index,
            })
            .collect())
    }
}
