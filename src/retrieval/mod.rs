//! Retrieval engine: tenant-scoped similarity search with degraded fallback.
//!
//! The primary path embeds the query and runs a vector search against the
//! store. When the search mechanism is unavailable the engine falls back to a
//! case-insensitive substring scan over the tenant's chunks; every fallback
//! hit carries one fixed nominal score and the response is flagged
//! `degraded` so callers can distinguish fallback quality from true vector
//! ranking. Zero hits short-circuit with an explicit no-content result and
//! the answer synthesizer is never invoked on empty context.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::embedding::batch::EmbeddingBatcher;
use crate::generation::{
    ContextPassage, GenerationClient, GenerationRequest, ResponseStyle, build_answer_prompt,
};
use crate::pipeline::types::RetrievalError;
use crate::store::{ChunkSearch, DocumentStore};

/// Fixed nominal score assigned to every substring-fallback hit.
///
/// Fallback hits all share this score and are effectively unordered among
/// themselves; the `degraded` flag is what tells callers the ranking came
/// from the fallback.
pub const FALLBACK_SCORE: f32 = 0.5;

/// Message returned when no chunk clears the threshold or matches the scan.
pub const NO_RELEVANT_CONTENT: &str = "No relevant content found for the query.";

/// Parameters supplied to the retrieval engine.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    /// Requesting tenant; every store access is scoped to it.
    pub tenant_id: String,
    /// Natural-language query text.
    pub query: String,
    /// Optional allow-list of document ids.
    pub document_ids: Option<Vec<String>>,
    /// Maximum number of hits (defaults applied by the engine).
    pub limit: Option<usize>,
    /// Minimum similarity score (defaults applied by the engine).
    pub threshold: Option<f32>,
    /// Presentation style for the generated answer.
    pub response_style: ResponseStyle,
    /// Whether the generated answer should cite excerpt numbers.
    pub include_citations: bool,
}

/// Search mechanism that actually produced the hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// True vector similarity search.
    Vector,
    /// Case-insensitive substring scan, fixed nominal scores.
    SubstringFallback,
}

/// Effective parameters echoed back with every retrieval response.
#[derive(Debug, Clone, Serialize)]
pub struct SearchParameters {
    /// Hit limit applied.
    pub limit: usize,
    /// Similarity threshold applied on the vector path.
    pub threshold: f32,
    /// Mechanism that produced the hits.
    pub mode: SearchMode,
    /// Embedding model used for the query.
    pub model: String,
}

/// One ranked hit with citation metadata attached.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    /// Chunk identifier.
    pub chunk_id: String,
    /// Owning document.
    pub document_id: String,
    /// Filename of the owning document, when resolvable.
    pub filename: Option<String>,
    /// Chunk text content.
    pub content: String,
    /// Similarity score, or [`FALLBACK_SCORE`] in degraded mode.
    pub similarity: f32,
    /// Position of the chunk within its document.
    pub chunk_index: usize,
}

/// Complete result of a retrieval request.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalOutcome {
    /// Ranked hits, best first; ties keep insertion order.
    pub chunks: Vec<RetrievedChunk>,
    /// Generated answer, when a provider is configured and succeeded.
    pub response: Option<String>,
    /// Whether the substring fallback produced these hits.
    pub degraded: bool,
    /// Human-readable summary of what happened.
    pub message: String,
    /// Effective parameters for the request.
    pub search_parameters: SearchParameters,
}

/// Limits and defaults applied to retrieval requests.
#[derive(Debug, Clone, Copy)]
pub struct SearchDefaults {
    /// Hit limit applied when a request omits one.
    pub default_limit: usize,
    /// Upper bound on the per-request limit.
    pub max_limit: usize,
    /// Threshold applied when a request omits one.
    pub default_threshold: f32,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            default_limit: 5,
            max_limit: 50,
            default_threshold: 0.25,
        }
    }
}

/// Read-path engine over the tenant-scoped store.
pub struct RetrievalEngine {
    store: Arc<dyn DocumentStore>,
    batcher: Arc<EmbeddingBatcher>,
    generation: Option<Box<dyn GenerationClient + Send + Sync>>,
    generation_model: Option<String>,
    defaults: SearchDefaults,
}

impl RetrievalEngine {
    /// Build an engine over the given store and embedder.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        batcher: Arc<EmbeddingBatcher>,
        generation: Option<Box<dyn GenerationClient + Send + Sync>>,
        generation_model: Option<String>,
        defaults: SearchDefaults,
    ) -> Self {
        Self {
            store,
            batcher,
            generation,
            generation_model,
            defaults,
        }
    }

    /// Execute a retrieval request end to end.
    pub async fn retrieve(
        &self,
        request: RetrievalRequest,
    ) -> Result<RetrievalOutcome, RetrievalError> {
        let limit = request
            .limit
            .unwrap_or(self.defaults.default_limit)
            .clamp(1, self.defaults.max_limit);
        let threshold = request
            .threshold
            .unwrap_or(self.defaults.default_threshold)
            .clamp(0.0, 1.0);

        let vector = self.batcher.embed_query(&request.query).await?;

        let (mut hits, mode) = match self
            .store
            .search_chunks(
                &request.tenant_id,
                ChunkSearch {
                    vector,
                    limit,
                    threshold: Some(threshold),
                    document_ids: request.document_ids.clone(),
                },
            )
            .await
        {
            Ok(scored) => {
                let hits = scored
                    .into_iter()
                    .map(|hit| RetrievedChunk {
                        chunk_id: hit.chunk_id,
                        document_id: hit.document_id,
                        filename: None,
                        content: hit.content,
                        similarity: hit.score,
                        chunk_index: hit.chunk_index,
                    })
                    .collect();
                (hits, SearchMode::Vector)
            }
            Err(error) => {
                tracing::warn!(
                    tenant = %request.tenant_id,
                    error = %error,
                    "Similarity search unavailable; falling back to substring scan"
                );
                let hits = self
                    .substring_fallback(
                        &request.tenant_id,
                        &request.query,
                        request.document_ids.as_deref(),
                        limit,
                    )
                    .await?;
                (hits, SearchMode::SubstringFallback)
            }
        };

        // stable sort: primary score descending, ties keep insertion order
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let degraded = mode == SearchMode::SubstringFallback;
        let search_parameters = SearchParameters {
            limit,
            threshold,
            mode,
            model: self.batcher.model().to_string(),
        };

        if hits.is_empty() {
            return Ok(RetrievalOutcome {
                chunks: hits,
                response: None,
                degraded,
                message: NO_RELEVANT_CONTENT.to_string(),
                search_parameters,
            });
        }

        self.attach_filenames(&request.tenant_id, &mut hits).await;

        let (response, message) = self
            .synthesize(&request, &hits, degraded)
            .await;

        Ok(RetrievalOutcome {
            chunks: hits,
            response,
            degraded,
            message,
            search_parameters,
        })
    }

    async fn substring_fallback(
        &self,
        tenant_id: &str,
        query: &str,
        document_ids: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let needle = query.to_lowercase();
        let scanned = self.store.scan_chunks(tenant_id, document_ids).await?;

        Ok(scanned
            .into_iter()
            .filter(|chunk| chunk.content.to_lowercase().contains(&needle))
            .take(limit)
            .map(|chunk| RetrievedChunk {
                chunk_id: chunk.chunk_id,
                document_id: chunk.document_id,
                filename: None,
                content: chunk.content,
                similarity: FALLBACK_SCORE,
                chunk_index: chunk.chunk_index,
            })
            .collect())
    }

    /// Resolve owning-document filenames for citation display.
    ///
    /// A lookup failure leaves the filename unset rather than failing the
    /// whole retrieval.
    async fn attach_filenames(&self, tenant_id: &str, hits: &mut [RetrievedChunk]) {
        let mut filenames: HashMap<String, Option<String>> = HashMap::new();

        for hit in hits.iter_mut() {
            if !filenames.contains_key(&hit.document_id) {
                let filename = match self.store.get_document(tenant_id, &hit.document_id).await {
                    Ok(document) => document.map(|record| record.filename),
                    Err(error) => {
                        tracing::warn!(
                            tenant = tenant_id,
                            document = %hit.document_id,
                            error = %error,
                            "Failed to resolve document metadata for citation"
                        );
                        None
                    }
                };
                filenames.insert(hit.document_id.clone(), filename);
            }
            hit.filename = filenames
                .get(&hit.document_id)
                .and_then(|value| value.clone());
        }
    }

    async fn synthesize(
        &self,
        request: &RetrievalRequest,
        hits: &[RetrievedChunk],
        degraded: bool,
    ) -> (Option<String>, String) {
        let base_message = if degraded {
            format!(
                "Similarity search unavailable; substring fallback returned {} chunks.",
                hits.len()
            )
        } else {
            format!("Found {} relevant chunks.", hits.len())
        };

        let (Some(client), Some(model)) = (self.generation.as_ref(), self.generation_model.as_ref())
        else {
            return (None, base_message);
        };

        let passages: Vec<ContextPassage> = hits
            .iter()
            .map(|hit| ContextPassage {
                source: hit.filename.clone(),
                content: hit.content.clone(),
            })
            .collect();
        let prompt = build_answer_prompt(
            &request.query,
            &passages,
            request.response_style,
            request.include_citations,
        );

        match client
            .generate_answer(GenerationRequest {
                model: model.clone(),
                prompt,
            })
            .await
        {
            Ok(answer) => (Some(answer), base_message),
            Err(error) => {
                tracing::warn!(error = %error, "Answer generation failed; returning raw chunks");
                (
                    None,
                    format!("{base_message} Answer generation failed; returning raw retrieved chunks."),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingClient, HashEmbeddingClient};
    use crate::generation::GenerationClientError;
    use crate::pipeline::chunking::ChunkStrategy;
    use crate::store::types::{
        ChunkMetadata, ChunkRecord, DocumentRecord, ScannedChunk, ScoredChunk, StoreError,
        UploadStatus,
    };
    use crate::store::{DocumentStore, MemoryStore};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn batcher(dimension: usize) -> Arc<EmbeddingBatcher> {
        Arc::new(EmbeddingBatcher::new(
            Box::new(HashEmbeddingClient::new(dimension)),
            "hash-v1".into(),
            dimension,
            100,
        ))
    }

    fn request(tenant: &str, query: &str) -> RetrievalRequest {
        RetrievalRequest {
            tenant_id: tenant.into(),
            query: query.into(),
            document_ids: None,
            limit: None,
            threshold: None,
            response_style: ResponseStyle::Concise,
            include_citations: true,
        }
    }

    fn chunk_record(
        id: &str,
        document_id: &str,
        tenant: &str,
        content: &str,
        embedding: Vec<f32>,
    ) -> ChunkRecord {
        ChunkRecord {
            id: id.into(),
            document_id: document_id.into(),
            tenant_id: tenant.into(),
            content: content.into(),
            chunk_index: 0,
            embedding,
            metadata: ChunkMetadata {
                strategy: ChunkStrategy::Sentence,
                word_count: 2,
                char_count: content.len(),
                embedding_model: "hash-v1".into(),
            },
            created_at: "2025-01-01T00:00:00Z".into(),
        }
    }

    fn document_record(id: &str, tenant: &str, filename: &str) -> DocumentRecord {
        DocumentRecord {
            id: id.into(),
            tenant_id: tenant.into(),
            filename: filename.into(),
            mime_type: "application/pdf".into(),
            size_bytes: 10,
            upload_status: UploadStatus::Completed,
            chunk_count: 1,
            content_sha256: "digest".into(),
            created_at: "2025-01-01T00:00:00Z".into(),
            updated_at: "2025-01-01T00:00:00Z".into(),
        }
    }

    /// Store whose similarity search is unavailable.
    struct BrokenSearchStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl DocumentStore for BrokenSearchStore {
        async fn upsert_document(
            &self,
            tenant_id: &str,
            document: &DocumentRecord,
        ) -> Result<(), StoreError> {
            self.inner.upsert_document(tenant_id, document).await
        }

        async fn get_document(
            &self,
            tenant_id: &str,
            document_id: &str,
        ) -> Result<Option<DocumentRecord>, StoreError> {
            self.inner.get_document(tenant_id, document_id).await
        }

        async fn list_documents(
            &self,
            tenant_id: &str,
        ) -> Result<Vec<DocumentRecord>, StoreError> {
            self.inner.list_documents(tenant_id).await
        }

        async fn delete_document(
            &self,
            tenant_id: &str,
            document_id: &str,
        ) -> Result<(), StoreError> {
            self.inner.delete_document(tenant_id, document_id).await
        }

        async fn insert_chunks(
            &self,
            tenant_id: &str,
            chunks: &[ChunkRecord],
        ) -> Result<(), StoreError> {
            self.inner.insert_chunks(tenant_id, chunks).await
        }

        async fn count_chunks(
            &self,
            tenant_id: &str,
            document_id: &str,
        ) -> Result<usize, StoreError> {
            self.inner.count_chunks(tenant_id, document_id).await
        }

        async fn search_chunks(
            &self,
            _tenant_id: &str,
            _search: ChunkSearch,
        ) -> Result<Vec<ScoredChunk>, StoreError> {
            Err(StoreError::UnexpectedStatus {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                body: "vector index offline".into(),
            })
        }

        async fn scan_chunks(
            &self,
            tenant_id: &str,
            document_ids: Option<&[String]>,
        ) -> Result<Vec<ScannedChunk>, StoreError> {
            self.inner.scan_chunks(tenant_id, document_ids).await
        }
    }

    /// Generation client that records invocations through a shared counter.
    struct RecordingGenerationClient {
        calls: Arc<AtomicUsize>,
        result: Mutex<Result<String, String>>,
    }

    impl RecordingGenerationClient {
        fn succeeding(answer: &str) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let client = Self {
                calls: calls.clone(),
                result: Mutex::new(Ok(answer.to_string())),
            };
            (client, calls)
        }

        fn failing() -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let client = Self {
                calls: calls.clone(),
                result: Mutex::new(Err("model crashed".to_string())),
            };
            (client, calls)
        }
    }

    #[async_trait]
    impl GenerationClient for RecordingGenerationClient {
        async fn generate_answer(
            &self,
            _request: GenerationRequest,
        ) -> Result<String, GenerationClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.result.lock().expect("result lock").clone() {
                Ok(answer) => Ok(answer),
                Err(message) => Err(GenerationClientError::GenerationFailed(message)),
            }
        }
    }

    async fn seeded_memory_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_document("tenant-a", &document_record("doc-1", "tenant-a", "report.pdf"))
            .await
            .expect("upsert");
        let vector = HashEmbeddingClient::new(8)
            .generate_embeddings(vec!["the quarterly revenue grew".into()])
            .await
            .expect("vector")
            .remove(0);
        store
            .insert_chunks(
                "tenant-a",
                &[chunk_record(
                    "chunk-1",
                    "doc-1",
                    "tenant-a",
                    "the quarterly revenue grew",
                    vector,
                )],
            )
            .await
            .expect("insert");
        store
    }

    #[tokio::test]
    async fn vector_path_returns_ranked_hits_with_filenames() {
        let store = seeded_memory_store().await;
        let engine = RetrievalEngine::new(
            store,
            batcher(8),
            None,
            None,
            SearchDefaults::default(),
        );

        let outcome = engine
            .retrieve(request("tenant-a", "the quarterly revenue grew"))
            .await
            .expect("retrieval succeeds");

        assert!(!outcome.degraded);
        assert_eq!(outcome.search_parameters.mode, SearchMode::Vector);
        assert_eq!(outcome.chunks.len(), 1);
        assert_eq!(outcome.chunks[0].filename.as_deref(), Some("report.pdf"));
        assert!(outcome.chunks[0].similarity > 0.9);
        assert!(outcome.message.contains("1 relevant"));
    }

    #[tokio::test]
    async fn high_threshold_yields_no_content_and_skips_generation() {
        let store = seeded_memory_store().await;
        let (generation, calls) = RecordingGenerationClient::succeeding("should not run");
        let engine = RetrievalEngine::new(
            store,
            batcher(8),
            Some(Box::new(generation)),
            Some("llama".into()),
            SearchDefaults::default(),
        );

        let mut req = request("tenant-a", "something entirely unrelated zebra");
        req.threshold = Some(0.99);
        let outcome = engine.retrieve(req).await.expect("retrieval succeeds");

        assert!(outcome.chunks.is_empty());
        assert!(outcome.response.is_none());
        assert_eq!(outcome.message, NO_RELEVANT_CONTENT);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fallback_flags_degraded_and_assigns_fixed_score() {
        let inner = MemoryStore::new();
        inner
            .insert_chunks(
                "tenant-a",
                &[
                    chunk_record("c1", "doc-1", "tenant-a", "alpha REVENUE report", vec![1.0]),
                    chunk_record("c2", "doc-1", "tenant-a", "unrelated content", vec![1.0]),
                    chunk_record("c3", "doc-1", "tenant-a", "more revenue data", vec![1.0]),
                ],
            )
            .await
            .expect("insert");
        let store = Arc::new(BrokenSearchStore { inner });
        let engine = RetrievalEngine::new(
            store,
            batcher(8),
            None,
            None,
            SearchDefaults::default(),
        );

        let outcome = engine
            .retrieve(request("tenant-a", "revenue"))
            .await
            .expect("fallback succeeds");

        assert!(outcome.degraded);
        assert_eq!(
            outcome.search_parameters.mode,
            SearchMode::SubstringFallback
        );
        assert_eq!(outcome.chunks.len(), 2);
        // fixed score, scan order preserved among ties
        assert_eq!(outcome.chunks[0].chunk_id, "c1");
        assert_eq!(outcome.chunks[1].chunk_id, "c3");
        for chunk in &outcome.chunks {
            assert!((chunk.similarity - FALLBACK_SCORE).abs() < f32::EPSILON);
        }
        assert!(outcome.message.contains("fallback"));
    }

    #[tokio::test]
    async fn generation_failure_degrades_to_raw_chunks() {
        let store = seeded_memory_store().await;
        let (generation, _calls) = RecordingGenerationClient::failing();
        let engine = RetrievalEngine::new(
            store,
            batcher(8),
            Some(Box::new(generation)),
            Some("llama".into()),
            SearchDefaults::default(),
        );

        let outcome = engine
            .retrieve(request("tenant-a", "the quarterly revenue grew"))
            .await
            .expect("retrieval still succeeds");

        assert_eq!(outcome.chunks.len(), 1);
        assert!(outcome.response.is_none());
        assert!(outcome.message.contains("generation failed"));
    }

    #[tokio::test]
    async fn generation_success_attaches_answer() {
        let store = seeded_memory_store().await;
        let (generation, calls) = RecordingGenerationClient::succeeding(
            "Revenue grew in the quarter [1].",
        );
        let engine = RetrievalEngine::new(
            store,
            batcher(8),
            Some(Box::new(generation)),
            Some("llama".into()),
            SearchDefaults::default(),
        );

        let outcome = engine
            .retrieve(request("tenant-a", "the quarterly revenue grew"))
            .await
            .expect("retrieval succeeds");

        assert_eq!(
            outcome.response.as_deref(),
            Some("Revenue grew in the quarter [1].")
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cross_tenant_queries_see_nothing() {
        let store = seeded_memory_store().await;
        let engine = RetrievalEngine::new(
            store,
            batcher(8),
            None,
            None,
            SearchDefaults::default(),
        );

        let outcome = engine
            .retrieve(request("tenant-b", "the quarterly revenue grew"))
            .await
            .expect("retrieval succeeds");

        assert!(outcome.chunks.is_empty());
        assert_eq!(outcome.message, NO_RELEVANT_CONTENT);
    }
}
