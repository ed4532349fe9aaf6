//! Pipeline service coordinating ingestion, retrieval, and store access.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use flate2::read::GzDecoder;

use crate::config::{Config, StoreBackend, get_config};
use crate::embedding::batch::EmbeddingBatcher;
use crate::embedding::get_embedding_client;
use crate::generation::get_generation_client;
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::pipeline::chunking::{ChunkOptions, ChunkStrategy};
use crate::pipeline::coordinator::{IngestionCoordinator, PreparedUpload};
use crate::pipeline::types::{
    DocumentSource, IngestError, IngestOptions, IngestReport, RetrievalError, ValidationError,
};
use crate::retrieval::{RetrievalEngine, RetrievalOutcome, RetrievalRequest, SearchDefaults};
use crate::store::types::DocumentRecord;
use crate::store::{
    CHUNK_SUB_BATCH_SIZE, DocumentStore, MemoryStore, QdrantStore, StoreError,
};

/// Default filename recorded when an upload does not carry one.
const DEFAULT_FILENAME: &str = "document.pdf";

/// Tunables applied to every request the service handles.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: u64,
    /// Chunking strategy applied when a request omits one.
    pub default_strategy: ChunkStrategy,
    /// Chunking options applied when a request omits them.
    pub default_options: ChunkOptions,
    /// Retrieval limits and thresholds.
    pub search_defaults: SearchDefaults,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: 50 * 1024 * 1024,
            default_strategy: ChunkStrategy::Sentence,
            default_options: ChunkOptions::default(),
            search_defaults: SearchDefaults::default(),
        }
    }
}

impl PipelineSettings {
    fn from_config(config: &Config) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
            default_strategy: config.chunk_strategy,
            default_options: ChunkOptions {
                max_chunk_size: config.chunk_max_size,
                overlap: config.chunk_overlap,
                min_chunk_size: config.chunk_min_size,
            },
            search_defaults: SearchDefaults {
                default_limit: config.search_default_limit,
                max_limit: config.search_max_limit,
                default_threshold: config.search_default_threshold,
            },
        }
    }
}

/// Coordinates the ingestion pipeline and the retrieval read path.
///
/// The service owns long-lived handles to the embedding batcher, the
/// tenant-scoped store, and the metrics registry. Construct it once near
/// process start and share it through an `Arc`.
pub struct PipelineService {
    store: Arc<dyn DocumentStore>,
    batcher: Arc<EmbeddingBatcher>,
    retrieval: RetrievalEngine,
    metrics: Arc<PipelineMetrics>,
    settings: PipelineSettings,
}

/// Abstraction over the pipeline used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Resolve, validate, extract, chunk, embed, and store one upload.
    async fn ingest_document(
        &self,
        tenant_id: &str,
        source: DocumentSource,
        filename: Option<String>,
        options: IngestOptions,
    ) -> Result<IngestReport, IngestError>;

    /// Answer a query against the tenant's stored chunks.
    async fn retrieve(&self, request: RetrievalRequest)
    -> Result<RetrievalOutcome, RetrievalError>;

    /// Enumerate the tenant's documents.
    async fn list_documents(&self, tenant_id: &str) -> Result<Vec<DocumentRecord>, StoreError>;

    /// Delete a document and cascade to its chunks.
    async fn delete_document(&self, tenant_id: &str, document_id: &str)
    -> Result<(), StoreError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl PipelineService {
    /// Build a new pipeline service from the loaded configuration,
    /// initializing backing services as needed.
    pub async fn new() -> Self {
        let config = get_config();
        tracing::info!("Initializing embedding client");
        let embedding_client = get_embedding_client(config);
        let batcher = Arc::new(EmbeddingBatcher::new(
            embedding_client,
            config.embedding_model.clone(),
            config.embedding_dimension,
            config.embedding_batch_size,
        ));

        let store: Arc<dyn DocumentStore> = match config.store_backend {
            StoreBackend::Memory => {
                tracing::info!("Using in-memory store backend");
                Arc::new(MemoryStore::new())
            }
            StoreBackend::Qdrant => {
                let store =
                    QdrantStore::from_config(config).expect("Failed to connect to vector store");
                store
                    .ensure_collections(config.embedding_dimension as u64)
                    .await
                    .expect("Failed to ensure store collections exist");
                tracing::debug!("Store collections ready");
                Arc::new(store)
            }
        };

        let generation = get_generation_client(config);
        Self::from_parts(
            store,
            batcher,
            generation,
            config.generation_model.clone(),
            PipelineSettings::from_config(config),
        )
    }

    /// Assemble a service from explicit components.
    pub fn from_parts(
        store: Arc<dyn DocumentStore>,
        batcher: Arc<EmbeddingBatcher>,
        generation: Option<Box<dyn crate::generation::GenerationClient + Send + Sync>>,
        generation_model: Option<String>,
        settings: PipelineSettings,
    ) -> Self {
        let retrieval = RetrievalEngine::new(
            store.clone(),
            batcher.clone(),
            generation,
            generation_model,
            settings.search_defaults,
        );

        Self {
            store,
            batcher,
            retrieval,
            metrics: Arc::new(PipelineMetrics::new()),
            settings,
        }
    }

    fn chunk_options(&self, options: &IngestOptions) -> ChunkOptions {
        let defaults = self.settings.default_options;
        ChunkOptions {
            max_chunk_size: options.max_chunk_size.unwrap_or(defaults.max_chunk_size),
            overlap: options.overlap.unwrap_or(defaults.overlap),
            min_chunk_size: options.min_chunk_size.unwrap_or(defaults.min_chunk_size),
        }
    }

    /// Resolve an ingestion source into raw bytes plus a filename hint.
    fn resolve_source(
        &self,
        source: &DocumentSource,
    ) -> Result<(Vec<u8>, Option<String>), ValidationError> {
        match source {
            DocumentSource::Path(path) => {
                let bytes = std::fs::read(path).map_err(|source| ValidationError::FileRead {
                    path: path.clone(),
                    source,
                })?;
                let hint = Path::new(path)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned());
                Ok((bytes, hint))
            }
            DocumentSource::Base64(encoded) => {
                let bytes = BASE64
                    .decode(encoded.trim())
                    .map_err(|error| ValidationError::InvalidBase64(error.to_string()))?;
                Ok((bytes, None))
            }
            DocumentSource::CompressedBase64(encoded) => {
                let compressed = BASE64
                    .decode(encoded.trim())
                    .map_err(|error| ValidationError::InvalidBase64(error.to_string()))?;
                // bound the decompressed size so a tiny payload cannot expand
                // past the upload ceiling
                let limit = self.settings.max_upload_bytes + 1;
                let mut bytes = Vec::new();
                GzDecoder::new(compressed.as_slice())
                    .take(limit)
                    .read_to_end(&mut bytes)
                    .map_err(|error| ValidationError::InvalidCompression(error.to_string()))?;
                if bytes.len() as u64 >= limit {
                    return Err(ValidationError::FileTooLarge {
                        size: bytes.len() as u64,
                        max: self.settings.max_upload_bytes,
                    });
                }
                Ok((bytes, None))
            }
        }
    }
}

#[async_trait]
impl PipelineApi for PipelineService {
    async fn ingest_document(
        &self,
        tenant_id: &str,
        source: DocumentSource,
        filename: Option<String>,
        options: IngestOptions,
    ) -> Result<IngestReport, IngestError> {
        let (bytes, filename_hint) = self.resolve_source(&source)?;
        let filename = filename
            .or(filename_hint)
            .unwrap_or_else(|| DEFAULT_FILENAME.to_string());
        let strategy = options
            .strategy
            .unwrap_or(self.settings.default_strategy);
        let chunk_options = self.chunk_options(&options);

        tracing::info!(
            tenant = tenant_id,
            filename = %filename,
            bytes = bytes.len(),
            strategy = %strategy,
            "Processing document"
        );

        let coordinator = IngestionCoordinator::new(
            self.store.as_ref(),
            self.batcher.as_ref(),
            self.settings.max_upload_bytes,
            CHUNK_SUB_BATCH_SIZE,
        );
        let upload = PreparedUpload {
            tenant_id: tenant_id.to_string(),
            filename,
            mime_type: super::coordinator::PDF_MIME_TYPE.to_string(),
            bytes,
        };

        match coordinator.ingest(upload, strategy, chunk_options).await {
            Ok(report) => {
                self.metrics.record_completed(report.chunk_count as u64);
                Ok(report)
            }
            Err(error) => {
                // validation rejections never created a row and are not
                // counted as failed documents
                if !matches!(error, IngestError::Validation(_)) {
                    self.metrics.record_failed();
                }
                Err(error)
            }
        }
    }

    async fn retrieve(
        &self,
        request: RetrievalRequest,
    ) -> Result<RetrievalOutcome, RetrievalError> {
        let outcome = self.retrieval.retrieve(request).await?;
        self.metrics.record_query(outcome.degraded);
        Ok(outcome)
    }

    async fn list_documents(&self, tenant_id: &str) -> Result<Vec<DocumentRecord>, StoreError> {
        self.store.list_documents(tenant_id).await
    }

    async fn delete_document(
        &self,
        tenant_id: &str,
        document_id: &str,
    ) -> Result<(), StoreError> {
        self.store.delete_document(tenant_id, document_id).await?;
        tracing::info!(tenant = tenant_id, document = document_id, "Document deleted");
        Ok(())
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingClient;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn service() -> PipelineService {
        let batcher = Arc::new(EmbeddingBatcher::new(
            Box::new(HashEmbeddingClient::new(8)),
            "hash-v1".into(),
            8,
            100,
        ));
        PipelineService::from_parts(
            Arc::new(MemoryStore::new()),
            batcher,
            None,
            None,
            PipelineSettings::default(),
        )
    }

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).expect("compress");
        encoder.finish().expect("finish")
    }

    #[test]
    fn resolve_source_decodes_base64() {
        let service = service();
        let encoded = BASE64.encode(b"%PDF-1.5 payload");
        let (bytes, hint) = service
            .resolve_source(&DocumentSource::Base64(encoded))
            .expect("decode");
        assert_eq!(bytes, b"%PDF-1.5 payload");
        assert!(hint.is_none());
    }

    #[test]
    fn resolve_source_rejects_invalid_base64() {
        let service = service();
        let error = service
            .resolve_source(&DocumentSource::Base64("not-base64!!!".into()))
            .unwrap_err();
        assert!(matches!(error, ValidationError::InvalidBase64(_)));
    }

    #[test]
    fn resolve_source_decompresses_gzip_payloads() {
        let service = service();
        let encoded = BASE64.encode(gzip(b"%PDF-1.5 compressed payload"));
        let (bytes, _) = service
            .resolve_source(&DocumentSource::CompressedBase64(encoded))
            .expect("decode");
        assert_eq!(bytes, b"%PDF-1.5 compressed payload");
    }

    #[test]
    fn resolve_source_rejects_non_gzip_compressed_payloads() {
        let service = service();
        let encoded = BASE64.encode(b"plain, not gzip");
        let error = service
            .resolve_source(&DocumentSource::CompressedBase64(encoded))
            .unwrap_err();
        assert!(matches!(error, ValidationError::InvalidCompression(_)));
    }

    #[test]
    fn resolve_source_reads_local_files_with_filename_hint() {
        let service = service();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, b"%PDF-1.5 on disk").expect("write");

        let (bytes, hint) = service
            .resolve_source(&DocumentSource::Path(path.to_string_lossy().into_owned()))
            .expect("read");
        assert_eq!(bytes, b"%PDF-1.5 on disk");
        assert_eq!(hint.as_deref(), Some("report.pdf"));
    }

    #[test]
    fn resolve_source_rejects_missing_files() {
        let service = service();
        let error = service
            .resolve_source(&DocumentSource::Path("/nonexistent/file.pdf".into()))
            .unwrap_err();
        assert!(matches!(error, ValidationError::FileRead { .. }));
    }

    #[tokio::test]
    async fn validation_rejections_are_not_counted_as_failed_documents() {
        let service = service();
        let encoded = BASE64.encode(b"GIF89a not a pdf");
        let error = service
            .ingest_document(
                "tenant-a",
                DocumentSource::Base64(encoded),
                None,
                IngestOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(error, IngestError::Validation(_)));
        let snapshot = service.metrics_snapshot();
        assert_eq!(snapshot.documents_failed, 0);
        assert_eq!(snapshot.documents_completed, 0);
    }
}
