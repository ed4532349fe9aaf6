//! Per-document ingestion state machine.
//!
//! Stages run strictly in order: `PENDING → VALIDATING → EXTRACTING →
//! CHUNKING → EMBEDDING → STORING → COMPLETED`, with `FAILED` reachable from
//! any non-terminal stage. Transitions are one-way and non-retryable; a
//! failed document requires a fresh upload. The document's `upload_status`
//! is persisted at the major transitions (row creation, processing start,
//! completion, failure) so progress is externally observable. Validation
//! runs before the row exists, so rejected uploads leave no trace.
//!
//! Every upload gets a fresh document id, so concurrent ingestions never
//! contend on the same rows; stages within one ingestion run strictly in
//! sequence.

use uuid::Uuid;

use crate::embedding::batch::EmbeddingBatcher;
use crate::extract::{extract_pdf, has_pdf_signature};
use crate::pipeline::chunking::{ChunkOptions, ChunkStrategy, chunk};
use crate::pipeline::types::{
    ChunkingError, EmbeddingFailureReport, IngestError, IngestReport, ProcessingSummary,
    StorageFailureReport, ValidationError,
};
use crate::store::payload::{compute_content_digest, current_timestamp_rfc3339};
use crate::store::types::{ChunkMetadata, ChunkRecord, DocumentRecord, UploadStatus};
use crate::store::{DocumentStore, persist_chunks};

/// Accepted content type for uploads.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Internal pipeline stage, finer-grained than the persisted status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PipelineStage {
    Pending,
    Validating,
    Extracting,
    Chunking,
    Embedding,
    Storing,
    Completed,
    Failed,
}

impl PipelineStage {
    fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Validating => "validating",
            Self::Extracting => "extracting",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Storing => "storing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// An upload with its bytes resolved, ready for the pipeline.
#[derive(Debug, Clone)]
pub struct PreparedUpload {
    /// Owning tenant.
    pub tenant_id: String,
    /// Filename recorded on the document row.
    pub filename: String,
    /// Declared content type.
    pub mime_type: String,
    /// Raw document bytes.
    pub bytes: Vec<u8>,
}

/// Drives one document through the ingestion stages.
pub struct IngestionCoordinator<'a> {
    store: &'a dyn DocumentStore,
    batcher: &'a EmbeddingBatcher,
    max_upload_bytes: u64,
    sub_batch_size: usize,
}

impl<'a> IngestionCoordinator<'a> {
    /// Build a coordinator over the shared store and embedder.
    pub fn new(
        store: &'a dyn DocumentStore,
        batcher: &'a EmbeddingBatcher,
        max_upload_bytes: u64,
        sub_batch_size: usize,
    ) -> Self {
        Self {
            store,
            batcher,
            max_upload_bytes,
            sub_batch_size,
        }
    }

    /// Run the full pipeline for one upload.
    ///
    /// Whole-document errors abort the run; once the document row exists the
    /// abort also persists the `failed` status. Per-item embedding and
    /// storage failures are collected into the report instead.
    pub async fn ingest(
        &self,
        upload: PreparedUpload,
        strategy: ChunkStrategy,
        options: ChunkOptions,
    ) -> Result<IngestReport, IngestError> {
        let mut stage = PipelineStage::Pending;
        let document_id = Uuid::new_v4().to_string();

        self.advance(&mut stage, PipelineStage::Validating, &document_id);
        validate_upload(&upload.bytes, &upload.mime_type, self.max_upload_bytes)?;

        // the document row exists from here on; failures must compensate
        let mut document = new_document_row(&upload, &document_id);
        self.store
            .upsert_document(&upload.tenant_id, &document)
            .await?;

        document.upload_status = UploadStatus::Processing;
        document.updated_at = current_timestamp_rfc3339();
        self.store
            .upsert_document(&upload.tenant_id, &document)
            .await?;

        self.advance(&mut stage, PipelineStage::Extracting, &document_id);
        let extracted = match extract_pdf(&upload.bytes) {
            Ok(extracted) => extracted,
            Err(error) => {
                self.fail(&mut stage, &mut document, &upload.tenant_id).await;
                return Err(error.into());
            }
        };

        self.advance(&mut stage, PipelineStage::Chunking, &document_id);
        let pieces = match chunk(&extracted.text, strategy, options) {
            Ok(pieces) if pieces.is_empty() => {
                self.fail(&mut stage, &mut document, &upload.tenant_id).await;
                return Err(ChunkingError::NoChunks.into());
            }
            Ok(pieces) => pieces,
            Err(error) => {
                self.fail(&mut stage, &mut document, &upload.tenant_id).await;
                return Err(error.into());
            }
        };
        let chunks_produced = pieces.len();

        self.advance(&mut stage, PipelineStage::Embedding, &document_id);
        let embedding_outcome = self.batcher.embed_chunks(pieces).await;
        if embedding_outcome.embedded.is_empty() {
            self.fail(&mut stage, &mut document, &upload.tenant_id).await;
            return Err(IngestError::NoEmbeddings);
        }
        let chunks_embedded = embedding_outcome.embedded.len();

        self.advance(&mut stage, PipelineStage::Storing, &document_id);
        let now = current_timestamp_rfc3339();
        let records: Vec<ChunkRecord> = embedding_outcome
            .embedded
            .iter()
            .map(|embedded| ChunkRecord {
                id: embedded.chunk.id.clone(),
                document_id: document_id.clone(),
                tenant_id: upload.tenant_id.clone(),
                content: embedded.chunk.content.clone(),
                chunk_index: embedded.chunk.index,
                embedding: embedded.vector.clone(),
                metadata: ChunkMetadata {
                    strategy,
                    word_count: embedded.chunk.word_count,
                    char_count: embedded.chunk.char_count,
                    embedding_model: embedded.model.clone(),
                },
                created_at: now.clone(),
            })
            .collect();

        let store_outcome =
            persist_chunks(self.store, &upload.tenant_id, &records, self.sub_batch_size).await;

        if store_outcome.chunks_committed == 0 {
            // compensating transition: metadata row exists but no chunks landed
            self.fail(&mut stage, &mut document, &upload.tenant_id).await;
            return Err(IngestError::NoChunksStored);
        }

        document.upload_status = UploadStatus::Completed;
        document.chunk_count = store_outcome.chunks_committed;
        document.updated_at = current_timestamp_rfc3339();
        self.store
            .upsert_document(&upload.tenant_id, &document)
            .await?;
        self.advance(&mut stage, PipelineStage::Completed, &document_id);

        let summary = ProcessingSummary {
            pages: extracted.page_count,
            chunks_produced,
            chunks_embedded,
            chunks_stored: store_outcome.chunks_committed,
            embedding_failures: embedding_outcome
                .failures
                .into_iter()
                .map(|failure| EmbeddingFailureReport {
                    chunk_ids: failure.chunk_ids,
                    message: failure.message,
                })
                .collect(),
            storage_failures: store_outcome
                .failures
                .into_iter()
                .map(|failure| StorageFailureReport {
                    start_index: failure.start_index,
                    end_index: failure.end_index,
                    message: failure.message,
                })
                .collect(),
        };

        tracing::info!(
            document = %document_id,
            tenant = %upload.tenant_id,
            chunks = summary.chunks_stored,
            pages = summary.pages,
            embedding_failures = summary.embedding_failures.len(),
            storage_failures = summary.storage_failures.len(),
            "Document ingested"
        );

        Ok(IngestReport {
            document_id,
            chunk_count: store_outcome.chunks_committed,
            embeddings_stored: store_outcome.chunks_committed,
            processing_summary: summary,
        })
    }

    fn advance(&self, stage: &mut PipelineStage, next: PipelineStage, document_id: &str) {
        debug_assert!(*stage != PipelineStage::Completed && *stage != PipelineStage::Failed);
        tracing::debug!(
            document = document_id,
            from = stage.as_str(),
            to = next.as_str(),
            "Pipeline stage transition"
        );
        *stage = next;
    }

    /// Persist the failed status; the pipeline instance is done either way.
    async fn fail(
        &self,
        stage: &mut PipelineStage,
        document: &mut DocumentRecord,
        tenant_id: &str,
    ) {
        tracing::warn!(
            document = %document.id,
            tenant = tenant_id,
            at_stage = stage.as_str(),
            "Ingestion failed; marking document"
        );
        *stage = PipelineStage::Failed;

        if !document.upload_status.can_transition(UploadStatus::Failed) {
            return;
        }
        document.upload_status = UploadStatus::Failed;
        document.updated_at = current_timestamp_rfc3339();
        if let Err(error) = self.store.upsert_document(tenant_id, document).await {
            tracing::error!(
                document = %document.id,
                error = %error,
                "Failed to persist failed status"
            );
        }
    }
}

/// Reject bad uploads before any row is created.
pub fn validate_upload(
    bytes: &[u8],
    mime_type: &str,
    max_upload_bytes: u64,
) -> Result<(), ValidationError> {
    if bytes.is_empty() {
        return Err(ValidationError::EmptySource);
    }
    if !mime_type.is_empty() && mime_type != PDF_MIME_TYPE {
        return Err(ValidationError::UnsupportedMimeType(mime_type.to_string()));
    }
    let size = bytes.len() as u64;
    if size > max_upload_bytes {
        return Err(ValidationError::FileTooLarge {
            size,
            max: max_upload_bytes,
        });
    }
    if !has_pdf_signature(bytes) {
        return Err(ValidationError::MissingSignature);
    }
    Ok(())
}

fn new_document_row(upload: &PreparedUpload, document_id: &str) -> DocumentRecord {
    let now = current_timestamp_rfc3339();
    DocumentRecord {
        id: document_id.to_string(),
        tenant_id: upload.tenant_id.clone(),
        filename: upload.filename.clone(),
        mime_type: if upload.mime_type.is_empty() {
            PDF_MIME_TYPE.to_string()
        } else {
            upload.mime_type.clone()
        },
        size_bytes: upload.bytes.len() as u64,
        upload_status: UploadStatus::Pending,
        chunk_count: 0,
        content_sha256: compute_content_digest(&upload.bytes),
        created_at: now.clone(),
        updated_at: now,
    }
}
