//! Document ingestion pipeline: extraction, chunking, embedding, and storage
//! orchestration.

pub mod chunking;
pub mod coordinator;
mod service;
pub mod types;

pub use coordinator::{IngestionCoordinator, PDF_MIME_TYPE, PreparedUpload, validate_upload};
pub use service::{PipelineApi, PipelineService, PipelineSettings};
pub use types::{
    ChunkingError, DocumentSource, EmbeddingError, IngestError, IngestOptions, IngestReport,
    ProcessingSummary, RetrievalError, ValidationError,
};
