//! End-to-end pipeline tests over the in-memory store backend.

mod util;

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use docpipe::embedding::HashEmbeddingClient;
use docpipe::embedding::batch::EmbeddingBatcher;
use docpipe::generation::ResponseStyle;
use docpipe::pipeline::{
    DocumentSource, IngestError, IngestOptions, PipelineApi, PipelineService, PipelineSettings,
    ValidationError,
};
use docpipe::retrieval::RetrievalRequest;
use docpipe::store::{DocumentStore, MemoryStore, UploadStatus};

const DIMENSION: usize = 32;

fn build_service(store: Arc<MemoryStore>) -> PipelineService {
    let batcher = Arc::new(EmbeddingBatcher::new(
        Box::new(HashEmbeddingClient::new(DIMENSION)),
        "hash-v1".into(),
        DIMENSION,
        100,
    ));
    PipelineService::from_parts(store, batcher, None, None, PipelineSettings::default())
}

fn pdf_base64(text: &str) -> String {
    BASE64.encode(util::build_pdf(text))
}

fn retrieval(tenant: &str, query: &str) -> RetrievalRequest {
    RetrievalRequest {
        tenant_id: tenant.into(),
        query: query.into(),
        document_ids: None,
        limit: None,
        threshold: None,
        response_style: ResponseStyle::Concise,
        include_citations: false,
    }
}

const REPORT_TEXT: &str = "The quarterly revenue grew by twelve percent over the prior period. \
Operating costs stayed flat across all regions during the same window.";

#[tokio::test]
async fn ingest_then_query_round_trip() {
    let store = Arc::new(MemoryStore::new());
    let service = build_service(store.clone());

    let report = service
        .ingest_document(
            "tenant-a",
            DocumentSource::Base64(pdf_base64(REPORT_TEXT)),
            Some("q3-report.pdf".into()),
            IngestOptions::default(),
        )
        .await
        .expect("ingestion succeeds");

    assert!(report.chunk_count > 0);
    assert_eq!(report.chunk_count, report.embeddings_stored);

    // ground truth: persisted chunk_count equals the committed chunk rows
    let stored = store
        .count_chunks("tenant-a", &report.document_id)
        .await
        .expect("count");
    assert_eq!(report.chunk_count, stored);

    let document = store
        .get_document("tenant-a", &report.document_id)
        .await
        .expect("get")
        .expect("document exists");
    assert_eq!(document.upload_status, UploadStatus::Completed);
    assert_eq!(document.chunk_count, stored);
    assert_eq!(document.filename, "q3-report.pdf");

    let outcome = service
        .retrieve(retrieval("tenant-a", "quarterly revenue"))
        .await
        .expect("retrieval succeeds");
    assert!(!outcome.degraded);
    assert!(!outcome.chunks.is_empty());
    assert_eq!(
        outcome.chunks[0].filename.as_deref(),
        Some("q3-report.pdf")
    );
}

#[tokio::test]
async fn tenants_never_see_each_others_chunks() {
    let store = Arc::new(MemoryStore::new());
    let service = build_service(store.clone());

    service
        .ingest_document(
            "tenant-a",
            DocumentSource::Base64(pdf_base64(REPORT_TEXT)),
            Some("private.pdf".into()),
            IngestOptions::default(),
        )
        .await
        .expect("ingestion succeeds");

    // tenant B issues the lexically perfect query and still sees nothing
    let outcome = service
        .retrieve(retrieval("tenant-b", REPORT_TEXT))
        .await
        .expect("retrieval succeeds");
    assert!(outcome.chunks.is_empty());
    assert!(outcome.response.is_none());

    assert!(
        service
            .list_documents("tenant-b")
            .await
            .expect("list")
            .is_empty()
    );
}

#[tokio::test]
async fn bad_signature_rejected_without_creating_rows() {
    let store = Arc::new(MemoryStore::new());
    let service = build_service(store.clone());

    let error = service
        .ingest_document(
            "tenant-a",
            DocumentSource::Base64(BASE64.encode(b"GIF89a definitely not a pdf")),
            None,
            IngestOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        IngestError::Validation(ValidationError::MissingSignature)
    ));
    assert!(
        service
            .list_documents("tenant-a")
            .await
            .expect("list")
            .is_empty()
    );
}

#[tokio::test]
async fn unreachable_threshold_returns_no_content_without_an_answer() {
    let store = Arc::new(MemoryStore::new());
    let service = build_service(store.clone());

    service
        .ingest_document(
            "tenant-a",
            DocumentSource::Base64(pdf_base64(REPORT_TEXT)),
            None,
            IngestOptions::default(),
        )
        .await
        .expect("ingestion succeeds");

    let mut request = retrieval("tenant-a", "an entirely different subject");
    request.threshold = Some(1.0);
    let outcome = service.retrieve(request).await.expect("retrieval succeeds");

    assert!(outcome.chunks.is_empty());
    assert!(outcome.response.is_none());
    assert!(outcome.message.contains("No relevant content"));
}

#[tokio::test]
async fn document_id_filter_limits_hits() {
    let store = Arc::new(MemoryStore::new());
    let service = build_service(store.clone());

    let first = service
        .ingest_document(
            "tenant-a",
            DocumentSource::Base64(pdf_base64(REPORT_TEXT)),
            Some("first.pdf".into()),
            IngestOptions::default(),
        )
        .await
        .expect("first ingestion");
    let second = service
        .ingest_document(
            "tenant-a",
            DocumentSource::Base64(pdf_base64(
                "A completely different memo about office plants and watering schedules.",
            )),
            Some("second.pdf".into()),
            IngestOptions::default(),
        )
        .await
        .expect("second ingestion");

    let mut request = retrieval("tenant-a", "quarterly revenue");
    request.document_ids = Some(vec![second.document_id.clone()]);
    let outcome = service.retrieve(request).await.expect("retrieval succeeds");

    for chunk in &outcome.chunks {
        assert_eq!(chunk.document_id, second.document_id);
        assert_ne!(chunk.document_id, first.document_id);
    }
}

#[tokio::test]
async fn delete_cascades_and_empties_retrieval() {
    let store = Arc::new(MemoryStore::new());
    let service = build_service(store.clone());

    let report = service
        .ingest_document(
            "tenant-a",
            DocumentSource::Base64(pdf_base64(REPORT_TEXT)),
            None,
            IngestOptions::default(),
        )
        .await
        .expect("ingestion succeeds");

    service
        .delete_document("tenant-a", &report.document_id)
        .await
        .expect("delete succeeds");

    assert_eq!(
        store
            .count_chunks("tenant-a", &report.document_id)
            .await
            .expect("count"),
        0
    );
    let outcome = service
        .retrieve(retrieval("tenant-a", "quarterly revenue"))
        .await
        .expect("retrieval succeeds");
    assert!(outcome.chunks.is_empty());
}

#[tokio::test]
async fn compressed_uploads_round_trip() {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let store = Arc::new(MemoryStore::new());
    let service = build_service(store.clone());

    let pdf = util::build_pdf(REPORT_TEXT);
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&pdf).expect("compress");
    let compressed = encoder.finish().expect("finish");

    let report = service
        .ingest_document(
            "tenant-a",
            DocumentSource::CompressedBase64(BASE64.encode(compressed)),
            Some("compressed.pdf".into()),
            IngestOptions::default(),
        )
        .await
        .expect("ingestion succeeds");

    assert!(report.chunk_count > 0);
}
