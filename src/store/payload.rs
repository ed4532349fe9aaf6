//! Helpers for constructing and parsing store payloads.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::store::types::{ChunkRecord, DocumentRecord, ScannedChunk, StoreError};

/// Build the payload object stored alongside a document metadata row.
pub(crate) fn build_document_payload(document: &DocumentRecord) -> Result<Value, StoreError> {
    serde_json::to_value(document)
        .map_err(|error| StoreError::MalformedPayload(error.to_string()))
}

/// Parse a document metadata row back out of its payload.
pub(crate) fn parse_document_payload(
    payload: Map<String, Value>,
) -> Result<DocumentRecord, StoreError> {
    serde_json::from_value(Value::Object(payload))
        .map_err(|error| StoreError::MalformedPayload(error.to_string()))
}

/// Build the payload object stored alongside a chunk vector.
///
/// The embedding itself is the point vector, not part of the payload.
pub(crate) fn build_chunk_payload(chunk: &ChunkRecord) -> Result<Value, StoreError> {
    let metadata = serde_json::to_value(&chunk.metadata)
        .map_err(|error| StoreError::MalformedPayload(error.to_string()))?;

    let mut payload = Map::new();
    payload.insert("chunk_id".into(), Value::String(chunk.id.clone()));
    payload.insert(
        "document_id".into(),
        Value::String(chunk.document_id.clone()),
    );
    payload.insert("tenant_id".into(), Value::String(chunk.tenant_id.clone()));
    payload.insert("content".into(), Value::String(chunk.content.clone()));
    payload.insert("chunk_index".into(), Value::from(chunk.chunk_index));
    payload.insert("metadata".into(), metadata);
    payload.insert("created_at".into(), Value::String(chunk.created_at.clone()));

    Ok(Value::Object(payload))
}

/// Parse the fields a retrieval hit needs out of a chunk payload.
pub(crate) fn parse_chunk_payload(payload: &Map<String, Value>) -> Result<ScannedChunk, StoreError> {
    let chunk_id = string_field(payload, "chunk_id")?;
    let document_id = string_field(payload, "document_id")?;
    let content = string_field(payload, "content")?;
    let chunk_index = payload
        .get("chunk_index")
        .and_then(Value::as_u64)
        .ok_or_else(|| StoreError::MalformedPayload("missing chunk_index".into()))?
        as usize;

    Ok(ScannedChunk {
        chunk_id,
        document_id,
        content,
        chunk_index,
    })
}

fn string_field(payload: &Map<String, Value>, key: &str) -> Result<String, StoreError> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(|value| value.to_string())
        .ok_or_else(|| StoreError::MalformedPayload(format!("missing {key}")))
}

/// Compute a deterministic SHA-256 digest for uploaded content.
pub fn compute_content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// Current timestamp formatted for payload storage.
pub fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::chunking::ChunkStrategy;
    use crate::store::types::{ChunkMetadata, UploadStatus};

    fn sample_chunk() -> ChunkRecord {
        ChunkRecord {
            id: "chunk-1".into(),
            document_id: "doc-1".into(),
            tenant_id: "tenant-a".into(),
            content: "sample content".into(),
            chunk_index: 3,
            embedding: vec![0.1, 0.2],
            metadata: ChunkMetadata {
                strategy: ChunkStrategy::Sentence,
                word_count: 2,
                char_count: 14,
                embedding_model: "hash-v1".into(),
            },
            created_at: "2025-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn content_digest_is_stable() {
        let d1 = compute_content_digest(b"Hello world");
        let d2 = compute_content_digest(b"Hello world");
        assert_eq!(d1, d2);
        assert!(!d1.is_empty());
    }

    #[test]
    fn timestamp_is_rfc3339_like() {
        let ts = current_timestamp_rfc3339();
        assert!(ts.contains('T') && ts.ends_with('Z'));
    }

    #[test]
    fn chunk_payload_round_trips_scan_fields() {
        let chunk = sample_chunk();
        let payload = build_chunk_payload(&chunk).expect("payload");
        let map = payload.as_object().expect("object").clone();

        assert_eq!(map["tenant_id"], "tenant-a");
        assert!(map.get("embedding").is_none());

        let scanned = parse_chunk_payload(&map).expect("scan fields");
        assert_eq!(scanned.chunk_id, "chunk-1");
        assert_eq!(scanned.document_id, "doc-1");
        assert_eq!(scanned.content, "sample content");
        assert_eq!(scanned.chunk_index, 3);
    }

    #[test]
    fn chunk_payload_missing_fields_are_rejected() {
        let mut map = Map::new();
        map.insert("chunk_id".into(), Value::String("chunk-1".into()));
        let error = parse_chunk_payload(&map).unwrap_err();
        assert!(matches!(error, StoreError::MalformedPayload(_)));
    }

    #[test]
    fn document_payload_round_trips() {
        let document = DocumentRecord {
            id: "doc-1".into(),
            tenant_id: "tenant-a".into(),
            filename: "report.pdf".into(),
            mime_type: "application/pdf".into(),
            size_bytes: 1234,
            upload_status: UploadStatus::Processing,
            chunk_count: 0,
            content_sha256: "abc".into(),
            created_at: "2025-01-01T00:00:00Z".into(),
            updated_at: "2025-01-01T00:00:00Z".into(),
        };

        let payload = build_document_payload(&document).expect("payload");
        let map = payload.as_object().expect("object").clone();
        let parsed = parse_document_payload(map).expect("record");
        assert_eq!(parsed, document);
    }
}
