//! HTTP client implementing [`DocumentStore`] against the Qdrant REST API.
//!
//! Documents and chunks live in two collections: `{prefix}_documents` holds
//! metadata-only rows and `{prefix}_chunks` holds the embedding vectors with
//! cosine distance. Qdrant requires a vector schema on every collection, so
//! document rows carry a 1-dim zero vector.

use async_trait::async_trait;
use futures_util::{TryStreamExt, pin_mut};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};

use crate::config::Config;
use crate::store::DocumentStore;
use crate::store::filters::{ChunkFilterArgs, build_chunk_filter, build_document_filter};
use crate::store::payload::{
    build_chunk_payload, build_document_payload, parse_chunk_payload, parse_document_payload,
};
use crate::store::scroller::stream_payloads;
use crate::store::types::{
    ChunkRecord, ChunkSearch, CountResponse, DocumentRecord, QueryResponse, QueryResponseResult,
    RetrieveResponse, ScannedChunk, ScoredChunk, StoreError,
};

const DOCUMENT_VECTOR_SIZE: u64 = 1;

/// Qdrant-backed tenant-scoped store.
pub struct QdrantStore {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) documents_collection: String,
    pub(crate) chunks_collection: String,
}

impl QdrantStore {
    /// Construct a new client from the loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        Self::new(
            &config.store_url,
            config.store_api_key.clone(),
            &config.collection_prefix,
        )
    }

    /// Construct a new client against an explicit base URL and prefix.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        collection_prefix: &str,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .user_agent("docpipe/0.2")
            .build()?;
        let base_url = normalize_base_url(base_url).map_err(StoreError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            prefix = collection_prefix,
            has_api_key = api_key.as_deref().map(|value| !value.is_empty()).unwrap_or(false),
            "Initialized store HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
            documents_collection: format!("{collection_prefix}_documents"),
            chunks_collection: format!("{collection_prefix}_chunks"),
        })
    }

    /// Ensure both collections and their payload indexes exist.
    pub async fn ensure_collections(&self, vector_size: u64) -> Result<(), StoreError> {
        self.create_collection_if_not_exists(&self.documents_collection, DOCUMENT_VECTOR_SIZE)
            .await?;
        self.create_collection_if_not_exists(&self.chunks_collection, vector_size)
            .await?;
        self.ensure_payload_indexes(&self.documents_collection, &["tenant_id"])
            .await?;
        self.ensure_payload_indexes(&self.chunks_collection, &["tenant_id", "document_id"])
            .await?;
        Ok(())
    }

    async fn create_collection_if_not_exists(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), StoreError> {
        if self.collection_exists(collection_name).await? {
            return Ok(());
        }

        tracing::debug!(
            collection = collection_name,
            vector_size,
            "Creating collection"
        );
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}"))?
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, "Collection ensured/created");
        })
        .await
    }

    async fn ensure_payload_indexes(
        &self,
        collection_name: &str,
        fields: &[&str],
    ) -> Result<(), StoreError> {
        for field in fields {
            let body = json!({
                "field_name": field,
                "field_schema": "keyword",
            });

            let response = self
                .request(Method::PUT, &format!("collections/{collection_name}/index"))?
                .json(&body)
                .send()
                .await?;

            if response.status().is_success() || response.status() == StatusCode::CONFLICT {
                tracing::debug!(collection = collection_name, field, "Payload index ensured");
            } else {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let error = StoreError::UnexpectedStatus { status, body };
                tracing::warn!(collection = collection_name, field, error = %error, "Failed to ensure payload index");
            }
        }

        Ok(())
    }

    async fn collection_exists(&self, collection_name: &str) -> Result<bool, StoreError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection_name}"))?
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = StoreError::UnexpectedStatus { status, body };
                tracing::error!(collection = collection_name, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    pub(crate) fn request(
        &self,
        method: Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, StoreError> {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        Ok(req)
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), StoreError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StoreError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Store request failed");
            Err(error)
        }
    }

    async fn retrieve_document_payload(
        &self,
        document_id: &str,
    ) -> Result<Option<serde_json::Map<String, Value>>, StoreError> {
        let body = json!({
            "ids": [document_id],
            "with_payload": true,
            "with_vector": false,
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points", self.documents_collection),
            )?
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::UnexpectedStatus { status, body });
        }

        let payload: RetrieveResponse = response.json().await?;
        Ok(payload.result.into_iter().find_map(|point| point.payload))
    }
}

#[async_trait]
impl DocumentStore for QdrantStore {
    async fn upsert_document(
        &self,
        tenant_id: &str,
        document: &DocumentRecord,
    ) -> Result<(), StoreError> {
        if document.tenant_id != tenant_id {
            return Err(StoreError::TenantMismatch);
        }

        let payload = build_document_payload(document)?;
        let body = json!({
            "points": [
                {
                    "id": document.id,
                    "vector": [0.0],
                    "payload": payload,
                }
            ]
        });

        let response = self
            .request(
                Method::PUT,
                &format!("collections/{}/points", self.documents_collection),
            )?
            .query(&[("wait", true)])
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                document = %document.id,
                tenant = tenant_id,
                status = %document.upload_status,
                "Document row upserted"
            );
        })
        .await
    }

    async fn get_document(
        &self,
        tenant_id: &str,
        document_id: &str,
    ) -> Result<Option<DocumentRecord>, StoreError> {
        let Some(payload) = self.retrieve_document_payload(document_id).await? else {
            return Ok(None);
        };
        let record = parse_document_payload(payload)?;
        if record.tenant_id != tenant_id {
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn list_documents(&self, tenant_id: &str) -> Result<Vec<DocumentRecord>, StoreError> {
        let filter = build_document_filter(tenant_id);
        let stream = stream_payloads(
            self,
            &self.documents_collection,
            Value::Bool(true),
            Some(filter),
        );
        pin_mut!(stream);

        let mut documents = Vec::new();
        while let Some(payload) = stream.try_next().await? {
            documents.push(parse_document_payload(payload)?);
        }
        Ok(documents)
    }

    async fn delete_document(&self, tenant_id: &str, document_id: &str) -> Result<(), StoreError> {
        // ownership check first; deleting another tenant's document must be a no-op
        if self.get_document(tenant_id, document_id).await?.is_none() {
            return Ok(());
        }

        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/delete", self.documents_collection),
            )?
            .query(&[("wait", true)])
            .json(&json!({ "points": [document_id] }))
            .send()
            .await?;
        self.ensure_success(response, || {}).await?;

        let chunk_filter = build_chunk_filter(
            tenant_id,
            &ChunkFilterArgs {
                document_id: Some(document_id.to_string()),
                ..Default::default()
            },
        );
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/delete", self.chunks_collection),
            )?
            .query(&[("wait", true)])
            .json(&json!({ "filter": chunk_filter }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(document = document_id, tenant = tenant_id, "Document deleted with cascade");
        })
        .await
    }

    async fn insert_chunks(
        &self,
        tenant_id: &str,
        chunks: &[ChunkRecord],
    ) -> Result<(), StoreError> {
        if chunks.is_empty() {
            return Ok(());
        }
        if chunks.iter().any(|chunk| chunk.tenant_id != tenant_id) {
            return Err(StoreError::TenantMismatch);
        }

        let mut points = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let payload = build_chunk_payload(chunk)?;
            points.push(json!({
                "id": chunk.id,
                "vector": chunk.embedding,
                "payload": payload,
            }));
        }

        let point_count = points.len();
        let response = self
            .request(
                Method::PUT,
                &format!("collections/{}/points", self.chunks_collection),
            )?
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(tenant = tenant_id, points = point_count, "Chunk rows inserted");
        })
        .await
    }

    async fn count_chunks(&self, tenant_id: &str, document_id: &str) -> Result<usize, StoreError> {
        let filter = build_chunk_filter(
            tenant_id,
            &ChunkFilterArgs {
                document_id: Some(document_id.to_string()),
                ..Default::default()
            },
        );
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/count", self.chunks_collection),
            )?
            .json(&json!({ "filter": filter, "exact": true }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::UnexpectedStatus { status, body });
        }

        let payload: CountResponse = response.json().await?;
        Ok(payload.result.count)
    }

    async fn search_chunks(
        &self,
        tenant_id: &str,
        search: ChunkSearch,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let filter = build_chunk_filter(
            tenant_id,
            &ChunkFilterArgs {
                document_ids: search.document_ids.clone(),
                ..Default::default()
            },
        );

        let mut body = json!({
            "query": search.vector,
            "limit": search.limit,
            "with_payload": true,
            "filter": filter,
        });
        if let Some(threshold) = search.threshold {
            body.as_object_mut()
                .expect("query body should remain an object")
                .insert("score_threshold".into(), Value::from(threshold));
        }

        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/query", self.chunks_collection),
            )?
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StoreError::UnexpectedStatus { status, body };
            tracing::error!(tenant = tenant_id, error = %error, "Similarity search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points, .. } => points,
        };

        let mut results = Vec::with_capacity(points.len());
        for point in points {
            let Some(payload) = point.payload else {
                continue;
            };
            let scanned = parse_chunk_payload(&payload)?;
            results.push(ScoredChunk {
                chunk_id: scanned.chunk_id,
                document_id: scanned.document_id,
                content: scanned.content,
                chunk_index: scanned.chunk_index,
                score: point.score,
            });
        }

        Ok(results)
    }

    async fn scan_chunks(
        &self,
        tenant_id: &str,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<ScannedChunk>, StoreError> {
        let filter = build_chunk_filter(
            tenant_id,
            &ChunkFilterArgs {
                document_ids: document_ids.map(<[String]>::to_vec),
                ..Default::default()
            },
        );
        let stream = stream_payloads(self, &self.chunks_collection, Value::Bool(true), Some(filter));
        pin_mut!(stream);

        let mut chunks = Vec::new();
        while let Some(payload) = stream.try_next().await? {
            chunks.push(parse_chunk_payload(&payload)?);
        }
        Ok(chunks)
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

pub(crate) fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
