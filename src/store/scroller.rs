//! Streaming helpers for iterating store scroll endpoints without manual loops.

use async_stream::try_stream;
use futures_core::Stream;
use reqwest::Method;
use serde_json::{Map, Value, json};

use super::client::{QdrantStore, format_endpoint};
use super::types::{ScrollResponse, StoreError};

const DEFAULT_SCROLL_LIMIT: usize = 512;

/// Stream payloads for a collection using the scroll API.
pub fn stream_payloads<'a>(
    store: &'a QdrantStore,
    collection: &'a str,
    with_payload: Value,
    filter: Option<Value>,
) -> impl Stream<Item = Result<Map<String, Value>, StoreError>> + 'a {
    try_stream! {
        let mut offset: Option<Value> = None;
        let payload_template = with_payload;
        let filter_body = filter.unwrap_or_else(|| json!({ "must": [] }));

        loop {
            let mut body = json!({
                "with_payload": payload_template.clone(),
                "with_vector": false,
                "limit": DEFAULT_SCROLL_LIMIT,
                "filter": filter_body.clone(),
            });

            body.as_object_mut()
                .expect("scroll body is object")
                .insert("offset".into(), offset.clone().unwrap_or(Value::Null));

            let mut request = store.client.request(
                Method::POST,
                format_endpoint(&store.base_url, &format!("collections/{collection}/points/scroll")),
            );

            if let Some(api_key) = &store.api_key && !api_key.is_empty() {
                request = request.header("api-key", api_key);
            }

            let response = request.json(&body).send().await?;

            let status = response.status();
            if status.is_success() {
                let ScrollResponse { result } = response.json().await?;
                for point in result.points {
                    if let Some(payload) = point.payload {
                        yield payload;
                    }
                }

                match result.next_page_offset {
                    Some(next) => offset = Some(next),
                    None => break,
                }
            } else {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(collection = collection, status = %status, "Failed to scroll payloads");
                Err(StoreError::UnexpectedStatus { status, body })?;
            }
        }
    }
}
