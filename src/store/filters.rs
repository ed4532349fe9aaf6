//! Filter helpers for tenant-scoped store queries.
//!
//! Every filter produced here carries the tenant id as a `must` clause; there
//! is no unscoped variant, so a query cannot be issued without naming its
//! tenant.

use serde_json::{Value, json};

/// Arguments narrowing a chunk query beyond the mandatory tenant scope.
#[derive(Debug, Default, Clone)]
pub struct ChunkFilterArgs {
    /// Exact match constraint for the owning document.
    pub document_id: Option<String>,
    /// Allow-list constraint over owning documents.
    pub document_ids: Option<Vec<String>>,
}

/// Compose the filter payload for a tenant-scoped chunk query.
pub fn build_chunk_filter(tenant_id: &str, args: &ChunkFilterArgs) -> Value {
    let mut must: Vec<Value> = vec![json!({
        "key": "tenant_id",
        "match": { "value": tenant_id }
    })];

    if let Some(document_id) = args.document_id.as_ref().and_then(|value| non_empty(value)) {
        must.push(json!({
            "key": "document_id",
            "match": { "value": document_id }
        }));
    }

    if let Some(ids) = args.document_ids.as_ref() {
        let cleaned: Vec<String> = ids
            .iter()
            .filter_map(|id| non_empty(id).map(|value| value.to_string()))
            .collect();
        if !cleaned.is_empty() {
            must.push(json!({
                "key": "document_id",
                "match": { "any": cleaned }
            }));
        }
    }

    json!({ "must": must })
}

/// Compose the filter payload for a tenant-scoped document listing.
pub fn build_document_filter(tenant_id: &str) -> Value {
    json!({
        "must": [
            {
                "key": "tenant_id",
                "match": { "value": tenant_id }
            }
        ]
    })
}

fn non_empty(input: &str) -> Option<&str> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
