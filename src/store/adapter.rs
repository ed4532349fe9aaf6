//! Sub-batched chunk persistence with partial-failure accounting.
//!
//! Persisting a document is two sequential, non-atomic writes: the metadata
//! row first (owned by the coordinator), then the chunk rows here, in
//! sub-batches of [`CHUNK_SUB_BATCH_SIZE`]. Each sub-batch succeeds or fails
//! independently; failures are collected by index range and never retried
//! automatically. The committed count is what the coordinator writes into
//! `chunk_count`.

use crate::store::DocumentStore;
use crate::store::types::ChunkRecord;

/// Number of chunk rows written per store request.
pub const CHUNK_SUB_BATCH_SIZE: usize = 100;

/// One sub-batch that failed to commit.
#[derive(Debug, Clone)]
pub struct SubBatchFailure {
    /// First chunk index of the failed sub-batch.
    pub start_index: usize,
    /// Last chunk index of the failed sub-batch, inclusive.
    pub end_index: usize,
    /// Store error message.
    pub message: String,
}

/// Accounting for a chunk persistence run.
#[derive(Debug, Default)]
pub struct StoreOutcome {
    /// Number of chunk rows actually committed.
    pub chunks_committed: usize,
    /// Sub-batches that failed to commit.
    pub failures: Vec<SubBatchFailure>,
}

/// Insert chunk rows in independent sub-batches.
///
/// Never fails as a whole; the caller decides what a partially-committed
/// document means.
pub async fn persist_chunks(
    store: &dyn DocumentStore,
    tenant_id: &str,
    chunks: &[ChunkRecord],
    sub_batch_size: usize,
) -> StoreOutcome {
    let mut outcome = StoreOutcome::default();
    if chunks.is_empty() {
        return outcome;
    }

    let sub_batch_size = sub_batch_size.max(1);
    for sub_batch in chunks.chunks(sub_batch_size) {
        let start_index = sub_batch[0].chunk_index;
        let end_index = sub_batch[sub_batch.len() - 1].chunk_index;

        match store.insert_chunks(tenant_id, sub_batch).await {
            Ok(()) => outcome.chunks_committed += sub_batch.len(),
            Err(error) => {
                tracing::warn!(
                    tenant = tenant_id,
                    start_index,
                    end_index,
                    error = %error,
                    "Chunk sub-batch failed to commit"
                );
                outcome.failures.push(SubBatchFailure {
                    start_index,
                    end_index,
                    message: error.to_string(),
                });
            }
        }
    }

    outcome
}
