//! Bounded-batch embedding with partial-failure accounting.
//!
//! Chunks are embedded in fixed-size batches, one batch at a time, as
//! backpressure against provider rate limits. A failing batch is retried a
//! bounded number of times and then recorded with its chunk ids; remaining
//! batches still run, so partial success is the normal outcome. Every
//! successful embedding carries the model name and dimensionality it was
//! produced with.

use std::time::Duration;

use crate::embedding::EmbeddingClient;
use crate::pipeline::chunking::ChunkPiece;
use crate::pipeline::types::EmbeddingError;

const MAX_BATCH_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// A chunk with its embedding vector and provenance.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    /// The source chunk.
    pub chunk: ChunkPiece,
    /// Embedding vector produced for the chunk.
    pub vector: Vec<f32>,
    /// Model that produced the vector.
    pub model: String,
    /// Dimensionality of the vector.
    pub dimension: usize,
}

/// A batch that failed after retries, excluded from the embedded output.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    /// Zero-based index of the failed batch.
    pub batch_index: usize,
    /// Chunk ids that were part of the failed batch.
    pub chunk_ids: Vec<String>,
    /// Final provider error message.
    pub message: String,
}

/// Combined result of a batched embedding run.
#[derive(Debug, Default)]
pub struct EmbeddingOutcome {
    /// Successfully embedded chunks, in input order.
    pub embedded: Vec<EmbeddedChunk>,
    /// Batches that failed after retries.
    pub failures: Vec<BatchFailure>,
}

/// Sequential batch embedder with bounded retry and provenance tracking.
pub struct EmbeddingBatcher {
    client: Box<dyn EmbeddingClient + Send + Sync>,
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl EmbeddingBatcher {
    /// Build a batcher over the given client.
    ///
    /// `dimension` is the dimensionality every produced vector must match;
    /// `batch_size` is clamped to at least one.
    pub fn new(
        client: Box<dyn EmbeddingClient + Send + Sync>,
        model: String,
        dimension: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            client,
            model,
            dimension,
            batch_size: batch_size.max(1),
        }
    }

    /// Embedding model this batcher was configured with.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Dimensionality every produced vector must match.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed chunks in sequential batches.
    ///
    /// Never fails as a whole: batches that error after retries are recorded
    /// in [`EmbeddingOutcome::failures`] and their chunks are excluded from
    /// the embedded output.
    pub async fn embed_chunks(&self, chunks: Vec<ChunkPiece>) -> EmbeddingOutcome {
        let mut outcome = EmbeddingOutcome::default();
        if chunks.is_empty() {
            return outcome;
        }

        let batches: Vec<&[ChunkPiece]> = chunks.chunks(self.batch_size).collect();
        let batch_count = batches.len();

        for (batch_index, batch) in batches.into_iter().enumerate() {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();

            match self.embed_with_retry(texts).await {
                Ok(vectors) => match self.check_batch(batch, vectors) {
                    Ok(embedded) => outcome.embedded.extend(embedded),
                    Err(message) => {
                        outcome.failures.push(failure(batch_index, batch, message));
                    }
                },
                Err(message) => {
                    tracing::warn!(
                        batch = batch_index,
                        batches = batch_count,
                        chunks = batch.len(),
                        error = %message,
                        "Embedding batch failed after retries"
                    );
                    outcome.failures.push(failure(batch_index, batch, message));
                }
            }
        }

        tracing::debug!(
            embedded = outcome.embedded.len(),
            failed_batches = outcome.failures.len(),
            model = %self.model,
            "Embedding run finished"
        );
        outcome
    }

    /// Embed a single query string for retrieval.
    ///
    /// Rejects a model/dimensionality mismatch before any similarity search
    /// is attempted.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self
            .client
            .generate_embeddings(vec![text.to_string()])
            .await?;
        let vector = vectors.pop().ok_or(EmbeddingError::EmptyEmbedding)?;

        if vector.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        Ok(vector)
    }

    async fn embed_with_retry(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, String> {
        let mut delay = RETRY_BASE_DELAY;
        let mut last_error = String::new();

        for attempt in 1..=MAX_BATCH_ATTEMPTS {
            match self.client.generate_embeddings(texts.clone()).await {
                Ok(vectors) => return Ok(vectors),
                Err(error) => {
                    last_error = error.to_string();
                    if attempt < MAX_BATCH_ATTEMPTS {
                        tracing::debug!(
                            attempt,
                            error = %last_error,
                            "Embedding attempt failed; backing off"
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        Err(last_error)
    }

    fn check_batch(
        &self,
        batch: &[ChunkPiece],
        vectors: Vec<Vec<f32>>,
    ) -> Result<Vec<EmbeddedChunk>, String> {
        if vectors.len() != batch.len() {
            return Err(format!(
                "provider returned {} vectors for {} chunks",
                vectors.len(),
                batch.len()
            ));
        }
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != self.dimension) {
            return Err(format!(
                "provider returned dimension {} but {} is configured",
                bad.len(),
                self.dimension
            ));
        }

        Ok(batch
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedChunk {
                chunk,
                vector,
                model: self.model.clone(),
                dimension: self.dimension,
            })
            .collect())
    }
}

fn failure(batch_index: usize, batch: &[ChunkPiece], message: String) -> BatchFailure {
    BatchFailure {
        batch_index,
        chunk_ids: batch.iter().map(|chunk| chunk.id.clone()).collect(),
        message,
    }
}
