use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and query activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_completed: AtomicU64,
    documents_failed: AtomicU64,
    chunks_stored: AtomicU64,
    queries_served: AtomicU64,
    degraded_queries: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed ingestion and the number of chunk rows committed for it.
    pub fn record_completed(&self, chunks_stored: u64) {
        self.documents_completed.fetch_add(1, Ordering::Relaxed);
        self.chunks_stored.fetch_add(chunks_stored, Ordering::Relaxed);
    }

    /// Record an ingestion that ended in the failed state.
    pub fn record_failed(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a served query, flagging whether the degraded fallback was used.
    pub fn record_query(&self, degraded: bool) {
        self.queries_served.fetch_add(1, Ordering::Relaxed);
        if degraded {
            self.degraded_queries.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_completed: self.documents_completed.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            chunks_stored: self.chunks_stored.load(Ordering::Relaxed),
            queries_served: self.queries_served.load(Ordering::Relaxed),
            degraded_queries: self.degraded_queries.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents ingested to completion since startup.
    pub documents_completed: u64,
    /// Number of documents that ended in the failed state.
    pub documents_failed: u64,
    /// Total chunk rows committed across all completed documents.
    pub chunks_stored: u64,
    /// Number of retrieval queries served.
    pub queries_served: u64,
    /// Number of queries answered through the substring fallback.
    pub degraded_queries: u64,
}
