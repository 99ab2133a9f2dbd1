//! Similarity search engine
//!
//! Embeds free-text queries and serves k-nearest-neighbor results scoped to
//! one shop and reference type. Search is best-effort: an embedding or index
//! failure degrades to an empty result set (logged and counted) instead of
//! failing the workflow that invoked it. The knowledge-base write path lives
//! here too: each chunk is embedded once at ingestion, and re-ingesting a
//! chunk id replaces both the chunk and its vector.

pub mod store;

pub use store::{
    cosine_similarity, ChunkStore, EmbeddingVector, KnowledgeChunk, MemoryChunkStore,
    MemoryVectorStore, ReferenceType, ScoredVector, VectorStore,
};

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::constants::DEFAULT_SEARCH_LIMIT;
use crate::embeddings::Embedder;
use crate::errors::AppError;
use crate::metrics;
use crate::monitor::AlertDispatcher;

/// One similarity match returned to callers
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub reference_id: String,
    pub score: f32,
}

/// Outcome of a knowledge-base ingestion
#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestOutcome {
    pub chunk_id: String,
    pub namespace: String,
    /// True when an existing chunk with the same id was replaced
    pub replaced: bool,
}

/// Similarity search engine over a shop-scoped vector index
pub struct SimilarityEngine {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    chunks: Arc<dyn ChunkStore>,
    monitor: Arc<AlertDispatcher>,
}

impl SimilarityEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        chunks: Arc<dyn ChunkStore>,
        monitor: Arc<AlertDispatcher>,
    ) -> Self {
        Self {
            embedder,
            vectors,
            chunks,
            monitor,
        }
    }

    /// Shop-scoped knowledge-base namespace
    pub fn kb_namespace(shop_id: &str) -> String {
        format!("{shop_id}-kb")
    }

    /// Find the `limit` nearest vectors for a free-text query
    ///
    /// Never fails: embedding or index errors return an empty result set,
    /// with the failure logged and counted for alerting.
    pub async fn search(
        &self,
        shop_id: &str,
        query: &str,
        reference_type: ReferenceType,
        limit: Option<usize>,
    ) -> Vec<SearchHit> {
        let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        let _timer = metrics::Timer::new(metrics::VECTOR_SEARCH_DURATION.clone());

        match self.try_search(shop_id, query, reference_type, limit).await {
            Ok(hits) => {
                metrics::VECTOR_SEARCH_TOTAL.with_label_values(&["ok"]).inc();
                self.monitor.record_outcome("search.query_complete", "success");
                hits
            }
            Err(e) => {
                metrics::VECTOR_SEARCH_TOTAL
                    .with_label_values(&["degraded"])
                    .inc();
                tracing::warn!(shop_id, "similarity search degraded to empty results: {e}");
                self.monitor.record_outcome("search.query_failure", "failure");
                Vec::new()
            }
        }
    }

    async fn try_search(
        &self,
        shop_id: &str,
        query: &str,
        reference_type: ReferenceType,
        limit: usize,
    ) -> anyhow::Result<Vec<SearchHit>> {
        let query_vector = self.embedder.embed(query).await?;
        let scored = self
            .vectors
            .search(shop_id, reference_type, &query_vector, limit)
            .await?;

        Ok(scored
            .into_iter()
            .map(|s| SearchHit {
                reference_id: s.reference_id,
                score: s.score,
            })
            .collect())
    }

    /// Ingest a knowledge-base chunk: embed once, then write chunk + vector
    ///
    /// Re-ingesting an existing chunk id replaces its content and vector
    /// rather than duplicating either. Unlike queries, ingestion failures
    /// propagate — a write the caller believes happened must have happened.
    pub async fn ingest_chunk(
        &self,
        shop_id: &str,
        chunk_id: &str,
        content: &str,
        metadata: HashMap<String, String>,
    ) -> Result<IngestOutcome, AppError> {
        let namespace = Self::kb_namespace(shop_id);

        let values = self
            .embedder
            .embed(content)
            .await
            .map_err(|e| AppError::UpstreamAi(format!("chunk embedding failed: {e}")))?;

        let vector = EmbeddingVector {
            id: Uuid::new_v4(),
            shop_id: shop_id.to_string(),
            reference_type: ReferenceType::KnowledgeBase,
            reference_id: chunk_id.to_string(),
            values,
            metadata: metadata.clone(),
            created_at: Utc::now(),
        };

        self.vectors
            .replace(vector)
            .await
            .map_err(|e| AppError::StorageError(format!("vector write failed: {e}")))?;

        let replaced = self
            .chunks
            .upsert(KnowledgeChunk {
                namespace: namespace.clone(),
                chunk_id: chunk_id.to_string(),
                content: content.to_string(),
                metadata,
                created_at: Utc::now(),
            })
            .await
            .map_err(|e| AppError::StorageError(format!("chunk write failed: {e}")))?;

        tracing::info!(shop_id, chunk_id, replaced, "knowledge chunk ingested");

        Ok(IngestOutcome {
            chunk_id: chunk_id.to_string(),
            namespace,
            replaced,
        })
    }

    /// List a shop's knowledge chunks, most recent first
    pub async fn list_chunks(&self, shop_id: &str) -> Result<Vec<KnowledgeChunk>, AppError> {
        self.chunks
            .list(&Self::kb_namespace(shop_id))
            .await
            .map_err(|e| AppError::StorageError(format!("chunk list failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kb_namespace() {
        assert_eq!(SimilarityEngine::kb_namespace("shop-42"), "shop-42-kb");
    }
}
