//! Vector and knowledge-chunk persistence boundaries
//!
//! The vector store is an external collaborator in production; the in-memory
//! implementation here serves tests and single-node development. Shop scoping
//! is enforced inside the store: a query can never see another shop's
//! vectors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// What an embedding vector refers back to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReferenceType {
    Inspection,
    KnowledgeBase,
}

/// A fixed-dimension embedding with its scoping tags
///
/// Immutable after insert; superseding content inserts a new vector (and, for
/// knowledge-base entries, replaces the source chunk record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingVector {
    pub id: Uuid,
    pub shop_id: String,
    pub reference_type: ReferenceType,
    pub reference_id: String,
    pub values: Vec<f32>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// A search match with its similarity score
#[derive(Debug, Clone)]
pub struct ScoredVector {
    pub reference_id: String,
    pub score: f32,
    pub created_at: DateTime<Utc>,
}

/// Vector index boundary (external collaborator)
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert a new vector
    async fn insert(&self, vector: EmbeddingVector) -> anyhow::Result<()>;

    /// Insert a vector, removing any prior vector with the same scope and
    /// reference id (used by knowledge-base re-ingestion)
    async fn replace(&self, vector: EmbeddingVector) -> anyhow::Result<()>;

    /// K-nearest-neighbor query scoped to one shop and reference type,
    /// ordered by similarity score descending (ties broken by most-recent
    /// creation timestamp first)
    async fn search(
        &self,
        shop_id: &str,
        reference_type: ReferenceType,
        query: &[f32],
        limit: usize,
    ) -> anyhow::Result<Vec<ScoredVector>>;

    /// Number of vectors stored for a shop (all reference types)
    async fn count(&self, shop_id: &str) -> anyhow::Result<usize>;
}

/// Compute cosine similarity between two vectors
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// In-memory vector store: exact scan over the shop's candidates
#[derive(Default)]
pub struct MemoryVectorStore {
    by_shop: DashMap<String, Vec<EmbeddingVector>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn insert(&self, vector: EmbeddingVector) -> anyhow::Result<()> {
        self.by_shop
            .entry(vector.shop_id.clone())
            .or_default()
            .push(vector);
        Ok(())
    }

    async fn replace(&self, vector: EmbeddingVector) -> anyhow::Result<()> {
        let mut entry = self.by_shop.entry(vector.shop_id.clone()).or_default();
        entry.retain(|v| {
            !(v.reference_type == vector.reference_type && v.reference_id == vector.reference_id)
        });
        entry.push(vector);
        Ok(())
    }

    async fn search(
        &self,
        shop_id: &str,
        reference_type: ReferenceType,
        query: &[f32],
        limit: usize,
    ) -> anyhow::Result<Vec<ScoredVector>> {
        let Some(candidates) = self.by_shop.get(shop_id) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(OrderedFloat<f32>, DateTime<Utc>, String)> = candidates
            .iter()
            .filter(|v| v.reference_type == reference_type)
            .map(|v| {
                (
                    OrderedFloat(cosine_similarity(query, &v.values)),
                    v.created_at,
                    v.reference_id.clone(),
                )
            })
            .collect();

        // Score descending, then most recent first on ties
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, created_at, reference_id)| ScoredVector {
                reference_id,
                score: score.0,
                created_at,
            })
            .collect())
    }

    async fn count(&self, shop_id: &str) -> anyhow::Result<usize> {
        Ok(self.by_shop.get(shop_id).map(|v| v.len()).unwrap_or(0))
    }
}

// =============================================================================
// KNOWLEDGE CHUNKS
// =============================================================================

/// A unit of reference text ingested for similarity search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    /// Shop-scoped namespace, `{shopId}-kb`
    pub namespace: String,
    pub chunk_id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// Knowledge-chunk persistence boundary (external collaborator)
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Insert or replace a chunk; returns true if an existing chunk with the
    /// same namespace and id was replaced
    async fn upsert(&self, chunk: KnowledgeChunk) -> anyhow::Result<bool>;

    async fn list(&self, namespace: &str) -> anyhow::Result<Vec<KnowledgeChunk>>;

    async fn count(&self, namespace: &str) -> anyhow::Result<usize>;
}

/// In-memory chunk store
#[derive(Default)]
pub struct MemoryChunkStore {
    by_namespace: DashMap<String, HashMap<String, KnowledgeChunk>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn upsert(&self, chunk: KnowledgeChunk) -> anyhow::Result<bool> {
        let mut ns = self.by_namespace.entry(chunk.namespace.clone()).or_default();
        Ok(ns.insert(chunk.chunk_id.clone(), chunk).is_some())
    }

    async fn list(&self, namespace: &str) -> anyhow::Result<Vec<KnowledgeChunk>> {
        let Some(ns) = self.by_namespace.get(namespace) else {
            return Ok(Vec::new());
        };
        let mut chunks: Vec<KnowledgeChunk> = ns.values().cloned().collect();
        chunks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(chunks)
    }

    async fn count(&self, namespace: &str) -> anyhow::Result<usize> {
        Ok(self
            .by_namespace
            .get(namespace)
            .map(|ns| ns.len())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(shop: &str, ref_id: &str, values: Vec<f32>) -> EmbeddingVector {
        EmbeddingVector {
            id: Uuid::new_v4(),
            shop_id: shop.to_string(),
            reference_type: ReferenceType::KnowledgeBase,
            reference_id: ref_id.to_string(),
            values,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 0.001);

        // Mismatched lengths and zero vectors score zero
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_search_is_shop_scoped() {
        let store = MemoryVectorStore::new();
        store.insert(vector("shop-a", "a1", vec![1.0, 0.0])).await.unwrap();
        store.insert(vector("shop-b", "b1", vec![1.0, 0.0])).await.unwrap();

        let hits = store
            .search("shop-a", ReferenceType::KnowledgeBase, &[1.0, 0.0], 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].reference_id, "a1");
    }

    #[tokio::test]
    async fn test_search_orders_by_score_desc() {
        let store = MemoryVectorStore::new();
        store.insert(vector("s", "far", vec![0.0, 1.0])).await.unwrap();
        store.insert(vector("s", "near", vec![1.0, 0.1])).await.unwrap();
        store.insert(vector("s", "mid", vec![0.7, 0.7])).await.unwrap();

        let hits = store
            .search("s", ReferenceType::KnowledgeBase, &[1.0, 0.0], 10)
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.reference_id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);
    }

    #[tokio::test]
    async fn test_search_tie_break_most_recent_first() {
        let store = MemoryVectorStore::new();
        let mut older = vector("s", "older", vec![1.0, 0.0]);
        older.created_at = Utc::now() - chrono::Duration::hours(1);
        let newer = vector("s", "newer", vec![1.0, 0.0]);
        store.insert(older).await.unwrap();
        store.insert(newer).await.unwrap();

        let hits = store
            .search("s", ReferenceType::KnowledgeBase, &[1.0, 0.0], 10)
            .await
            .unwrap();
        assert_eq!(hits[0].reference_id, "newer");
        assert_eq!(hits[1].reference_id, "older");
    }

    #[tokio::test]
    async fn test_search_respects_limit() {
        let store = MemoryVectorStore::new();
        for i in 0..7 {
            store
                .insert(vector("s", &format!("v{i}"), vec![1.0, i as f32 * 0.1]))
                .await
                .unwrap();
        }
        let hits = store
            .search("s", ReferenceType::KnowledgeBase, &[1.0, 0.0], 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 5);
    }

    #[tokio::test]
    async fn test_replace_removes_prior_vector() {
        let store = MemoryVectorStore::new();
        store.replace(vector("s", "chunk-1", vec![1.0, 0.0])).await.unwrap();
        store.replace(vector("s", "chunk-1", vec![0.0, 1.0])).await.unwrap();

        assert_eq!(store.count("s").await.unwrap(), 1);
        let hits = store
            .search("s", ReferenceType::KnowledgeBase, &[0.0, 1.0], 10)
            .await
            .unwrap();
        assert!((hits[0].score - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_chunk_upsert_replaces() {
        let store = MemoryChunkStore::new();
        let chunk = KnowledgeChunk {
            namespace: "shop-1-kb".into(),
            chunk_id: "c1".into(),
            content: "original".into(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
        };
        assert!(!store.upsert(chunk.clone()).await.unwrap());

        let mut updated = chunk;
        updated.content = "revised".into();
        assert!(store.upsert(updated).await.unwrap());

        assert_eq!(store.count("shop-1-kb").await.unwrap(), 1);
        let listed = store.list("shop-1-kb").await.unwrap();
        assert_eq!(listed[0].content, "revised");
    }
}
