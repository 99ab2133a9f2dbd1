//! Embedding generation module
//!
//! Turns damage descriptions and knowledge-base chunks into fixed-dimension
//! vectors for similarity search. The production implementation calls a
//! remote OpenAI-compatible embeddings endpoint; tests inject stubs through
//! the `Embedder` trait.

pub mod remote;

pub use remote::RemoteEmbedder;

use async_trait::async_trait;

/// Trait for embedding generation
///
/// Batch semantics: output[i] corresponds to input[i], every vector has
/// exactly `dimension()` components, and a partial failure fails the whole
/// batch — callers must not persist vectors from a failed batch.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, preserving order
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Get embedding dimension
    fn dimension(&self) -> usize;

    /// Embed a single text (default: batch of one)
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut batch = self.embed_batch(&[text.to_string()]).await?;
        batch
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedding batch returned no vectors"))
    }
}
