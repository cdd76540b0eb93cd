//! Embedding provider trait for generating vector embeddings from text.

use async_trait::async_trait;
use tracing::{debug, error};

use crate::document::Chunk;
use crate::error::{RagError, Result};

/// A provider that generates vector embeddings from text input.
///
/// Implementations must be deterministic for a given configuration: the
/// same text always maps to the same vector, and every vector has
/// [`dimensions`](EmbeddingProvider::dimensions) components.
///
/// The default [`embed_batch`](EmbeddingProvider::embed_batch) calls
/// [`embed`](EmbeddingProvider::embed) sequentially; backends that support
/// native batching should override it.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A short provider name for logs and error messages.
    fn name(&self) -> &str;
}

/// Embed every chunk, failing the whole batch if the provider fails or
/// returns the wrong number of vectors.
pub async fn embed_chunks(
    provider: &dyn EmbeddingProvider,
    chunks: &[Chunk],
) -> Result<Vec<Vec<f32>>> {
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    debug!(provider = provider.name(), batch_size = texts.len(), "embedding chunks");
    let vectors = provider.embed_batch(&texts).await?;

    if vectors.len() != chunks.len() {
        error!(
            provider = provider.name(),
            expected = chunks.len(),
            actual = vectors.len(),
            "embedding count mismatch"
        );
        return Err(RagError::embedding(
            provider.name(),
            format!("expected {} vectors, got {}", chunks.len(), vectors.len()),
        ));
    }
    Ok(vectors)
}
