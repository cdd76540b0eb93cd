//! Read-only in-memory similarity index.
//!
//! A [`SimilarityIndex`] is built once from one upload batch and never
//! modified; a new batch builds a new index. Sessions hold it behind an
//! `Arc` and swap it wholesale.

use tracing::{debug, warn};

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};

/// Chunks paired 1:1 with their embedding vectors, searchable by cosine
/// similarity.
///
/// # Example
///
/// ```rust
/// use sherlock_rag::{Chunker, Document, FixedSizeChunker, SimilarityIndex};
///
/// let chunks = FixedSizeChunker::new(5, 0).unwrap().chunk(&Document::new("a.txt", "aaaaabbbbb"));
/// let index = SimilarityIndex::build(chunks, vec![vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
/// let hits = index.query(&[0.1, 0.9], 1);
/// assert_eq!(hits[0].chunk.text, "bbbbb");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SimilarityIndex {
    entries: Vec<(Chunk, Vec<f32>)>,
    dimensions: usize,
}

impl SimilarityIndex {
    /// The index with no chunks. Every query returns nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an index from chunks and their vectors, in the same order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if the counts differ or the
    /// vectors do not all have the same dimension.
    pub fn build(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if chunks.len() != vectors.len() {
            return Err(RagError::InvalidConfiguration(format!(
                "index needs one vector per chunk: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }

        let dimensions = vectors.first().map_or(0, Vec::len);
        if let Some((position, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dimensions) {
            return Err(RagError::InvalidConfiguration(format!(
                "vector {position} has dimension {}, expected {dimensions}",
                v.len()
            )));
        }

        debug!(chunks = chunks.len(), dimensions, "built similarity index");
        Ok(Self { entries: chunks.into_iter().zip(vectors).collect(), dimensions })
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dimension shared by every vector (0 for the empty index).
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// All indexed chunks in insertion order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|(chunk, _)| chunk)
    }

    /// The `k` chunks most similar to `vector`, best first.
    ///
    /// `k` is clamped to the index size. Ties keep insertion order, so the
    /// earlier chunk wins. A query whose dimension differs from the index
    /// scores zero against every chunk.
    pub fn query(&self, vector: &[f32], k: usize) -> Vec<SearchResult> {
        let k = k.min(self.entries.len());
        if k == 0 {
            return Vec::new();
        }
        if vector.len() != self.dimensions {
            warn!(
                query_dimensions = vector.len(),
                index_dimensions = self.dimensions,
                "query dimension does not match index"
            );
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, (_, v))| (position, cosine_similarity(vector, v)))
            .collect();
        // Stable: equal scores keep insertion order. NaN ranks below everything.
        scored.sort_by(|a, b| rank(b.1).total_cmp(&rank(a.1)));

        scored
            .into_iter()
            .take(k)
            .map(|(position, score)| SearchResult { chunk: self.entries[position].0.clone(), score })
            .collect()
    }
}

fn rank(score: f32) -> f32 {
    if score.is_nan() { f32::NEG_INFINITY } else { score }
}

/// Cosine similarity in `[-1, 1]`. Returns 0.0 if either vector has zero
/// magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}
