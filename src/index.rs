//! In-memory vector index with cosine-similarity search.
//!
//! A [`VectorIndex`] is only ever produced whole: [`VectorIndex::build`]
//! checks that every chunk has exactly one embedding and that all embeddings
//! share a dimension, so callers never see a half-populated index.

use crate::embeddings::{EmbeddedChunk, Embedding};
use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One stored chunk and its vector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub chunk_index: usize,
    pub text: String,
    pub vector: Vec<f32>,
}

/// A retrieved chunk with its similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub text: String,
    pub chunk_index: usize,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Build an index from embedded chunks
    pub fn build(embedded: Vec<EmbeddedChunk>) -> Result<Self> {
        let dimension = embedded
            .first()
            .map(|e| e.embedding.values.len())
            .unwrap_or(0);

        let mut entries = Vec::with_capacity(embedded.len());
        for EmbeddedChunk { chunk, embedding } in embedded {
            if embedding.values.len() != dimension || dimension == 0 {
                return Err(RagError::VectorStore(format!(
                    "chunk {} has an embedding of dimension {}, expected {}",
                    chunk.chunk_index,
                    embedding.values.len(),
                    dimension
                )));
            }
            entries.push(IndexEntry {
                chunk_index: chunk.chunk_index,
                text: chunk.text,
                vector: embedding.values,
            });
        }

        Ok(VectorIndex { dimension, entries })
    }

    /// Dimension of every stored vector, 0 for an empty index
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Return the `k` entries most similar to `query`, best first
    pub fn search(&self, query: &Embedding, k: usize) -> Result<Vec<ScoredChunk>> {
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }
        if query.values.len() != self.dimension {
            return Err(RagError::VectorStore(format!(
                "query embedding has dimension {}, index has {}",
                query.values.len(),
                self.dimension
            )));
        }

        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                text: entry.text.clone(),
                chunk_index: entry.chunk_index,
                score: cosine_similarity(&entry.vector, &query.values),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

/// Cosine similarity; 0.0 when either vector has zero magnitude
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
