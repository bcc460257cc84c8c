//! In-memory vector index, its published snapshot, and the on-disk store.
pub mod handle;
pub mod manifest;
pub mod store;

use serde::Serialize;
use thiserror::Error;

use crate::ingest::chunker::{Chunk, ChunkId};

pub use handle::{IndexHandle, IndexSnapshot};
pub use manifest::{IndexManifest, IndexedFile};
pub use store::IndexStore;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("dimension mismatch: index holds {expected}-d vectors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid vector for chunk {chunk}: {reason}")]
    InvalidVector { chunk: String, reason: String },

    #[error("index dimensionality must be positive")]
    ZeroDimensions,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt index: {0}")]
    Corrupt(String),
}

/// Everything needed to cite a chunk without going back to the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkRef {
    pub chunk_id: ChunkId,
    pub source_path: String,
    pub chunk_index: usize,
    pub text: String,
    pub start_char: usize,
    pub end_char: usize,
}

impl From<&Chunk> for ChunkRef {
    fn from(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.id(),
            source_path: chunk.source_path.clone(),
            chunk_index: chunk.index,
            text: chunk.text.clone(),
            start_char: chunk.start_char,
            end_char: chunk.end_char,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: ChunkRef,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

/// A stored embedding and the chunk it stands for.
#[derive(Debug, Clone)]
pub struct IndexedVector {
    pub chunk: ChunkRef,
    embedding: Vec<f32>,
    norm: f32,
}

impl IndexedVector {
    #[must_use]
    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }
}

/// Insert / k-nearest-neighbour query over chunk embeddings.
pub trait VectorIndex: Send + Sync {
    fn dimensions(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&mut self, chunk: ChunkRef, embedding: Vec<f32>) -> Result<(), IndexError>;

    /// Up to `k` entries, best first. Fewer only when the index holds fewer.
    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError>;
}

/// Exact cosine search over every stored vector.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimensions: usize,
    entries: Vec<IndexedVector>,
}

impl FlatIndex {
    pub fn new(dimensions: usize) -> Result<Self, IndexError> {
        if dimensions == 0 {
            return Err(IndexError::ZeroDimensions);
        }
        Ok(Self {
            dimensions,
            entries: Vec::new(),
        })
    }

    /// Stored entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &IndexedVector> {
        self.entries.iter()
    }

    fn check_dimensions(&self, actual: usize) -> Result<(), IndexError> {
        if actual == self.dimensions {
            Ok(())
        } else {
            Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual,
            })
        }
    }
}

impl VectorIndex for FlatIndex {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn insert(&mut self, chunk: ChunkRef, embedding: Vec<f32>) -> Result<(), IndexError> {
        self.check_dimensions(embedding.len())?;
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(IndexError::InvalidVector {
                chunk: chunk.chunk_id.to_string(),
                reason: "non-finite component".to_string(),
            });
        }

        let norm = l2_norm(&embedding);
        self.entries.push(IndexedVector {
            chunk,
            embedding,
            norm,
        });
        Ok(())
    }

    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        self.check_dimensions(embedding.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_norm = l2_norm(embedding);
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, entry)| (pos, cosine(embedding, query_norm, &entry.embedding, entry.norm)))
            .collect();

        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(pos, score)| ScoredChunk {
                chunk: self.entries[pos].chunk.clone(),
                score,
            })
            .collect())
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Cosine similarity of two equal-length vectors; 0 when either is zero.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine(a, l2_norm(a), b, l2_norm(b))
}
