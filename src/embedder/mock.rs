/// Mock embedder for tests and offline use.
///
/// Produces hashed bag-of-words vectors: each lower-cased alphanumeric token
/// adds weight to one bucket, and the result is L2-normalized. Texts sharing
/// words get positive cosine similarity; unrelated texts score near zero.
use std::hash::{DefaultHasher, Hash, Hasher};

use super::{Embedder, EmbedderError};

/// A mock embedder that produces deterministic vectors from token hashes.
pub struct MockEmbedder {
    pub dimensions: usize,
}

impl MockEmbedder {
    /// Create a new `MockEmbedder` with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self { dimensions: 384 }
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        if self.dimensions == 0 {
            return Err(EmbedderError::ModelUnavailable(
                "mock embedder configured with zero dimensions".to_string(),
            ));
        }

        let mut embedding = vec![0.0f32; self.dimensions];
        for token in tokens(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimensions as u64) as usize;
            embedding[bucket] += 1.0;
        }

        // L2 normalize
        let norm_sq: f32 = embedding.iter().map(|v| v * v).sum();
        if norm_sq > 0.0 {
            let inv = 1.0 / norm_sq.sqrt();
            for v in &mut embedding {
                *v *= inv;
            }
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "mock-bag-of-words"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_mock_embed_dimensions() {
        let embedder = MockEmbedder::new(384);
        let result = embedder.embed("hello world").unwrap();
        assert_eq!(result.len(), 384);
    }

    #[test]
    fn test_mock_embed_deterministic() {
        let embedder = MockEmbedder::new(384);
        let a = embedder.embed("hello").unwrap();
        let b = embedder.embed("hello").unwrap();
        assert_eq!(a, b, "same input should produce same output");
    }

    #[test]
    fn test_mock_embed_normalized() {
        let embedder = MockEmbedder::new(384);
        let vec = embedder.embed("test normalization").unwrap();
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!(
            (norm - 1.0).abs() < 0.01,
            "vector should be approximately unit length, got {norm}"
        );
    }

    #[test]
    fn test_shared_words_score_higher() {
        let embedder = MockEmbedder::new(512);
        let doc = embedder.embed("Augustus indexes folders.").unwrap();
        let related = embedder.embed("which folders does augustus index").unwrap();
        let unrelated = embedder.embed("tomorrow rain forecast").unwrap();
        assert!(cosine(&doc, &related) > cosine(&doc, &unrelated));
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let embedder = MockEmbedder::new(128);
        assert_eq!(
            embedder.embed("Hello, World!").unwrap(),
            embedder.embed("hello world").unwrap()
        );
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = MockEmbedder::new(16);
        let vec = embedder.embed("  ...  ").unwrap();
        assert!(vec.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_mock_embed_batch() {
        let embedder = MockEmbedder::new(128);
        let results = embedder.embed_batch(&["a", "b", "c"]).unwrap();
        assert_eq!(results.len(), 3);
        for vec in &results {
            assert_eq!(vec.len(), 128);
        }
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(MockEmbedder::new(0).embed("x").is_err());
    }

    #[test]
    fn test_mock_default_dimensions() {
        let embedder = MockEmbedder::default();
        assert_eq!(embedder.dimensions(), 384);
    }
}
