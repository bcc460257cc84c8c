/// Embedder trait and shared types for text embedding.
///
/// The embedding model itself lives outside this crate; callers plug one in
/// behind [`Embedder`].
pub mod mock;

use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmbedderError {
    #[error("embedding request failed: {0}")]
    RequestFailed(String),

    #[error("embedding request timed out")]
    Timeout,

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow concurrent use
/// behind `Arc`. Every vector returned over the lifetime of one index must
/// have [`Embedder::dimensions`] components.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;

    /// Identifier recorded in the index manifest.
    fn model_name(&self) -> &str {
        "unknown"
    }
}
