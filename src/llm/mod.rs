//! Language-model seam used by the answer assembler.
pub mod mock;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("completion request failed: {0}")]
    RequestFailed(String),

    #[error("completion request timed out")]
    Timeout,

    #[error("model returned an empty completion")]
    EmptyResponse,
}

/// Renders text from a prompt. Implementations are treated as unreliable and
/// are never trusted to report whether their answer is grounded.
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}
