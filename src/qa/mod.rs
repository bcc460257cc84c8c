//! Question answering over a published index.
pub mod answer;
pub mod prompt;
pub mod retriever;

use thiserror::Error;

use crate::embedder::EmbedderError;
use crate::index::IndexError;
use crate::llm::LlmError;

pub use answer::{AnswerAssembler, AnswerResult, Citation};
pub use retriever::Retriever;

/// Query-time failures. Finding no evidence is not one of them.
#[derive(Error, Debug)]
pub enum QaError {
    #[error("failed to embed question: {0}")]
    Embedding(#[from] EmbedderError),

    #[error("language model failed: {0}")]
    Model(#[from] LlmError),

    #[error("index query failed: {0}")]
    Index(#[from] IndexError),
}
