use thiserror::Error;

use crate::index::IndexError;
use crate::ingest::chunker::ChunkerError;
use crate::qa::QaError;
use crate::scan::WalkError;

/// Errors surfaced by the command surface in [`crate::service::Augustus`].
#[derive(Error, Debug)]
pub enum AugustusError {
    #[error(transparent)]
    Walk(#[from] WalkError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Qa(#[from] QaError),

    #[error(transparent)]
    Chunker(#[from] ChunkerError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no index has been built for this folder")]
    NoIndex,

    #[error("indexing worker failed: {0}")]
    Worker(String),
}

impl From<tokio::task::JoinError> for AugustusError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Worker(e.to_string())
    }
}
