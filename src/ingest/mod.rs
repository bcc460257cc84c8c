//! Turning walked files into embedded chunks.
pub mod chunker;
pub mod loader;
pub mod pipeline;

pub use chunker::{Chunk, ChunkId, Chunker, ChunkerConfig, ChunkerError};
pub use loader::{DocumentId, DocumentLoader, LoadedDocument, SkipReason};
pub use pipeline::{BuildOutput, Indexer, IngestReport, SkippedFile};
