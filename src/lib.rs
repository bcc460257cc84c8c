//! # Augustus: evidence-first folder Q&A
//!
//! Indexes the text files of one folder and answers questions using only
//! what those files say. When nothing relevant is indexed the answer is an
//! explicit "I don't know based on the files." with no citations.
//!
//! ## Architecture
//!
//! - **[`scan`]**: gitignore-style ignore rules and the deterministic file walker
//! - **[`ingest`]**: document loading, stable identity, chunking, and the build pipeline
//! - **[`index`]**: exact cosine vector index, atomic snapshot publication, SQLite store
//! - **[`qa`]**: retrieval with a similarity floor and answer assembly with citations
//! - **[`embedder`]** / **[`llm`]**: seams for the external embedding and language models
//! - **[`service`]**: the build / list / answer command surface
//! - **[`config`]**: JSON configuration with defaults and validation

pub mod config;
pub mod embedder;
pub mod error;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod qa;
pub mod scan;
pub mod service;

pub use config::Config;
pub use error::AugustusError;
pub use qa::{AnswerResult, Citation};
pub use service::{Augustus, BuildOptions};
