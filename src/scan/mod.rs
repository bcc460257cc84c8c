//! Folder scanning: ignore rules and the deterministic walker.
pub mod matcher;
pub mod walker;

pub use matcher::{DEFAULT_IGNORE_PATTERNS, IgnoreMatcher, IgnoreMatcherBuilder, RejectedPattern};
pub use walker::{FileDescriptor, FileWalker, TraversalIssue, WalkError, WalkOutcome};
