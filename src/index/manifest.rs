use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One file that made it into the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedFile {
    pub relative_path: String,
    pub document_id: String,
    pub size_bytes: u64,
    pub chunks: usize,
}

/// Describes a built index: where it came from and what it holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub root: String,
    pub dimensions: usize,
    pub model: String,
    pub built_at: DateTime<Utc>,
    /// Sorted by `relative_path`.
    pub files: Vec<IndexedFile>,
}

impl IndexManifest {
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.files.iter().map(|f| f.chunks).sum()
    }

    #[must_use]
    pub fn contains(&self, relative_path: &str) -> bool {
        self.files
            .binary_search_by(|f| f.relative_path.as_str().cmp(relative_path))
            .is_ok()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.relative_path.as_str())
    }
}
