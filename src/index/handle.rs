//! Atomic publication of built indexes.
//!
//! Readers clone an `Arc` to the current snapshot and keep using it for the
//! whole query, so a rebuild never shows them a half-filled index. Writers
//! build a complete [`IndexSnapshot`] off to the side and swap it in with
//! [`IndexHandle::publish`].
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::{FlatIndex, IndexManifest};

/// An immutable, fully built index together with its manifest.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    pub index: FlatIndex,
    pub manifest: IndexManifest,
}

#[derive(Debug, Default)]
pub struct IndexHandle {
    current: RwLock<Option<Arc<IndexSnapshot>>>,
}

impl IndexHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The snapshot published most recently, if any.
    pub fn snapshot(&self) -> Option<Arc<IndexSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the current snapshot and return the one it displaced.
    pub fn publish(&self, snapshot: IndexSnapshot) -> Option<Arc<IndexSnapshot>> {
        let next = Arc::new(snapshot);
        debug!(
            files = next.manifest.files.len(),
            chunks = next.manifest.chunk_count(),
            "publishing index snapshot"
        );
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        guard.replace(next)
    }

    /// Publish `snapshot` only when nothing is published yet.
    pub fn publish_if_empty(&self, snapshot: IndexSnapshot) -> Arc<IndexSnapshot> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(existing) => Arc::clone(existing),
            None => {
                let next = Arc::new(snapshot);
                *guard = Some(Arc::clone(&next));
                next
            }
        }
    }

    pub fn is_published(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
