use tracing::debug;

use super::QaError;
use crate::embedder::Embedder;
use crate::index::{ScoredChunk, VectorIndex};
use crate::scan::IgnoreMatcher;

/// Embeds a question and pulls the closest chunks above a similarity floor.
pub struct Retriever<'a> {
    embedder: &'a dyn Embedder,
    index: &'a dyn VectorIndex,
    matcher: Option<&'a IgnoreMatcher>,
}

impl<'a> Retriever<'a> {
    pub fn new(embedder: &'a dyn Embedder, index: &'a dyn VectorIndex) -> Self {
        Self {
            embedder,
            index,
            matcher: None,
        }
    }

    /// Drop chunks whose source path the matcher now ignores.
    #[must_use]
    pub fn with_matcher(mut self, matcher: &'a IgnoreMatcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Up to `k` chunks scoring at least `min_score`, best first.
    ///
    /// An empty result is a valid answer. A blank question returns it without
    /// calling the embedder.
    pub fn retrieve(
        &self,
        question: &str,
        k: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredChunk>, QaError> {
        if question.trim().is_empty() || k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(question)?;

        // With a matcher, filtered-out chunks must not crowd out valid ones.
        let fetch = if self.matcher.is_some() {
            self.index.len()
        } else {
            k
        };
        let candidates = self.index.query(&embedding, fetch)?;
        let total = candidates.len();

        let results: Vec<ScoredChunk> = candidates
            .into_iter()
            .filter(|hit| hit.score >= min_score)
            .filter(|hit| {
                self.matcher
                    .is_none_or(|m| !m.matches(&hit.chunk.source_path, false))
            })
            .take(k)
            .collect();

        debug!(
            "Retrieved {} of {} candidates (min_score {min_score})",
            results.len(),
            total
        );
        Ok(results)
    }
}
