//! Grounded answers with citations.
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use super::QaError;
use super::prompt::{REFUSAL, build_qa_prompt};
use crate::index::ScoredChunk;
use crate::llm::{LanguageModel, LlmError};

pub const DEFAULT_SNIPPET_CHARS: usize = 240;

static MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").unwrap());

/// Evidence for an answer, copied from a retrieved chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub path: String,
    pub chunk_index: usize,
    pub snippet: String,
    pub start_char: usize,
    pub end_char: usize,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerResult {
    pub text: String,
    pub citations: Vec<Citation>,
    /// `false` means the folder held no usable evidence.
    pub grounded: bool,
}

impl AnswerResult {
    #[must_use]
    pub fn insufficient_evidence() -> Self {
        Self {
            text: REFUSAL.to_string(),
            citations: Vec::new(),
            grounded: false,
        }
    }

    /// Distinct cited paths, in citation order.
    pub fn cited_paths(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.citations
            .iter()
            .map(|c| c.path.as_str())
            .filter(|p| seen.insert(*p))
            .collect()
    }
}

impl fmt::Display for AnswerResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)?;
        if self.citations.is_empty() {
            return Ok(());
        }
        f.write_str("\n\nSources:\n")?;
        for (i, c) in self.citations.iter().enumerate() {
            writeln!(f, "{}. {} (chunk {})", i + 1, c.path, c.chunk_index)?;
        }
        Ok(())
    }
}

/// Turns retrieved chunks into an answer through the language model.
pub struct AnswerAssembler<'a> {
    model: &'a dyn LanguageModel,
    snippet_chars: usize,
}

impl<'a> AnswerAssembler<'a> {
    pub fn new(model: &'a dyn LanguageModel) -> Self {
        Self {
            model,
            snippet_chars: DEFAULT_SNIPPET_CHARS,
        }
    }

    #[must_use]
    pub fn with_snippet_chars(mut self, snippet_chars: usize) -> Self {
        self.snippet_chars = snippet_chars;
        self
    }

    /// Answer `question` from `chunks` only. No chunks means no model call.
    pub fn answer(&self, question: &str, chunks: &[ScoredChunk]) -> Result<AnswerResult, QaError> {
        if chunks.is_empty() {
            info!("No evidence above the similarity floor");
            return Ok(AnswerResult::insufficient_evidence());
        }

        let prompt = build_qa_prompt(question, chunks);
        debug!(
            "Prompting {} with {} chunks ({} chars)",
            self.model.name(),
            chunks.len(),
            prompt.len()
        );
        let text = self.model.complete(&prompt)?;
        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse.into());
        }

        if is_refusal(&text) {
            return Ok(AnswerResult {
                text,
                citations: Vec::new(),
                grounded: false,
            });
        }

        let citations = referenced(&text, chunks)
            .into_iter()
            .map(|i| self.citation(&chunks[i]))
            .collect();

        Ok(AnswerResult {
            text,
            citations,
            grounded: true,
        })
    }

    fn citation(&self, hit: &ScoredChunk) -> Citation {
        Citation {
            path: hit.chunk.source_path.clone(),
            chunk_index: hit.chunk.chunk_index,
            snippet: truncate(hit.chunk.text.trim(), self.snippet_chars),
            start_char: hit.chunk.start_char,
            end_char: hit.chunk.end_char,
            score: hit.score,
        }
    }
}

fn is_refusal(text: &str) -> bool {
    let normalized = text.replace('\u{2019}', "'").to_lowercase();
    normalized.contains(REFUSAL.trim_end_matches('.').to_lowercase().as_str())
}

/// Positions of chunks the reply refers to by `[n]` marker or by path.
/// Falls back to every chunk when nothing can be attributed.
fn referenced(text: &str, chunks: &[ScoredChunk]) -> Vec<usize> {
    let mut picked = BTreeSet::new();

    for caps in MARKER.captures_iter(text) {
        if let Ok(n) = caps[1].parse::<usize>() {
            if (1..=chunks.len()).contains(&n) {
                picked.insert(n - 1);
            }
        }
    }

    for (i, hit) in chunks.iter().enumerate() {
        if mentions_path(text, &hit.chunk.source_path) {
            picked.insert(i);
        }
    }

    if picked.is_empty() {
        (0..chunks.len()).collect()
    } else {
        picked.into_iter().collect()
    }
}

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/' | '-')
}

/// Whether `path` appears in `text` as a whole token. A trailing `.` that ends
/// a sentence does not extend the path.
fn mentions_path(text: &str, path: &str) -> bool {
    if path.is_empty() {
        return false;
    }
    text.match_indices(path).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let mut after = text[start + path.len()..].chars();
        let clean_end = match after.next() {
            None => true,
            Some('.') => after.next().is_none_or(|c| !is_path_char(c)),
            Some(c) => !is_path_char(c),
        };
        before.is_none_or(|c| !is_path_char(c)) && clean_end
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    const SUFFIX: &str = "...";
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(SUFFIX.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(SUFFIX);
    out
}
