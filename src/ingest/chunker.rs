use std::fmt;

use serde::Serialize;
use thiserror::Error;

use super::loader::{DocumentId, LoadedDocument};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChunkerError {
    #[error("chunk_size must be positive")]
    ZeroChunkSize,

    #[error("chunk_overlap ({overlap}) must be smaller than chunk_size ({size})")]
    OverlapTooLarge { overlap: usize, size: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Target chunk length in characters.
    pub chunk_size: usize,
    /// Characters repeated at the start of the next chunk.
    pub chunk_overlap: usize,
    /// How far back from the target size a natural boundary is searched for.
    pub boundary_tolerance: usize,
}

impl ChunkerConfig {
    #[must_use]
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            boundary_tolerance: chunk_size / 4,
        }
    }

    pub fn validate(&self) -> Result<(), ChunkerError> {
        if self.chunk_size == 0 {
            return Err(ChunkerError::ZeroChunkSize);
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ChunkerError::OverlapTooLarge {
                overlap: self.chunk_overlap,
                size: self.chunk_size,
            });
        }
        Ok(())
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

/// Position of a chunk inside its document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ChunkId {
    pub document_id: DocumentId,
    pub index: usize,
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.document_id.short(), self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub document_id: DocumentId,
    pub source_path: String,
    /// 0-based, dense within the document.
    pub index: usize,
    pub text: String,
    /// Character offsets into the document content, half-open.
    pub start_char: usize,
    pub end_char: usize,
}

impl Chunk {
    #[must_use]
    pub fn id(&self) -> ChunkId {
        ChunkId {
            document_id: self.document_id.clone(),
            index: self.index,
        }
    }
}

/// Splits documents into overlapping chunks that prefer natural boundaries.
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Result<Self, ChunkerError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split a document. Whitespace-only documents produce no chunks.
    #[must_use]
    pub fn split(&self, document: &LoadedDocument) -> Vec<Chunk> {
        let chars: Vec<char> = document.content.chars().collect();
        self.spans(&chars)
            .into_iter()
            .filter_map(|(start, end)| {
                let text: String = chars[start..end].iter().collect();
                (!text.trim().is_empty()).then_some((text, start, end))
            })
            .enumerate()
            .map(|(index, (text, start, end))| Chunk {
                document_id: document.id.clone(),
                source_path: document.relative_path.clone(),
                index,
                text,
                start_char: start,
                end_char: end,
            })
            .collect()
    }

    /// Split plain text into chunk strings.
    #[must_use]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        self.spans(&chars)
            .into_iter()
            .map(|(start, end)| chars[start..end].iter().collect::<String>())
            .filter(|chunk| !chunk.trim().is_empty())
            .collect()
    }

    /// Character spans `[start, end)` covering `chars`.
    fn spans(&self, chars: &[char]) -> Vec<(usize, usize)> {
        let len = chars.len();
        if chars.iter().all(|c| c.is_whitespace()) {
            return Vec::new();
        }

        let size = self.config.chunk_size.max(1);
        if len <= size {
            return vec![(0, len)];
        }

        let overlap = self.config.chunk_overlap.min(size - 1);
        // Keep each step moving forward by at least one character.
        let tolerance = self
            .config
            .boundary_tolerance
            .min(size.saturating_sub(overlap + 1));

        let mut spans = Vec::new();
        let mut start = 0;
        loop {
            let limit = start + size;
            if limit >= len {
                spans.push((start, len));
                break;
            }

            let end = find_boundary(chars, start, limit, tolerance).unwrap_or(limit);
            spans.push((start, end));
            start = end.saturating_sub(overlap).max(start + 1);
        }
        spans
    }
}

/// Best cut position in `(limit - tolerance, limit]`, by boundary strength:
/// paragraph break, line break, sentence end, whitespace.
fn find_boundary(chars: &[char], start: usize, limit: usize, tolerance: usize) -> Option<usize> {
    let lo = limit.saturating_sub(tolerance).max(start + 1);
    let candidates = || (lo..=limit).rev();

    let is_paragraph = |cut: usize| cut >= 2 && chars[cut - 1] == '\n' && chars[cut - 2] == '\n';
    let is_line = |cut: usize| chars[cut - 1] == '\n';
    let is_sentence = |cut: usize| {
        matches!(chars[cut - 1], '.' | '!' | '?' | '。' | '！' | '？')
            && chars.get(cut).is_none_or(|c| c.is_whitespace() || !c.is_ascii())
    };
    let is_space = |cut: usize| chars[cut - 1].is_whitespace();

    candidates()
        .find(|&cut| is_paragraph(cut))
        .or_else(|| candidates().find(|&cut| is_line(cut)))
        .or_else(|| candidates().find(|&cut| is_sentence(cut)))
        .or_else(|| candidates().find(|&cut| is_space(cut)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str) -> LoadedDocument {
        LoadedDocument {
            id: DocumentId::compute("test.txt", content),
            relative_path: "test.txt".to_string(),
            content: content.to_string(),
            size_bytes: content.len() as u64,
            extension: "txt".to_string(),
        }
    }

    fn chunker(size: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkerConfig::new(size, overlap)).unwrap()
    }

    #[test]
    fn test_split_short_text() {
        let chunks = chunker(100, 20).split(&doc("Hello world"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello world");
        assert_eq!(chunks[0].index, 0);
        assert_eq!((chunks[0].start_char, chunks[0].end_char), (0, 11));
    }

    #[test]
    fn test_split_long_text() {
        let content = "word ".repeat(500);
        let chunks = chunker(500, 50).split(&doc(&content));
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert!(chunk.text.chars().count() <= 500);
            assert_eq!(chunk.source_path, "test.txt");
        }
    }

    #[test]
    fn test_split_empty_text() {
        assert!(chunker(100, 20).split(&doc("")).is_empty());
        assert!(chunker(100, 20).split_text("").is_empty());
    }

    #[test]
    fn test_whitespace_only() {
        assert!(chunker(100, 20).split(&doc("   \n\n   \n\n   ")).is_empty());
    }

    #[test]
    fn test_chunk_overlap() {
        let content = format!("{} {} {}", "A".repeat(300), "B".repeat(300), "C".repeat(300));
        let chunks = chunker(400, 100).split(&doc(&content));
        assert!(chunks.len() >= 2);
        for pair in chunks.windows(2) {
            assert!(pair[1].start_char < pair[0].end_char, "chunks should overlap");
            assert!(pair[1].start_char > pair[0].start_char, "chunks should advance");
        }
    }

    #[test]
    fn test_prefers_paragraph_break() {
        let first = "First paragraph sentence. ".repeat(3);
        let content = format!("{}\n\n{}", first.trim_end(), "Second paragraph text. ".repeat(5));
        let cut = first.trim_end().chars().count() + 2;
        let chunks = chunker(cut + 10, 0).split(&doc(&content));
        assert_eq!(chunks[0].end_char, cut);
        assert!(chunks[0].text.ends_with("\n\n"));
        assert!(chunks[1].text.starts_with("Second"));
    }

    #[test]
    fn test_prefers_sentence_over_space() {
        let content = "Alpha beta gamma. Delta epsilon zeta eta theta iota kappa";
        let chunks = Chunker::new(ChunkerConfig {
            chunk_size: 30,
            chunk_overlap: 0,
            boundary_tolerance: 15,
        })
        .unwrap()
        .split(&doc(content));
        assert_eq!(chunks[0].text, "Alpha beta gamma.");
    }

    #[test]
    fn test_hard_cut_without_boundary() {
        let content = "x".repeat(250);
        let chunks = chunker(100, 0).split(&doc(&content));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text.len(), 100);
        assert_eq!(chunks[2].end_char, 250);
    }

    #[test]
    fn test_offsets_reconstruct_text() {
        let content = "Line one.\nLine two is longer.\n\nA new paragraph begins here. ".repeat(20);
        let chars: Vec<char> = content.chars().collect();
        for chunk in chunker(120, 30).split(&doc(&content)) {
            let slice: String = chars[chunk.start_char..chunk.end_char].iter().collect();
            assert_eq!(slice, chunk.text);
        }
    }

    #[test]
    fn test_split_japanese() {
        let content = "これは日本語のテストです。".repeat(100);
        let chunks = chunker(500, 50).split(&doc(&content));
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(!chunk.text.is_empty());
            assert!(chunk.text.ends_with('。') || chunk.end_char == content.chars().count());
        }
    }

    #[test]
    fn test_deterministic() {
        let content = "Some repeated text.\n".repeat(200);
        let a = chunker(256, 32).split(&doc(&content));
        let b = chunker(256, 32).split(&doc(&content));
        assert_eq!(a, b);
    }

    #[test]
    fn test_chunk_id_display() {
        let d = doc("Short content");
        let chunk = &chunker(1000, 100).split(&d)[0];
        assert_eq!(chunk.id().to_string(), format!("{}_0", d.id.short()));
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(
            Chunker::new(ChunkerConfig::new(0, 0)).unwrap_err(),
            ChunkerError::ZeroChunkSize
        );
        assert!(matches!(
            Chunker::new(ChunkerConfig::new(100, 100)),
            Err(ChunkerError::OverlapTooLarge { .. })
        ));
        let config = ChunkerConfig::default();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.boundary_tolerance, 250);
    }

    mod proptest_chunker {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(256))]

            #[test]
            fn split_never_panics(
                content in "\\PC{0,2000}",
                size in 1usize..400,
                overlap_pct in 0usize..100,
            ) {
                let overlap = size * overlap_pct / 100;
                let c = Chunker::new(ChunkerConfig::new(size, overlap.min(size - 1))).unwrap();
                let _ = c.split(&doc(&content));
            }

            #[test]
            fn chunks_cover_document(
                content in "[a-z .\n]{1,1500}",
                size in 10usize..300,
            ) {
                let c = chunker(size, size / 5);
                let chunks = c.split(&doc(&content));
                let len = content.chars().count();
                if content.trim().is_empty() {
                    prop_assert!(chunks.is_empty());
                } else {
                    prop_assert!(!chunks.is_empty());
                    prop_assert!(chunks.iter().all(|ch| ch.end_char - ch.start_char <= size));
                    prop_assert!(chunks.last().unwrap().end_char <= len);
                    for (i, ch) in chunks.iter().enumerate() {
                        prop_assert_eq!(ch.index, i);
                    }
                }
            }

            #[test]
            fn short_documents_yield_one_chunk(
                content in "[a-zA-Z][a-zA-Z ]{0,99}",
            ) {
                let chunks = chunker(100, 10).split(&doc(&content));
                prop_assert_eq!(chunks.len(), 1);
                prop_assert_eq!(&chunks[0].text, &content);
            }
        }
    }
}
