//! Prompt assembly. Only retrieved chunk text and its source paths go in.
use std::fmt::Write;

use crate::index::ScoredChunk;

/// The fixed reply for questions the folder cannot answer.
pub const REFUSAL: &str = "I don't know based on the files.";

pub const SYSTEM_PROMPT: &str = "\
You are Augustus, an assistant that answers questions about the contents of a folder.

Rules:
1. Answer ONLY using information from the numbered context passages below.
2. If the context does not contain the answer, reply exactly: \"I don't know based on the files.\"
3. Never guess and never use outside knowledge.
4. Do not speculate. Avoid words such as \"probably\", \"likely\", \"might\" or \"I think\".
5. Cite the passages you use with their markers, for example [1], and name the file.
6. Be concise and factual.";

/// Render the full prompt for `question` over `chunks`, numbered from 1.
#[must_use]
pub fn build_qa_prompt(question: &str, chunks: &[ScoredChunk]) -> String {
    let mut prompt = String::with_capacity(
        SYSTEM_PROMPT.len() + chunks.iter().map(|c| c.chunk.text.len() + 64).sum::<usize>(),
    );
    prompt.push_str(SYSTEM_PROMPT);
    prompt.push_str("\n\nContext:\n");

    for (i, hit) in chunks.iter().enumerate() {
        // Writing to a String cannot fail.
        let _ = writeln!(
            prompt,
            "\n[{}] {} (chunk {})\n{}",
            i + 1,
            hit.chunk.source_path,
            hit.chunk.chunk_index,
            hit.chunk.text.trim_end()
        );
    }

    let _ = write!(prompt, "\nQuestion: {}\n\nAnswer:", question.trim());
    prompt
}
