//! Token-bounded, overlapping line chunking.
//!
//! Lines are accumulated greedily until the next line would push the chunk
//! past `max_chunk_size` tokens. The following chunk is seeded with a suffix
//! of the previous chunk's lines worth at most `chunk_overlap` tokens, trimmed
//! from the front until the incoming line fits beside it. Chunks below
//! `min_chunk_size` tokens are dropped.
//!
//! Output depends only on the policy and the text, so identical input always
//! yields identical chunk boundaries and checksums.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{compute_checksum, Chunk};

/// Approximate characters per token.
const CHARS_PER_TOKEN: usize = 4;

/// Chunk size limits, in estimated tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingPolicy {
    pub max_chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_size: usize,
}

impl Default for ChunkingPolicy {
    fn default() -> Self {
        Self {
            max_chunk_size: 512,
            chunk_overlap: 64,
            min_chunk_size: 50,
        }
    }
}

/// Estimate the token count of one line: `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Splits file text into [`Chunk`]s.
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    policy: ChunkingPolicy,
}

impl Chunker {
    pub fn new(policy: ChunkingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ChunkingPolicy {
        &self.policy
    }

    /// Chunk `text` belonging to `file_path`.
    pub fn chunk_content(&self, file_path: &str, text: &str) -> Vec<Chunk> {
        let lines: Vec<&str> = text.lines().collect();
        let tokens: Vec<usize> = lines.iter().map(|l| estimate_tokens(l)).collect();
        let max = self.policy.max_chunk_size;

        let mut chunks = Vec::new();
        // Indices of lines in the chunk under construction
        let mut current: Vec<usize> = Vec::new();
        let mut current_tokens = 0;

        for (idx, &line_tokens) in tokens.iter().enumerate() {
            if !current.is_empty() && current_tokens + line_tokens > max {
                self.emit(file_path, &lines, &current, current_tokens, &mut chunks);

                // An oversized line starts a fresh chunk on its own
                let (seed, seed_tokens) = if line_tokens > max {
                    (Vec::new(), 0)
                } else {
                    let budget = self.policy.chunk_overlap.min(max - line_tokens);
                    self.overlap_seed(&current, &tokens, budget)
                };
                current = seed;
                current_tokens = seed_tokens;
            }

            current.push(idx);
            current_tokens += line_tokens;
        }

        if !current.is_empty() {
            self.emit(file_path, &lines, &current, current_tokens, &mut chunks);
        }

        debug!("Chunked {} into {} chunks", file_path, chunks.len());
        chunks
    }

    /// Longest suffix of `current` whose tokens fit in `budget`.
    fn overlap_seed(
        &self,
        current: &[usize],
        tokens: &[usize],
        budget: usize,
    ) -> (Vec<usize>, usize) {
        let mut seed = Vec::new();
        let mut seed_tokens = 0;
        for &idx in current.iter().rev() {
            if seed_tokens + tokens[idx] > budget {
                break;
            }
            seed.push(idx);
            seed_tokens += tokens[idx];
        }
        seed.reverse();
        (seed, seed_tokens)
    }

    fn emit(
        &self,
        file_path: &str,
        lines: &[&str],
        indices: &[usize],
        token_count: usize,
        chunks: &mut Vec<Chunk>,
    ) {
        let (Some(&first), Some(&last)) = (indices.first(), indices.last()) else {
            return;
        };
        if token_count < self.policy.min_chunk_size {
            debug!(
                "Dropping chunk {}:{}-{} ({} tokens)",
                file_path,
                first + 1,
                last + 1,
                token_count
            );
            return;
        }

        let content = lines[first..=last].join("\n");
        let start_line = first + 1;
        let end_line = last + 1;
        chunks.push(Chunk {
            id: format!("{}:{}-{}", file_path, start_line, end_line),
            checksum: compute_checksum(&content),
            content,
            file_path: file_path.to_string(),
            start_line,
            end_line,
        });
    }
}
