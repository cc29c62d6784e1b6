
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Result, ScholarError};

/// Configuration for sliding-window word chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size in whitespace-separated words
    pub chunk_size: usize,
    /// Number of words shared by adjacent windows
    pub overlap: usize,
    /// Chunks shorter than this many characters are dropped before embedding
    pub min_chunk_chars: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
            min_chunk_chars: 100,
        }
    }
}

impl ChunkingConfig {
    /// Number of words a window advances by
    #[inline]
    pub fn step(&self) -> Result<usize> {
        if self.chunk_size == 0 {
            return Err(ScholarError::InvalidConfig(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(ScholarError::InvalidConfig(format!(
                "overlap ({}) must be smaller than chunk size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(self.chunk_size - self.overlap)
    }
}

/// Split `text` into overlapping windows of `chunk_size` words.
///
/// Windows advance by `chunk_size - overlap` words and are joined with single
/// spaces. The last window may be shorter. A new window is only started while
/// the previous one has not reached the end of the text, so a text of `n > overlap`
/// words yields `ceil((n - overlap) / (chunk_size - overlap))` windows.
#[inline]
pub fn chunk_words(text: &str, config: &ChunkingConfig) -> Result<Vec<String>> {
    let step = config.step()?;
    let words: Vec<&str> = text.split_whitespace().collect();

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + config.chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }

    debug!(
        "Chunked {} words into {} windows (size {}, overlap {})",
        words.len(),
        chunks.len(),
        config.chunk_size,
        config.overlap
    );

    Ok(chunks)
}

/// Chunk `text` and drop windows below the configured minimum length
#[inline]
pub fn chunk_for_embedding(text: &str, config: &ChunkingConfig) -> Result<Vec<String>> {
    Ok(chunk_words(text, config)?
        .into_iter()
        .map(|chunk| chunk.trim().to_string())
        .filter(|chunk| chunk.chars().count() >= config.min_chunk_chars)
        .collect())
}

/// Estimate token count for text.
///
/// This is a fixed heuristic, not a tokenizer encoding: words divided by 0.75
/// plus a tenth of a token per ASCII punctuation mark. Real counts for a given
/// model can differ in either direction.
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    let word_count = text.split_whitespace().count();
    let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();

    (punct_count as f64).mul_add(0.1, word_count as f64 / 0.75) as usize
}

/// Truncate to at most `max_chars` characters, respecting char boundaries
#[inline]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
