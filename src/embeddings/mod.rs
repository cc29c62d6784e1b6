// Embeddings module
// Text chunking plus the embedding capability used by indexing and retrieval

pub mod chunking;
pub mod ollama;

pub use chunking::{
    ChunkingConfig, chunk_for_embedding, chunk_words, estimate_token_count, truncate_chars,
};
pub use ollama::OllamaClient;

use crate::Result;

/// Maps text to fixed-length vectors.
///
/// Implementations are built once per process and shared behind an `Arc`,
/// so they must be safe for concurrent read-only use.
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder returns
    fn dimension(&self) -> usize;

    /// Embed a single non-empty text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving input order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}
