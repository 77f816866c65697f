// Embeddings module
// Ollama integration, the embedding capability, and corpus chunking

pub mod chunking;
pub mod ollama;

use anyhow::Result;

pub use chunking::{
    ChunkingConfig, ContentChunk, CorpusSection, chunk_sections, estimate_token_count, word_count,
};
pub use ollama::OllamaClient;

/// Turns text into dense vectors for the knowledge index
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving input order
    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}
