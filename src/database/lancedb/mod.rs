// LanceDB vector database module
// Handles vector storage and cosine similarity search for knowledge entries


pub mod vector_store;

use serde::{Deserialize, Serialize};

pub use vector_store::{SearchResult, VectorStore};

/// Embedding record stored in LanceDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Unique identifier for this embedding, shared with the SQLite entry row
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: EntryMetadata,
}

/// Knowledge entry fields stored alongside its embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Position of the entry within its knowledge base, used to break distance ties
    pub ordinal: u32,
    /// SQLite id of the owning knowledge base
    pub knowledge_base_id: i64,
    pub knowledge_base: String,
    pub category: Option<String>,
    /// 0-based CSV data row, absent for whole-document entries
    pub source_row: Option<u32>,
    pub content: String,
    pub token_count: u32,
    pub created_at: String,
}
