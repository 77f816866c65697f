// Text nodes flowing between the knowledge index and the retriever


use uuid::Uuid;

use crate::database::lancedb::{EmbeddingRecord, EntryMetadata};
use crate::embeddings::chunking::estimate_token_count;
use crate::knowledge::corpus::KnowledgeEntry;

/// A piece of text with an identity and, optionally, its embedding
pub trait Node {
    fn node_id(&self) -> &str;
    fn content(&self) -> &str;
    fn set_content(&mut self, content: String);
    fn embedding(&self) -> Option<&[f32]>;
}

/// A knowledge entry paired with its vector, ready for the index
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedEntry {
    node_id: String,
    entry: KnowledgeEntry,
    content: String,
    vector: Vec<f32>,
}

impl EmbeddedEntry {
    #[inline]
    pub fn new(entry: KnowledgeEntry, vector: Vec<f32>) -> Self {
        Self {
            node_id: Uuid::new_v4().to_string(),
            content: entry.text.clone(),
            entry,
            vector,
        }
    }

    #[inline]
    pub fn entry(&self) -> &KnowledgeEntry {
        &self.entry
    }

    #[inline]
    pub fn to_record(&self, knowledge_base_id: i64, knowledge_base: &str) -> EmbeddingRecord {
        EmbeddingRecord {
            id: self.node_id.clone(),
            vector: self.vector.clone(),
            metadata: EntryMetadata {
                ordinal: u32::try_from(self.entry.ordinal).unwrap_or(u32::MAX),
                knowledge_base_id,
                knowledge_base: knowledge_base.to_string(),
                category: Some(self.entry.metadata.category.clone()),
                source_row: self
                    .entry
                    .metadata
                    .source_row
                    .map(|row| u32::try_from(row).unwrap_or(u32::MAX)),
                content: self.content.clone(),
                token_count: u32::try_from(estimate_token_count(&self.content))
                    .unwrap_or(u32::MAX),
                created_at: chrono::Utc::now().to_rfc3339(),
            },
        }
    }
}

impl Node for EmbeddedEntry {
    #[inline]
    fn node_id(&self) -> &str {
        &self.node_id
    }

    #[inline]
    fn content(&self) -> &str {
        &self.content
    }

    #[inline]
    fn set_content(&mut self, content: String) {
        self.content = content;
    }

    #[inline]
    fn embedding(&self) -> Option<&[f32]> {
        Some(&self.vector)
    }
}

/// A search hit whose text may be rewritten before prompting
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedNode {
    node_id: String,
    pub ordinal: usize,
    content: String,
    /// Cosine distance, lower is more relevant
    pub distance: f32,
    pub category: Option<String>,
    pub source_row: Option<usize>,
}

impl RetrievedNode {
    #[inline]
    pub fn new(node_id: impl Into<String>, ordinal: usize, content: impl Into<String>, distance: f32) -> Self {
        Self {
            node_id: node_id.into(),
            ordinal,
            content: content.into(),
            distance,
            category: None,
            source_row: None,
        }
    }
}

impl Node for RetrievedNode {
    #[inline]
    fn node_id(&self) -> &str {
        &self.node_id
    }

    #[inline]
    fn content(&self) -> &str {
        &self.content
    }

    #[inline]
    fn set_content(&mut self, content: String) {
        self.content = content;
    }

    #[inline]
    fn embedding(&self) -> Option<&[f32]> {
        None
    }
}
