// Retriever
// Turns knowledge base hits into the reference text placed in a prompt

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;
use crate::database::sqlite::KnowledgeBaseRecord;
use crate::embeddings::chunking::word_count;
use crate::knowledge::{KnowledgeBase, Node, RetrievalResult, RetrievedNode};

/// How many retrieved chunks make it into the prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum TruncationPolicy {
    /// Keep the `k` nearest chunks
    TopK { k: usize },
    /// Append chunks until the text passes `max_words`
    WordBudget { max_words: usize },
}

impl Default for TruncationPolicy {
    #[inline]
    fn default() -> Self {
        TruncationPolicy::TopK { k: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Hits fetched from the index when truncating by word budget
    pub candidate_pool: usize,
    pub truncation: TruncationPolicy,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            candidate_pool: 10,
            truncation: TruncationPolicy::default(),
        }
    }
}

/// Rewrites retrieved text before it reaches a prompt
pub trait ChunkTransform: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, text: &str) -> String;
}

/// Marks reference cases as belonging to someone other than the current patient
#[derive(Debug, Clone, Copy, Default)]
pub struct PatientRelabel;

impl ChunkTransform for PatientRelabel {
    #[inline]
    fn name(&self) -> &'static str {
        "patient-relabel"
    }

    #[inline]
    fn apply(&self, text: &str) -> String {
        text.replace("Patient", "Other Patient")
    }
}

/// Retrieved chunks after transformation and truncation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievedContext {
    pub nodes: Vec<RetrievedNode>,
    /// Chunk texts joined by newlines
    pub text: String,
}

pub struct Retriever {
    config: RetrievalConfig,
    transforms: Vec<Box<dyn ChunkTransform>>,
}

impl std::fmt::Debug for Retriever {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("config", &self.config)
            .field(
                "transforms",
                &self.transforms.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Retriever {
    /// A retriever applying [`PatientRelabel`] to every chunk
    #[inline]
    pub fn new(config: RetrievalConfig) -> Self {
        Self::with_transforms(config, vec![Box::new(PatientRelabel)])
    }

    #[inline]
    pub fn with_transforms(
        config: RetrievalConfig,
        transforms: Vec<Box<dyn ChunkTransform>>,
    ) -> Self {
        Self { config, transforms }
    }

    #[inline]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Number of hits requested from the index
    #[inline]
    pub fn candidate_limit(&self) -> usize {
        match self.config.truncation {
            TruncationPolicy::TopK { k } => k,
            TruncationPolicy::WordBudget { .. } => self.config.candidate_pool,
        }
    }

    #[inline]
    pub async fn retrieve(
        &self,
        knowledge_base: &KnowledgeBase,
        record: &KnowledgeBaseRecord,
        query: &str,
    ) -> Result<RetrievedContext> {
        let result = knowledge_base
            .search(record, query, self.candidate_limit())
            .await?;
        Ok(self.assemble(result))
    }

    /// Transform each hit once, truncate, and join the survivors
    #[inline]
    pub fn assemble(&self, result: RetrievalResult) -> RetrievedContext {
        let mut nodes = result.into_nodes();
        for node in &mut nodes {
            for transform in &self.transforms {
                let rewritten = transform.apply(node.content());
                node.set_content(rewritten);
            }
        }

        let candidates = nodes.len();
        let nodes = truncate(self.config.truncation, nodes);
        let text = nodes
            .iter()
            .map(|node| node.content())
            .collect::<Vec<_>>()
            .join("\n");

        debug!(
            "Kept {} of {} retrieved chunks ({} words)",
            nodes.len(),
            candidates,
            word_count(&text)
        );

        RetrievedContext { nodes, text }
    }
}

/// Apply a truncation policy to nodes already in relevance order
#[inline]
pub fn truncate(policy: TruncationPolicy, mut nodes: Vec<RetrievedNode>) -> Vec<RetrievedNode> {
    match policy {
        TruncationPolicy::TopK { k } => {
            nodes.truncate(k);
            nodes
        }
        TruncationPolicy::WordBudget { max_words } => {
            let mut words = 0;
            let mut kept = 0;
            for node in &nodes {
                words += word_count(node.content());
                kept += 1;
                if words > max_words {
                    break;
                }
            }
            nodes.truncate(kept);
            nodes
        }
    }
}
