// Knowledge base module
// Loads tabular reference corpora, embeds them and answers similarity queries


pub mod corpus;
pub mod node;

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::lancedb::{SearchResult, VectorStore};
use crate::database::sqlite::{
    Database, KnowledgeBaseRecord, KnowledgeBaseStatus, NewKnowledgeBase, NewKnowledgeEntry,
};
use crate::embeddings::Embedder;
use crate::{Result, ScribeError};

pub use corpus::{Corpus, CorpusConfig, Granularity, KnowledgeEntry, KnowledgeMetadata};
pub use node::{EmbeddedEntry, Node, RetrievedNode};

/// Entries embedded per request during ingestion
const INGEST_BATCH_SIZE: usize = 32;

/// Outcome of registering a corpus with the knowledge base
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub record: KnowledgeBaseRecord,
    /// False when an already registered knowledge base was reused
    pub inserted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalHit {
    pub entry: KnowledgeEntry,
    pub node_id: String,
    /// Cosine distance, lower is more relevant
    pub distance: f32,
}

impl From<SearchResult> for RetrievalHit {
    #[inline]
    fn from(result: SearchResult) -> Self {
        let metadata = result.metadata;
        Self {
            entry: KnowledgeEntry {
                ordinal: usize::try_from(metadata.ordinal).unwrap_or(usize::MAX),
                text: metadata.content,
                metadata: KnowledgeMetadata {
                    category: metadata.category.unwrap_or(metadata.knowledge_base),
                    source_row: metadata
                        .source_row
                        .map(|row| usize::try_from(row).unwrap_or(usize::MAX)),
                },
            },
            node_id: result.entry_id,
            distance: result.distance,
        }
    }
}

/// Search hits in ascending distance order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    hits: Vec<RetrievalHit>,
}

impl RetrievalResult {
    /// Wrap hits, restoring ascending distance order
    #[inline]
    pub fn from_hits(mut hits: Vec<RetrievalHit>) -> Self {
        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.entry.ordinal.cmp(&b.entry.ordinal))
                .then_with(|| a.node_id.cmp(&b.node_id))
        });
        Self { hits }
    }

    #[inline]
    pub fn hits(&self) -> &[RetrievalHit] {
        &self.hits
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    #[inline]
    pub fn into_nodes(self) -> Vec<RetrievedNode> {
        self.hits
            .into_iter()
            .map(|hit| {
                let mut node = RetrievedNode::new(
                    hit.node_id,
                    hit.entry.ordinal,
                    hit.entry.text,
                    hit.distance,
                );
                node.category = Some(hit.entry.metadata.category);
                node.source_row = hit.entry.metadata.source_row;
                node
            })
            .collect()
    }
}

/// Named corpora backed by SQLite bookkeeping and a LanceDB vector index
pub struct KnowledgeBase {
    database: Database,
    vectors: VectorStore,
    embedder: Arc<dyn Embedder>,
    dedup_on_insert: bool,
}

impl std::fmt::Debug for KnowledgeBase {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("database", &self.database)
            .field("vector_dimension", &self.vectors.vector_dimension())
            .field("dedup_on_insert", &self.dedup_on_insert)
            .finish_non_exhaustive()
    }
}

impl KnowledgeBase {
    #[inline]
    pub fn new(
        database: Database,
        vectors: VectorStore,
        embedder: Arc<dyn Embedder>,
        dedup_on_insert: bool,
    ) -> Self {
        Self {
            database,
            vectors,
            embedder,
            dedup_on_insert,
        }
    }

    /// Open the database and vector index under the configured base directory
    #[inline]
    pub async fn open(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let database = Database::initialize_from_config_dir(config.get_base_dir())
            .await
            .map_err(persistence)?;
        let vectors = VectorStore::new(config).await?;

        Ok(Self::new(
            database,
            vectors,
            embedder,
            config.corpus.dedup_on_insert,
        ))
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Embed and index a corpus
    ///
    /// With dedup on, a ready registration of the same name is reused only when its
    /// source path, granularity and content fingerprint all match the corpus; any
    /// other registration under the name is dropped and the corpus ingested afresh.
    #[inline]
    pub async fn ingest(&mut self, corpus: &Corpus) -> Result<IngestOutcome> {
        if self.dedup_on_insert {
            let existing = self
                .database
                .knowledge_bases_named(corpus.name())
                .await
                .map_err(persistence)?;

            let source_path = corpus.source_path().display().to_string();
            let granularity = corpus.granularity().as_str();
            let fingerprint = corpus.fingerprint();

            if let Some(ready) = existing.iter().rev().find(|kb| {
                kb.is_ready()
                    && kb.source_path == source_path
                    && kb.granularity == granularity
                    && kb.fingerprint == fingerprint
            }) {
                debug!(
                    "Knowledge base {} already registered as #{}, skipping ingestion",
                    ready.name, ready.id
                );
                return Ok(IngestOutcome {
                    record: ready.clone(),
                    inserted: false,
                });
            }

            // Interrupted ingestions and registrations of other content under this name
            for stale in existing {
                warn!(
                    "Replacing knowledge base {} #{} ({}, {})",
                    stale.name, stale.id, stale.status, stale.source_path
                );
                self.drop_record(stale.id).await?;
            }
        }

        let record = self
            .database
            .create_knowledge_base(NewKnowledgeBase {
                name: corpus.name().to_string(),
                source_path: corpus.source_path().display().to_string(),
                granularity: corpus.granularity().as_str().to_string(),
                fingerprint: corpus.fingerprint(),
            })
            .await
            .map_err(persistence)?;

        info!(
            "Ingesting knowledge base {} #{} ({} entries)",
            record.name,
            record.id,
            corpus.len()
        );

        match self.populate(&record, corpus).await {
            Ok(count) => {
                let count = i64::try_from(count).unwrap_or(i64::MAX);
                self.database
                    .mark_knowledge_base_ready(record.id, count)
                    .await
                    .map_err(persistence)?;

                let mut record = record;
                record.status = KnowledgeBaseStatus::Ready;
                record.entry_count = count;

                info!("Knowledge base {} #{} is ready", record.name, record.id);
                Ok(IngestOutcome {
                    record,
                    inserted: true,
                })
            }
            Err(e) => {
                warn!(
                    "Ingestion of knowledge base {} #{} failed: {}",
                    record.name, record.id, e
                );
                if let Err(cleanup) = self.vectors.delete_knowledge_base_embeddings(record.id).await
                {
                    warn!("Failed to remove partial embeddings: {}", cleanup);
                }
                if let Err(mark) = self.database.mark_knowledge_base_failed(record.id).await {
                    warn!("Failed to mark knowledge base as failed: {}", mark);
                }
                Err(e)
            }
        }
    }

    async fn populate(&mut self, record: &KnowledgeBaseRecord, corpus: &Corpus) -> Result<usize> {
        let bar = ingest_progress_bar(corpus.len());
        bar.set_message(record.name.clone());

        let mut stored = 0;
        for batch in corpus.entries().chunks(INGEST_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|entry| entry.text.clone()).collect();
            let vectors = self
                .embedder
                .embed_batch(&texts)
                .map_err(|e| ScribeError::Embedding(format!("{e:#}")))?;

            if vectors.len() != batch.len() {
                return Err(ScribeError::Embedding(format!(
                    "Expected {} embeddings, received {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            let nodes: Vec<EmbeddedEntry> = batch
                .iter()
                .cloned()
                .zip(vectors)
                .map(|(entry, vector)| EmbeddedEntry::new(entry, vector))
                .collect();

            self.vectors
                .store_embeddings_batch(
                    nodes
                        .iter()
                        .map(|node| node.to_record(record.id, &record.name))
                        .collect(),
                )
                .await?;

            let rows = nodes
                .iter()
                .map(|node| NewKnowledgeEntry {
                    knowledge_base_id: record.id,
                    ordinal: i64::try_from(node.entry().ordinal).unwrap_or(i64::MAX),
                    content: node.entry().text.clone(),
                    category: Some(node.entry().metadata.category.clone()),
                    source_row: node
                        .entry()
                        .metadata
                        .source_row
                        .map(|row| i64::try_from(row).unwrap_or(i64::MAX)),
                    vector_id: node.node_id().to_string(),
                })
                .collect();
            self.database
                .insert_knowledge_entries(rows)
                .await
                .map_err(persistence)?;

            stored += nodes.len();
            bar.set_position(u64::try_from(stored).unwrap_or(u64::MAX));
        }

        bar.finish_and_clear();
        Ok(stored)
    }

    /// Most recent ready registration under `name`
    #[inline]
    pub async fn find(&self, name: &str) -> Result<Option<KnowledgeBaseRecord>> {
        let records = self
            .database
            .knowledge_bases_named(name)
            .await
            .map_err(persistence)?;

        Ok(records.into_iter().rev().find(KnowledgeBaseRecord::is_ready))
    }

    #[inline]
    pub async fn list(&self) -> Result<Vec<KnowledgeBaseRecord>> {
        self.database
            .list_knowledge_bases()
            .await
            .map_err(persistence)
    }

    /// Entries of a knowledge base in ordinal order
    #[inline]
    pub async fn entries(&self, record: &KnowledgeBaseRecord) -> Result<Vec<KnowledgeEntry>> {
        let rows = self
            .database
            .knowledge_entries(record.id)
            .await
            .map_err(persistence)?;

        Ok(rows
            .into_iter()
            .map(|row| KnowledgeEntry {
                ordinal: usize::try_from(row.ordinal).unwrap_or_default(),
                text: row.content,
                metadata: KnowledgeMetadata {
                    category: row.category.unwrap_or_else(|| record.name.clone()),
                    source_row: row.source_row.and_then(|r| usize::try_from(r).ok()),
                },
            })
            .collect())
    }

    /// Nearest entries to `query` by cosine distance, ascending
    #[inline]
    pub async fn search(
        &self,
        record: &KnowledgeBaseRecord,
        query: &str,
        limit: usize,
    ) -> Result<RetrievalResult> {
        if limit == 0 {
            return Ok(RetrievalResult::default());
        }

        if self.vectors.count_embeddings(Some(record.id)).await? == 0 {
            debug!("Knowledge base {} is empty, nothing to search", record.name);
            return Ok(RetrievalResult::default());
        }

        let query_vector = self
            .embedder
            .embed(query)
            .map_err(|e| ScribeError::Embedding(format!("{e:#}")))?;

        let results = self
            .vectors
            .search_similar(&query_vector, limit, Some(record.id))
            .await?;

        debug!(
            "Search over {} returned {} results",
            record.name,
            results.len()
        );

        let hits = results.into_iter().map(RetrievalHit::from).collect();

        Ok(RetrievalResult::from_hits(hits))
    }

    /// Delete every registration under `name` with all of its entries
    #[inline]
    pub async fn remove(&mut self, name: &str) -> Result<usize> {
        let records = self
            .database
            .knowledge_bases_named(name)
            .await
            .map_err(persistence)?;

        for record in &records {
            self.drop_record(record.id).await?;
        }

        if !records.is_empty() {
            info!("Removed {} registrations of knowledge base {}", records.len(), name);
        }
        Ok(records.len())
    }

    async fn drop_record(&mut self, id: i64) -> Result<()> {
        self.vectors.delete_knowledge_base_embeddings(id).await?;
        self.database
            .delete_knowledge_base(id)
            .await
            .map_err(persistence)?;
        Ok(())
    }
}

fn persistence(e: anyhow::Error) -> ScribeError {
    ScribeError::Persistence(format!("{e:#}"))
}

fn ingest_progress_bar(len: usize) -> ProgressBar {
    if console::user_attended_stderr() {
        ProgressBar::new(u64::try_from(len).unwrap_or(u64::MAX)).with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        )
    } else {
        ProgressBar::hidden()
    }
}
