// Note pipeline
// transcript -> knowledge base retrieval -> section generation -> result store

#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::embeddings::{ChunkingConfig, Embedder, OllamaClient};
use crate::generation::SectionGenerator;
use crate::knowledge::{Corpus, CorpusConfig, KnowledgeBase};
use crate::retriever::{RetrievedContext, Retriever};
use crate::section::SectionKind;
use crate::store::{ResultStore, SqliteResultStore};
use crate::transcript::{Transcript, load_transcript};
use crate::{Result, ScribeError};

/// Result of one section within a batch run
#[derive(Debug)]
pub struct SectionOutcome {
    pub kind: SectionKind,
    pub result: Result<String>,
}

impl SectionOutcome {
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct NotePipeline {
    knowledge_base: KnowledgeBase,
    retriever: Retriever,
    generator: SectionGenerator,
    store: Option<Arc<dyn ResultStore>>,
    corpus: CorpusConfig,
    chunking: ChunkingConfig,
}

impl std::fmt::Debug for NotePipeline {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotePipeline")
            .field("knowledge_base", &self.knowledge_base)
            .field("retriever", &self.retriever)
            .field("store", &self.store.is_some())
            .field("corpus", &self.corpus)
            .finish_non_exhaustive()
    }
}

impl NotePipeline {
    #[inline]
    pub fn new(
        config: &Config,
        knowledge_base: KnowledgeBase,
        generator: SectionGenerator,
    ) -> Self {
        Self {
            knowledge_base,
            retriever: Retriever::new(config.retrieval.clone()),
            generator,
            store: None,
            corpus: config.corpus.clone(),
            chunking: config.chunking.clone(),
        }
    }

    #[inline]
    pub fn with_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Wire the Ollama client, knowledge base and (optionally) the SQLite store
    #[inline]
    pub async fn open(config: &Config, save: bool) -> Result<Self> {
        let client = Arc::new(
            OllamaClient::new(config).map_err(|e| ScribeError::Config(format!("{e:#}")))?,
        );

        let embedder = Arc::clone(&client) as Arc<dyn Embedder>;
        let knowledge_base = KnowledgeBase::open(config, embedder).await?;
        let generator = SectionGenerator::new(client);
        let pipeline = Self::new(config, knowledge_base, generator);

        if save {
            let store = SqliteResultStore::new(pipeline.knowledge_base.database().clone());
            Ok(pipeline.with_store(Arc::new(store)))
        } else {
            Ok(pipeline)
        }
    }

    #[inline]
    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.knowledge_base
    }

    /// Generate one section; the kind is parsed before anything is read
    #[inline]
    pub async fn run(
        &mut self,
        section_kind: &str,
        transcript_path: &Path,
        knowledge_base_path: &Path,
    ) -> Result<String> {
        let kind: SectionKind = section_kind.parse()?;
        let (transcript, context) = self.prepare(transcript_path, knowledge_base_path).await?;

        let text = self
            .generator
            .generate(kind, &transcript.text(), &context.text)?;
        self.persist(kind, &text).await?;

        Ok(text)
    }

    /// Generate several sections over one retrieval, reporting each separately
    #[inline]
    pub async fn run_batch(
        &mut self,
        kinds: &[SectionKind],
        transcript_path: &Path,
        knowledge_base_path: &Path,
    ) -> Result<Vec<SectionOutcome>> {
        let (transcript, context) = self.prepare(transcript_path, knowledge_base_path).await?;
        let transcript_text = transcript.text();

        let mut outcomes = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            let result = match self.generator.generate(kind, &transcript_text, &context.text) {
                Ok(text) => self.persist(kind, &text).await.map(|()| text),
                Err(e) => Err(e.into()),
            };

            if let Err(e) = &result {
                warn!("Section {} failed: {}", kind, e);
            }
            outcomes.push(SectionOutcome { kind, result });
        }

        let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
        info!(
            "Batch finished: {} of {} sections generated",
            succeeded,
            outcomes.len()
        );
        Ok(outcomes)
    }

    /// Load both inputs, register the corpus and retrieve against the transcript
    async fn prepare(
        &mut self,
        transcript_path: &Path,
        knowledge_base_path: &Path,
    ) -> Result<(Transcript, RetrievedContext)> {
        let transcript = load_transcript(transcript_path)?;
        if transcript.is_empty() {
            warn!("Transcript {} has no utterances", transcript_path.display());
        }

        let corpus = Corpus::load(knowledge_base_path, &self.corpus, &self.chunking)?;
        let record = self.knowledge_base.ingest(&corpus).await?.record;

        let context = self
            .retriever
            .retrieve(&self.knowledge_base, &record, &transcript.text())
            .await?;

        info!(
            "Retrieved {} reference chunks from {}",
            context.nodes.len(),
            record.name
        );
        Ok((transcript, context))
    }

    async fn persist(&self, kind: SectionKind, text: &str) -> Result<()> {
        if let Some(store) = &self.store {
            store.save(kind, text).await?;
        }
        Ok(())
    }
}
