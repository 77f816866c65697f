use anyhow::{Context, Result, bail};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::Config;
use crate::database::lancedb::VectorStore;
use crate::database::sqlite::Database;
use crate::embeddings::{Embedder, OllamaClient};
use crate::knowledge::{Corpus, KnowledgeBase, Node};
use crate::pipeline::NotePipeline;
use crate::retriever::Retriever;
use crate::section::SectionKind;
use crate::store::SqliteResultStore;

async fn open_knowledge_base(config: &Config) -> Result<KnowledgeBase> {
    let client: Arc<dyn Embedder> =
        Arc::new(OllamaClient::new(config).context("Failed to create Ollama client")?);
    KnowledgeBase::open(config, client)
        .await
        .context("Failed to open knowledge base")
}

/// Generate one note section and print it
#[inline]
pub async fn run_section(
    config: &Config,
    section: &str,
    transcript: &Path,
    knowledge_base: &Path,
    save: bool,
) -> Result<()> {
    let kind: SectionKind = section.parse()?;
    info!("Generating {} section for {}", kind, transcript.display());

    let mut pipeline = NotePipeline::open(config, save).await?;
    let text = pipeline
        .run(kind.as_str(), transcript, knowledge_base)
        .await
        .with_context(|| format!("Failed to generate {} section", kind))?;

    println!("{}", text);
    Ok(())
}

/// Generate several sections over one retrieval
#[inline]
pub async fn run_batch(
    config: &Config,
    sections: &[String],
    transcript: &Path,
    knowledge_base: &Path,
    save: bool,
) -> Result<()> {
    let kinds = if sections.is_empty() {
        SectionKind::ALL.to_vec()
    } else {
        sections
            .iter()
            .map(|s| s.parse::<SectionKind>())
            .collect::<crate::Result<Vec<_>>>()?
    };

    let mut pipeline = NotePipeline::open(config, save).await?;
    let outcomes = pipeline
        .run_batch(&kinds, transcript, knowledge_base)
        .await?;

    let mut failed = 0;
    for outcome in &outcomes {
        println!("## {}", outcome.kind.title());
        println!();
        match &outcome.result {
            Ok(text) => println!("{}", text),
            Err(e) => {
                failed += 1;
                error!("{} section failed: {}", outcome.kind, e);
                println!("❌ Generation failed: {}", e);
            }
        }
        println!();
    }

    if failed > 0 {
        bail!("{} of {} sections failed", failed, outcomes.len());
    }
    Ok(())
}

/// Load, embed and register a knowledge base file
#[inline]
pub async fn ingest_knowledge_base(
    config: &Config,
    path: &Path,
    name: Option<&str>,
) -> Result<()> {
    let corpus = match name {
        Some(name) => Corpus::load_named(path, name, &config.corpus, &config.chunking)?,
        None => Corpus::load(path, &config.corpus, &config.chunking)?,
    };

    let mut knowledge_base = open_knowledge_base(config).await?;
    let outcome = knowledge_base.ingest(&corpus).await?;

    if outcome.inserted {
        println!(
            "Ingested knowledge base: {} (ID: {})",
            outcome.record.name, outcome.record.id
        );
    } else {
        println!(
            "Knowledge base already registered: {} (ID: {})",
            outcome.record.name, outcome.record.id
        );
    }
    println!("   Entries: {}", outcome.record.entry_count);
    println!("   Granularity: {}", outcome.record.granularity);
    Ok(())
}

/// Print the reference chunks a query would hand to a prompt
#[inline]
pub async fn search_knowledge_base(config: &Config, path: &Path, query: &str) -> Result<()> {
    let corpus = Corpus::load(path, &config.corpus, &config.chunking)?;
    let mut knowledge_base = open_knowledge_base(config).await?;
    let record = knowledge_base.ingest(&corpus).await?.record;

    let retriever = Retriever::new(config.retrieval.clone());
    let context = retriever.retrieve(&knowledge_base, &record, query).await?;

    if context.nodes.is_empty() {
        println!("No matching entries in {}.", record.name);
        return Ok(());
    }

    println!("Results from {} ({} kept):", record.name, context.nodes.len());
    println!();
    for (rank, node) in context.nodes.iter().enumerate() {
        println!(
            "{}. [{}] distance {:.4}",
            rank + 1,
            node.category.as_deref().unwrap_or(&record.name),
            node.distance
        );
        for line in node.content().lines() {
            println!("   {}", line);
        }
        println!();
    }
    Ok(())
}

/// List registered knowledge bases
#[inline]
pub async fn list_knowledge_bases(config: &Config) -> Result<()> {
    let database = Database::initialize_from_config_dir(config.get_base_dir()).await?;
    let records = database.list_knowledge_bases().await?;

    if records.is_empty() {
        println!("No knowledge bases have been ingested yet.");
        println!("Use 'clinical-scribe ingest <file.csv>' to add one.");
        return Ok(());
    }

    println!("Knowledge Bases ({} total):", records.len());
    println!();
    for record in &records {
        println!("📚 {} (ID: {})", record.name, record.id);
        println!("   Source: {}", record.source_path);
        println!("   Status: {}", record.status);
        println!("   Entries: {}", record.entry_count);
        println!("   Granularity: {}", record.granularity);
        println!("   Created: {}", record.created_date.format("%Y-%m-%d %H:%M:%S"));
        println!();
    }
    Ok(())
}

/// Delete a knowledge base and all its entries
#[inline]
pub async fn remove_knowledge_base(config: &Config, name: &str) -> Result<()> {
    let mut knowledge_base = open_knowledge_base(config).await?;
    let removed = knowledge_base.remove(name).await?;

    if removed == 0 {
        bail!("Knowledge base '{}' not found", name);
    }
    println!("Removed knowledge base: {}", name);
    Ok(())
}

/// Print saved sections of one category, oldest first
#[inline]
pub async fn show_history(config: &Config, section: &str) -> Result<()> {
    let kind: SectionKind = section.parse()?;
    let store = SqliteResultStore::open(config.get_base_dir()).await?;
    let records = store.records(kind).await?;

    if records.is_empty() {
        println!("No {} sections have been saved yet.", kind);
        return Ok(());
    }

    println!("{} ({} saved):", kind.title(), records.len());
    println!();
    for record in &records {
        println!(
            "#{} at {}",
            record.id,
            record.created_date.format("%Y-%m-%d %H:%M:%S")
        );
        println!("{}", record.text);
        println!();
    }
    Ok(())
}

/// Check connectivity of the model provider and both databases
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("📊 Clinical Scribe Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🗄️  Database Status:");
    match Database::initialize_from_config_dir(config.get_base_dir()).await {
        Ok(database) => {
            println!("   ✅ SQLite: Connected");
            let records = database.list_knowledge_bases().await?;
            let ready = records.iter().filter(|r| r.is_ready()).count();
            println!("   📚 Knowledge bases: {} ({} ready)", records.len(), ready);
            for kind in SectionKind::ALL {
                let saved = database.sections(kind.as_str()).await?.len();
                println!("   📝 {}: {} saved", kind, saved);
            }
        }
        Err(e) => {
            println!("   ❌ SQLite: Failed to connect - {}", e);
        }
    }

    println!("🤖 Ollama Status:");
    match OllamaClient::new(config) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Embedding model: {}", config.ollama.embedding_model);
                println!("   ✍️  Generation model: {}", config.ollama.generation_model);
            }
            Err(e) => {
                println!("   ⚠️  Ollama: Connected but unhealthy - {}", e);
            }
        },
        Err(e) => {
            println!("   ❌ Ollama: Failed to connect - {}", e);
        }
    }

    println!("🔍 Vector Database Status:");
    match VectorStore::new(config).await {
        Ok(store) => {
            println!("   ✅ LanceDB: Connected");
            println!("   🔢 Dimension: {}", store.vector_dimension());
            println!("   📊 Embeddings: {}", store.count_embeddings(None).await?);
        }
        Err(e) => {
            println!("   ❌ LanceDB: Failed to connect - {}", e);
        }
    }

    Ok(())
}
