use clap::{Parser, Subcommand};
use clinical_scribe::commands::{
    ingest_knowledge_base, list_knowledge_bases, remove_knowledge_base, run_batch, run_section,
    search_knowledge_base, show_history, show_status,
};
use clinical_scribe::config::{Config, resolve_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "clinical-scribe")]
#[command(about = "Generate clinical note sections from visit transcripts and reference examples")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the local databases
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Generate one note section
    Run {
        /// Section to generate: history, review-of-systems, physical-exam, assessment-plan or generic
        section: String,
        /// Speech-to-text transcript JSON
        transcript: PathBuf,
        /// Knowledge base CSV with a header row
        knowledge_base: PathBuf,
        /// Print the section without saving it
        #[arg(long)]
        no_save: bool,
    },
    /// Generate several sections from one transcript
    Batch {
        transcript: PathBuf,
        knowledge_base: PathBuf,
        /// Sections to generate, all of them when omitted
        #[arg(long, value_delimiter = ',')]
        sections: Vec<String>,
        #[arg(long)]
        no_save: bool,
    },
    /// Embed and register a knowledge base without generating anything
    Ingest {
        knowledge_base: PathBuf,
        /// Name to register under instead of the file stem
        #[arg(long)]
        name: Option<String>,
    },
    /// Show the reference chunks retrieved for a query
    Search {
        knowledge_base: PathBuf,
        query: String,
    },
    /// List registered knowledge bases
    List,
    /// Delete a knowledge base and its entries
    Remove {
        /// Registered knowledge base name
        name: String,
    },
    /// Print previously saved sections of one kind
    History {
        section: String,
    },
    /// Show connectivity and storage status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = resolve_config_dir(cli.config_dir.as_deref())?;

    if let Commands::Config { show } = cli.command {
        if show {
            show_config(&config_dir)?;
        } else {
            run_interactive_config(&config_dir)?;
        }
        return Ok(());
    }

    let config = Config::load(&config_dir)?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::Run {
            section,
            transcript,
            knowledge_base,
            no_save,
        } => {
            run_section(&config, &section, &transcript, &knowledge_base, !no_save).await?;
        }
        Commands::Batch {
            transcript,
            knowledge_base,
            sections,
            no_save,
        } => {
            run_batch(&config, &sections, &transcript, &knowledge_base, !no_save).await?;
        }
        Commands::Ingest {
            knowledge_base,
            name,
        } => {
            ingest_knowledge_base(&config, &knowledge_base, name.as_deref()).await?;
        }
        Commands::Search {
            knowledge_base,
            query,
        } => {
            search_knowledge_base(&config, &knowledge_base, &query).await?;
        }
        Commands::List => {
            list_knowledge_bases(&config).await?;
        }
        Commands::Remove { name } => {
            remove_knowledge_base(&config, &name).await?;
        }
        Commands::History { section } => {
            show_history(&config, &section).await?;
        }
        Commands::Status => {
            show_status(&config).await?;
        }
    }

    Ok(())
}
