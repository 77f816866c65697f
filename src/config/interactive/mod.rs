
use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{Config, ConfigError, OllamaConfig};
use crate::knowledge::corpus::Granularity;
use crate::retriever::{RetrievalConfig, TruncationPolicy};

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Clinical Scribe Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir)?;

    eprintln!("{}", style("Model Provider").bold().yellow());
    eprintln!("Configure the Ollama instance used for embeddings and note generation.");
    eprintln!();

    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Retrieval").bold().yellow());
    eprintln!("Choose how much knowledge base context is handed to each prompt.");
    eprintln!();

    configure_retrieval(&mut config.retrieval)?;
    configure_corpus(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_ollama_connection(&config.ollama)? {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("You can continue, but make sure Ollama is running before generating notes.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    eprintln!("  Host: {}", style(&config.ollama.host).cyan());
    eprintln!("  Port: {}", style(config.ollama.port).cyan());
    eprintln!(
        "  Embedding Model: {}",
        style(&config.ollama.embedding_model).cyan()
    );
    eprintln!(
        "  Generation Model: {}",
        style(&config.ollama.generation_model).cyan()
    );
    eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());
    eprintln!("  Timeout: {}s", style(config.ollama.timeout_secs).cyan());
    eprintln!(
        "  API Key: {}",
        style(if config.ollama.api_key().is_some() {
            "set"
        } else {
            "not set"
        })
        .cyan()
    );

    eprintln!();
    match config.ollama.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Retrieval Settings:").bold().yellow());
    eprintln!(
        "  Truncation: {}",
        style(describe_truncation(&config.retrieval.truncation)).cyan()
    );
    eprintln!(
        "  Candidate Pool: {}",
        style(config.retrieval.candidate_pool).cyan()
    );
    eprintln!(
        "  Corpus Granularity: {}",
        style(config.corpus.granularity.as_str()).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn describe_truncation(policy: &TruncationPolicy) -> String {
    match policy {
        TruncationPolicy::TopK { k } => format!("top {k} chunks"),
        TruncationPolicy::WordBudget { max_words } => format!("up to {max_words} words"),
    }
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Ok(Config::with_base_dir(config_dir))
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()?;
            Ok(())
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.embedding_model.clone())
        .validate_with(non_blank)
        .interact_text()?;

    let generation_model: String = Input::new()
        .with_prompt("Generation model")
        .default(ollama.generation_model.clone())
        .validate_with(non_blank)
        .interact_text()?;

    let timeout_secs: u64 = Input::new()
        .with_prompt("Request timeout in seconds")
        .default(ollama.timeout_secs)
        .validate_with(|input: &u64| -> Result<(), &str> {
            if (1..=600).contains(input) {
                Ok(())
            } else {
                Err("Timeout must be between 1 and 600 seconds")
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_embedding_model(embedding_model)?;
    ollama.set_generation_model(generation_model)?;
    ollama.set_timeout_secs(timeout_secs)?;

    Ok(())
}

#[allow(clippy::ptr_arg)]
fn non_blank(input: &String) -> Result<(), &'static str> {
    if input.trim().is_empty() {
        Err("Model name cannot be empty")
    } else {
        Ok(())
    }
}

fn configure_retrieval(retrieval: &mut RetrievalConfig) -> Result<()> {
    let policies = &["Top-k chunks", "Word budget"];
    let default_index = match retrieval.truncation {
        TruncationPolicy::TopK { .. } => 0,
        TruncationPolicy::WordBudget { .. } => 1,
    };

    let policy_index = Select::new()
        .with_prompt("Context truncation policy")
        .default(default_index)
        .items(policies)
        .interact()?;

    retrieval.truncation = if policy_index == 0 {
        let current = match retrieval.truncation {
            TruncationPolicy::TopK { k } => k,
            TruncationPolicy::WordBudget { .. } => 5,
        };
        let k: usize = Input::new()
            .with_prompt("Chunks per prompt")
            .default(current)
            .validate_with(|input: &usize| -> Result<(), &str> {
                if (1..=100).contains(input) {
                    Ok(())
                } else {
                    Err("Must be between 1 and 100")
                }
            })
            .interact_text()?;
        TruncationPolicy::TopK { k }
    } else {
        let current = match retrieval.truncation {
            TruncationPolicy::WordBudget { max_words } => max_words,
            TruncationPolicy::TopK { .. } => 3000,
        };
        let max_words: usize = Input::new()
            .with_prompt("Word budget per prompt")
            .default(current)
            .validate_with(|input: &usize| -> Result<(), &str> {
                if (1..=100_000).contains(input) {
                    Ok(())
                } else {
                    Err("Must be between 1 and 100000")
                }
            })
            .interact_text()?;
        TruncationPolicy::WordBudget { max_words }
    };

    Ok(())
}

fn configure_corpus(config: &mut Config) -> Result<()> {
    let granularities = Granularity::ALL;
    let labels: Vec<&str> = granularities.iter().map(|g| g.as_str()).collect();
    let default_index = granularities
        .iter()
        .position(|g| *g == config.corpus.granularity)
        .unwrap_or(0);

    let index = Select::new()
        .with_prompt("Knowledge base granularity")
        .default(default_index)
        .items(&labels)
        .interact()?;

    config.corpus.granularity = granularities[index];
    Ok(())
}

fn test_ollama_connection(ollama: &OllamaConfig) -> Result<bool> {
    let url = format!(
        "{}://{}:{}/api/version",
        ollama.protocol, ollama.host, ollama.port
    );

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(&url).call() {
        Ok(_) => Ok(true),
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => Ok(true),
        Err(_) => Ok(false),
    }
}
