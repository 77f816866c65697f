
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::chunking::ChunkingConfig;
use crate::embeddings::ollama::DEFAULT_EMBEDDING_DIMENSION;
use crate::knowledge::corpus::CorpusConfig;
use crate::retriever::{RetrievalConfig, TruncationPolicy};

/// Environment variable that supplies the provider API key at load time
pub const API_KEY_ENV: &str = "CLINICAL_SCRIBE_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub embedding_model: String,
    pub generation_model: String,
    pub batch_size: u32,
    pub embedding_dimension: u32,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    /// Key written in `config.toml`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Key injected from the environment; never written back to disk
    #[serde(skip)]
    pub injected_api_key: Option<String>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            embedding_model: "nomic-embed-text:latest".to_string(),
            generation_model: "llama3.1:8b".to_string(),
            batch_size: 16,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            timeout_secs: 120,
            retry_attempts: 3,
            api_key: None,
            injected_api_key: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid target chunk size: {0} (must be between 100 and 2048)")]
    InvalidTargetChunkSize(usize),
    #[error("Invalid max chunk size: {0} (must be between 200 and 4096)")]
    InvalidMaxChunkSize(usize),
    #[error("Invalid min chunk size: {0} (must be between 50 and 1024)")]
    InvalidMinChunkSize(usize),
    #[error("Invalid overlap size: {0} (must be between 0 and 512)")]
    InvalidOverlapSize(usize),
    #[error("Max chunk size ({0}) must be greater than target chunk size ({1})")]
    MaxChunkSizeTooSmall(usize, usize),
    #[error("Target chunk size ({0}) must be greater than min chunk size ({1})")]
    TargetChunkSizeTooSmall(usize, usize),
    #[error("Invalid top-k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid word budget: {0} (must be between 1 and 100000)")]
    InvalidWordBudget(usize),
    #[error("Invalid candidate pool: {0} (must be between 1 and 1000)")]
    InvalidCandidatePool(usize),
    #[error("Invalid category column: cannot be blank")]
    InvalidCategoryColumn,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default configuration rooted at the given directory
    #[inline]
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            ollama: OllamaConfig::default(),
            chunking: ChunkingConfig::default(),
            corpus: CorpusConfig::default(),
            retrieval: RetrievalConfig::default(),
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// The per-user configuration directory, `~/.clinical-scribe`
    #[inline]
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".clinical-scribe"))
            .or_else(|| dirs::data_dir().map(|data| data.join("clinical-scribe")))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;

            let mut config: Config = toml::from_str(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?;
            config.base_dir = config_dir.as_ref().to_path_buf();
            config
        } else {
            Self::with_base_dir(config_dir)
        };

        config.apply_api_key(std::env::var(API_KEY_ENV).ok());

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Inject an API key that takes precedence over the file; blank values are ignored
    #[inline]
    pub fn apply_api_key(&mut self, api_key: Option<String>) {
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.ollama.injected_api_key = Some(key);
        }
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.validate_chunking_config()?;
        self.validate_retrieval_config()?;

        if let Some(column) = &self.corpus.category_column {
            if column.trim().is_empty() {
                return Err(ConfigError::InvalidCategoryColumn);
            }
        }

        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if !(100..=2048).contains(&config.target_chunk_size) {
            return Err(ConfigError::InvalidTargetChunkSize(
                config.target_chunk_size,
            ));
        }

        if !(200..=4096).contains(&config.max_chunk_size) {
            return Err(ConfigError::InvalidMaxChunkSize(config.max_chunk_size));
        }

        if !(50..=1024).contains(&config.min_chunk_size) {
            return Err(ConfigError::InvalidMinChunkSize(config.min_chunk_size));
        }

        if config.overlap_size > 512 {
            return Err(ConfigError::InvalidOverlapSize(config.overlap_size));
        }

        if config.max_chunk_size <= config.target_chunk_size {
            return Err(ConfigError::MaxChunkSizeTooSmall(
                config.max_chunk_size,
                config.target_chunk_size,
            ));
        }

        if config.target_chunk_size <= config.min_chunk_size {
            return Err(ConfigError::TargetChunkSizeTooSmall(
                config.target_chunk_size,
                config.min_chunk_size,
            ));
        }

        Ok(())
    }

    fn validate_retrieval_config(&self) -> Result<(), ConfigError> {
        match self.retrieval.truncation {
            TruncationPolicy::TopK { k } if !(1..=100).contains(&k) => {
                return Err(ConfigError::InvalidTopK(k));
            }
            TruncationPolicy::WordBudget { max_words } if !(1..=100_000).contains(&max_words) => {
                return Err(ConfigError::InvalidWordBudget(max_words));
            }
            _ => {}
        }

        if !(1..=1000).contains(&self.retrieval.candidate_pool) {
            return Err(ConfigError::InvalidCandidatePool(
                self.retrieval.candidate_pool,
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Get the path for the SQLite database
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.get_base_dir().join("scribe.db")
    }

    /// Get the path for the vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if self.generation_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.generation_model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        if !(1..=600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    /// Effective API key, the injected one first
    #[inline]
    pub fn api_key(&self) -> Option<&str> {
        self.injected_api_key.as_deref().or(self.api_key.as_deref())
    }

    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    pub fn set_embedding_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.embedding_model = model;
        Ok(())
    }

    pub fn set_generation_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.generation_model = model;
        Ok(())
    }

    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    pub fn set_timeout_secs(&mut self, timeout_secs: u64) -> Result<(), ConfigError> {
        if !(1..=600).contains(&timeout_secs) {
            return Err(ConfigError::InvalidTimeout(timeout_secs));
        }
        self.timeout_secs = timeout_secs;
        Ok(())
    }
}
