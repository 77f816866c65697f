use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScribeError>;

#[derive(Error, Debug)]
pub enum ScribeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed transcript: {0}")]
    MalformedTranscript(String),

    #[error("Knowledge base load error: {0}")]
    CorpusLoad(String),

    #[error("Generation error: {0}")]
    Generation(#[from] generation::GenerationError),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector index error: {0}")]
    Index(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod generation;
pub mod knowledge;
pub mod pipeline;
pub mod retriever;
pub mod section;
pub mod store;
pub mod transcript;
