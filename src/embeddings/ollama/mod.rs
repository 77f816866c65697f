
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::Config;
use crate::embeddings::Embedder;
use crate::generation::{CompletionProvider, GenerationError};

/// Output width of `nomic-embed-text`, the default embedding model
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;

const EXPONENTIAL_BACKOFF_BASE: u64 = 2;
const BACKOFF_UNIT_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    embedding_model: String,
    generation_model: String,
    batch_size: u32,
    embedding_dimension: usize,
    agent: ureq::Agent,
    timeout_secs: u64,
    retry_attempts: u32,
    backoff_unit: Duration,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    #[serde(rename = "input")]
    inputs: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
    pub details: Option<ModelDetails>,
}

#[derive(Debug, Deserialize)]
pub struct ModelDetails {
    pub format: Option<String>,
    pub family: Option<String>,
    pub families: Option<Vec<String>>,
    pub parameter_size: Option<String>,
    pub quantization_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

/// Why a request ultimately failed, kept free of ureq types
#[derive(Debug, Clone, PartialEq, Eq)]
enum RequestFailure {
    Timeout,
    RateLimited,
    Status(u16),
    Transport(String),
}

impl std::fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => f.write_str("request timed out"),
            Self::RateLimited => f.write_str("rate limited (HTTP 429)"),
            Self::Status(status) => write!(f, "HTTP {status}"),
            Self::Transport(message) => write!(f, "transport error: {message}"),
        }
    }
}

impl std::error::Error for RequestFailure {}

impl OllamaClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let ollama = &config.ollama;
        let base_url = ollama
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;

        let agent = build_agent(Duration::from_secs(ollama.timeout_secs));

        debug!(
            "Created Ollama client for {} (embedding: {}, generation: {})",
            base_url, ollama.embedding_model, ollama.generation_model
        );

        Ok(Self {
            base_url,
            embedding_model: ollama.embedding_model.clone(),
            generation_model: ollama.generation_model.clone(),
            batch_size: ollama.batch_size,
            embedding_dimension: ollama.embedding_dimension as usize,
            agent,
            timeout_secs: ollama.timeout_secs,
            retry_attempts: ollama.retry_attempts.max(1),
            backoff_unit: Duration::from_millis(BACKOFF_UNIT_MS),
            api_key: ollama.api_key().map(str::to_string),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self.timeout_secs = timeout.as_secs();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Base delay doubled on every retry
    #[inline]
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    #[inline]
    pub fn embedding_dimension(&self) -> usize {
        self.embedding_dimension
    }

    /// Test connection to Ollama server and verify both models are available
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let models = self.list_models().context("Server ping failed")?;

        for model in [&self.embedding_model, &self.generation_model] {
            validate_model(&models, model).context("Model validation failed")?;
        }

        info!(
            "Health check passed for Ollama server at {} with models {} and {}",
            self.base_url, self.embedding_model, self.generation_model
        );
        Ok(())
    }

    /// List all available models
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build models URL")?;

        debug!("Fetching available models from {}", url);

        let response_text = self
            .make_request_with_retry(|| {
                self.authorize(self.agent.get(url.as_str()))
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to fetch models")?;

        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Generate embeddings for multiple text inputs using batch processing
    #[inline]
    pub fn generate_embeddings_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());

        // Process in batches to avoid overwhelming the server
        for chunk in texts.chunks(self.batch_size.max(1) as usize) {
            let batch_results = self
                .generate_embeddings_single_batch(chunk)
                .with_context(|| format!("Failed to process batch of {} texts", chunk.len()))?;

            results.extend(batch_results);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    fn generate_embeddings_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.embedding_model,
            inputs: texts,
        };

        let url = self
            .base_url
            .join("/api/embed")
            .context("Failed to build batch embedding URL")?;

        let request_json = serde_json::to_string(&request)
            .context("Failed to serialize batch embedding request")?;

        let response_text = self
            .make_request_with_retry(|| {
                self.post(&url)
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to generate batch embeddings")?;

        let batch_response: EmbedResponse = serde_json::from_str(&response_text)
            .context("Failed to parse batch embedding response")?;

        if batch_response.embeddings.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                batch_response.embeddings.len()
            ));
        }

        if let Some(bad) = batch_response
            .embeddings
            .iter()
            .find(|embedding| embedding.len() != self.embedding_dimension)
        {
            return Err(anyhow::anyhow!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.embedding_dimension,
                bad.len()
            ));
        }

        Ok(batch_response.embeddings)
    }

    /// Request a single non-streaming completion from `/api/generate`
    #[inline]
    pub fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = self
            .base_url
            .join("/api/generate")
            .map_err(|e| GenerationError::Provider(format!("invalid generate URL: {e}")))?;

        let request = GenerateRequest {
            model: &self.generation_model,
            prompt,
            stream: false,
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| GenerationError::Provider(format!("failed to encode request: {e}")))?;

        debug!(
            "Requesting completion from {} ({} prompt characters)",
            self.generation_model,
            prompt.len()
        );

        let response_text = self
            .make_request_with_retry(|| {
                self.post(&url)
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .map_err(|failure| match failure {
                RequestFailure::Timeout => GenerationError::Timeout(self.timeout_secs),
                RequestFailure::RateLimited => {
                    GenerationError::RateLimited(format!("{} rejected the request", self.base_url))
                }
                other => GenerationError::Provider(other.to_string()),
            })?;

        let response: GenerateResponse = serde_json::from_str(&response_text)
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

        Ok(response.response)
    }

    fn post(&self, url: &Url) -> ureq::RequestBuilder<ureq::typestate::WithBody> {
        let request = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json");
        self.authorize(request)
    }

    fn authorize<B>(&self, request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {key}")),
            None => request,
        }
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String, RequestFailure>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    let failure = match &error {
                        ureq::Error::StatusCode(429) => {
                            warn!(
                                "Rate limited, attempt {}/{}",
                                attempt, self.retry_attempts
                            );
                            RequestFailure::RateLimited
                        }
                        ureq::Error::StatusCode(status) if *status >= 500 => {
                            warn!(
                                "Server error (status {}), attempt {}/{}",
                                status, attempt, self.retry_attempts
                            );
                            RequestFailure::Status(*status)
                        }
                        ureq::Error::StatusCode(status) => {
                            warn!("Client error (status {}), not retrying", status);
                            return Err(RequestFailure::Status(*status));
                        }
                        ureq::Error::Timeout(_) => {
                            warn!(
                                "Request timed out, attempt {}/{}",
                                attempt, self.retry_attempts
                            );
                            RequestFailure::Timeout
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            RequestFailure::Transport(error.to_string())
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            return Err(RequestFailure::Transport(error.to_string()));
                        }
                    };

                    last_error = Some(failure);

                    // Wait before retry (exponential backoff)
                    if attempt < self.retry_attempts {
                        let delay = self.backoff_unit * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) as u32;
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error
            .unwrap_or_else(|| RequestFailure::Transport("request failed after retries".to_string())))
    }
}

impl Embedder for OllamaClient {
    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.generate_embeddings_batch(&[text.to_string()])?
            .pop()
            .context("Ollama returned no embedding")
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.generate_embeddings_batch(texts)
    }
}

impl CompletionProvider for OllamaClient {
    #[inline]
    fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        self.generate(prompt)
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

fn validate_model(models: &[ModelInfo], model: &str) -> Result<()> {
    if models.iter().any(|m| m.name == model) {
        debug!("Model {} is available", model);
        Ok(())
    } else {
        let available_models: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        warn!(
            "Model {} not found. Available models: {:?}",
            model, available_models
        );
        Err(anyhow::anyhow!(
            "Model '{}' is not available. Available models: {:?}",
            model,
            available_models
        ))
    }
}
