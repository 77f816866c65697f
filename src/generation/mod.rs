// Section generation module
// Prompt templates, the completion capability, and the per-section generator

pub mod templates;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::section::SectionKind;
pub use templates::PromptTemplate;

/// Failures of a completion call, independent of the provider behind it
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Provider timed out after {0} seconds")]
    Timeout(u64),
    #[error("Provider rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("Provider request failed: {0}")]
    Provider(String),
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
    #[error("Provider returned an empty completion")]
    EmptyResponse,
}

/// A language-model service that turns one prompt into one completion
pub trait CompletionProvider: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Formats the section template and obtains exactly one completion per call
#[derive(Clone)]
pub struct SectionGenerator {
    provider: Arc<dyn CompletionProvider>,
}

impl std::fmt::Debug for SectionGenerator {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionGenerator").finish_non_exhaustive()
    }
}

impl SectionGenerator {
    #[inline]
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider }
    }

    /// Build the prompt for a section without calling the provider
    #[inline]
    pub fn prompt(kind: SectionKind, transcript_text: &str, retrieved_text: &str) -> String {
        PromptTemplate::for_section(kind).render(transcript_text, retrieved_text)
    }

    #[inline]
    pub fn generate(
        &self,
        kind: SectionKind,
        transcript_text: &str,
        retrieved_text: &str,
    ) -> Result<String, GenerationError> {
        let prompt = Self::prompt(kind, transcript_text, retrieved_text);
        debug!(
            "Generating {} section from a {} character prompt",
            kind,
            prompt.len()
        );

        let completion = self.provider.complete(&prompt).inspect_err(|e| {
            warn!("Generation of {} section failed: {}", kind, e);
        })?;

        if completion.trim().is_empty() {
            warn!("Provider returned an empty {} section", kind);
            return Err(GenerationError::EmptyResponse);
        }

        info!(
            "Generated {} section ({} characters)",
            kind,
            completion.len()
        );
        Ok(completion)
    }
}
