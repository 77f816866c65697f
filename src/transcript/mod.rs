// Transcript loading
// Flattens speech-to-text output into a single ordered transcript string


use serde::Deserialize;
use std::path::Path;
use tracing::debug;

use crate::{Result, ScribeError};

#[derive(Debug, Deserialize)]
struct TranscriptDocument {
    results: TranscriptResults,
}

#[derive(Debug, Deserialize)]
struct TranscriptResults {
    items: Vec<TranscriptItem>,
}

#[derive(Debug, Deserialize)]
struct TranscriptItem {
    #[serde(default)]
    alternatives: Option<Vec<Alternative>>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    content: String,
}

/// A single recognized fragment of speech, in transcript order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    /// Position of the source item within the transcript
    pub index: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    utterances: Vec<Utterance>,
    total_items: usize,
}

impl Transcript {
    #[inline]
    pub fn utterances(&self) -> &[Utterance] {
        &self.utterances
    }

    /// Number of items in the source artifact, including skipped ones
    #[inline]
    pub fn total_items(&self) -> usize {
        self.total_items
    }

    /// Utterances joined with a single space in original order
    #[inline]
    pub fn text(&self) -> String {
        self.utterances
            .iter()
            .map(|u| u.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }
}

/// Load and flatten a transcript artifact from disk
#[inline]
pub fn load_transcript<P: AsRef<Path>>(path: P) -> Result<Transcript> {
    let path = path.as_ref();
    debug!("Loading transcript from {}", path.display());

    let content = std::fs::read_to_string(path)?;
    parse_transcript(&content).map_err(|e| match e {
        ScribeError::MalformedTranscript(msg) => {
            ScribeError::MalformedTranscript(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

/// Parse a transcript artifact from its JSON text
#[inline]
pub fn parse_transcript(content: &str) -> Result<Transcript> {
    let document: TranscriptDocument = serde_json::from_str(content)
        .map_err(|e| ScribeError::MalformedTranscript(e.to_string()))?;

    let total_items = document.results.items.len();
    let utterances: Vec<Utterance> = document
        .results
        .items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| {
            item.alternatives
                .and_then(|alternatives| alternatives.into_iter().next())
                .map(|first| Utterance {
                    index,
                    text: first.content,
                })
        })
        .collect();

    debug!(
        "Parsed transcript with {} utterances from {} items",
        utterances.len(),
        total_items
    );

    Ok(Transcript {
        utterances,
        total_items,
    })
}
