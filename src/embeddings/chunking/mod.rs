
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A labelled span of source text, e.g. one serialized knowledge base row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusSection {
    /// Label carried onto every chunk cut from this section
    pub label: String,
    pub content: String,
}

/// Represents a chunk of content ready for embedding
#[derive(Debug, Clone, PartialEq)]
pub struct ContentChunk {
    /// The content text
    pub content: String,
    /// Label of the section this chunk was cut from
    pub label: String,
    /// Index of the source section
    pub section_index: usize,
    /// The index of this chunk within the corpus
    pub chunk_index: usize,
    /// Estimated token count
    pub token_count: usize,
}

/// Configuration for content chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in tokens
    pub target_chunk_size: usize,
    /// Maximum chunk size in tokens before forced splitting
    pub max_chunk_size: usize,
    /// Minimum chunk size in tokens (smaller chunks will be merged)
    pub min_chunk_size: usize,
    /// Overlap size in tokens between adjacent chunks
    pub overlap_size: usize,
    /// Whether to break at sentence boundaries when possible
    pub sentence_boundary_splitting: bool,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            target_chunk_size: 650,
            max_chunk_size: 1000,
            min_chunk_size: 100,
            overlap_size: 50,
            sentence_boundary_splitting: true,
        }
    }
}

/// Chunk corpus sections into embedding-ready pieces
#[inline]
pub fn chunk_sections(
    sections: &[CorpusSection],
    config: &ChunkingConfig,
) -> Result<Vec<ContentChunk>> {
    let mut chunks = Vec::new();
    let mut chunk_index = 0;

    for (section_index, section) in sections.iter().enumerate() {
        let section_chunks = chunk_section(section, section_index, config, &mut chunk_index)?;
        chunks.extend(section_chunks);
    }

    // Post-process chunks: merge small chunks and add overlap
    let processed_chunks = post_process_chunks(chunks, config)?;

    debug!(
        "Chunked {} sections into {} chunks (avg {} tokens)",
        sections.len(),
        processed_chunks.len(),
        processed_chunks
            .iter()
            .map(|c| c.token_count)
            .sum::<usize>()
            / processed_chunks.len().max(1)
    );

    Ok(processed_chunks)
}

/// Chunk a single section
fn chunk_section(
    section: &CorpusSection,
    section_index: usize,
    config: &ChunkingConfig,
    chunk_index: &mut usize,
) -> Result<Vec<ContentChunk>> {
    let mut chunks = Vec::new();
    let content = &section.content;

    if content.trim().is_empty() {
        return Ok(chunks);
    }

    let token_count = estimate_token_count(content);

    if token_count <= config.target_chunk_size {
        chunks.push(ContentChunk {
            content: content.clone(),
            label: section.label.clone(),
            section_index,
            chunk_index: *chunk_index,
            token_count,
        });
        *chunk_index += 1;
        return Ok(chunks);
    }

    for split in split_by_semantics(content, config)? {
        if split.trim().is_empty() {
            continue;
        }

        let chunk_token_count = estimate_token_count(&split);
        chunks.push(ContentChunk {
            content: split,
            label: section.label.clone(),
            section_index,
            chunk_index: *chunk_index,
            token_count: chunk_token_count,
        });
        *chunk_index += 1;
    }

    Ok(chunks)
}

/// Split content at line and paragraph boundaries, falling back to sentences or words
fn split_by_semantics(content: &str, config: &ChunkingConfig) -> Result<Vec<String>> {
    let mut splits = Vec::new();
    let mut current_split = String::new();
    let mut current_token_count = 0;

    // Serialized rows are line oriented, so a single newline is a paragraph break
    let paragraphs = content.split('\n').collect::<Vec<_>>();

    for paragraph in paragraphs {
        if paragraph.trim().is_empty() {
            continue;
        }

        let paragraph_tokens = estimate_token_count(paragraph);

        if paragraph_tokens > config.max_chunk_size {
            let pieces = if config.sentence_boundary_splitting {
                split_by_sentences(paragraph, config)?
            } else {
                split_by_words(paragraph, config)?
            };

            for piece in pieces {
                let piece_tokens = estimate_token_count(&piece);
                if current_token_count + piece_tokens > config.target_chunk_size
                    && !current_split.trim().is_empty()
                {
                    splits.push(current_split.trim().to_string());
                    current_split.clear();
                    current_token_count = 0;
                }
                current_split.push_str(&piece);
                current_split.push('\n');
                current_token_count += piece_tokens;
            }
        } else {
            if current_token_count + paragraph_tokens > config.target_chunk_size
                && !current_split.trim().is_empty()
            {
                splits.push(current_split.trim().to_string());
                current_split.clear();
                current_token_count = 0;
            }

            current_split.push_str(paragraph);
            current_split.push('\n');
            current_token_count += paragraph_tokens;
        }
    }

    if !current_split.trim().is_empty() {
        splits.push(current_split.trim().to_string());
    }

    Ok(splits)
}

/// Split text by sentences
fn split_by_sentences(text: &str, config: &ChunkingConfig) -> Result<Vec<String>> {
    let mut splits = Vec::new();
    let mut current_split = String::new();
    let mut current_token_count = 0;

    let sentences = text
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    for (i, sentence) in sentences.iter().enumerate() {
        let sentence_with_punct = if i < sentences.len() - 1 {
            format!("{}. ", sentence)
        } else {
            (*sentence).to_string()
        };

        let sentence_tokens = estimate_token_count(&sentence_with_punct);

        if current_token_count + sentence_tokens > config.target_chunk_size
            && !current_split.trim().is_empty()
        {
            splits.push(current_split.trim().to_string());
            current_split.clear();
            current_token_count = 0;
        }

        current_split.push_str(&sentence_with_punct);
        current_token_count += sentence_tokens;
    }

    if !current_split.trim().is_empty() {
        splits.push(current_split.trim().to_string());
    }

    Ok(splits)
}

/// Split text by words as a last resort
fn split_by_words(text: &str, config: &ChunkingConfig) -> Result<Vec<String>> {
    let mut splits = Vec::new();
    let mut current_split = String::new();
    let mut current_token_count = 0;

    for word in text.split_whitespace() {
        let word_with_space = format!("{} ", word);
        let word_tokens = estimate_token_count(&word_with_space);

        if current_token_count + word_tokens > config.target_chunk_size
            && !current_split.trim().is_empty()
        {
            splits.push(current_split.trim().to_string());
            current_split.clear();
            current_token_count = 0;
        }

        current_split.push_str(&word_with_space);
        current_token_count += word_tokens;
    }

    if !current_split.trim().is_empty() {
        splits.push(current_split.trim().to_string());
    }

    Ok(splits)
}

/// Merge undersized chunks into their predecessor and add overlap
fn post_process_chunks(
    chunks: Vec<ContentChunk>,
    config: &ChunkingConfig,
) -> Result<Vec<ContentChunk>> {
    if chunks.is_empty() {
        return Ok(chunks);
    }

    let mut processed = Vec::new();
    let mut pending_merge: Option<ContentChunk> = None;

    for chunk in chunks {
        if let Some(mut pending) = pending_merge.take() {
            if chunk.token_count < config.min_chunk_size
                && pending.token_count + chunk.token_count <= config.max_chunk_size
                && pending.section_index == chunk.section_index
            {
                pending.content.push('\n');
                pending.content.push_str(&chunk.content);
                pending.token_count += chunk.token_count;
                pending_merge = Some(pending);
                continue;
            }
            processed.push(pending);
        }

        if chunk.token_count < config.min_chunk_size {
            pending_merge = Some(chunk);
        } else {
            processed.push(chunk);
        }
    }

    if let Some(pending) = pending_merge {
        processed.push(pending);
    }

    if config.overlap_size > 0 {
        processed = add_overlap(processed, config);
    }

    for (i, chunk) in processed.iter_mut().enumerate() {
        chunk.chunk_index = i;
    }

    Ok(processed)
}

/// Prefix each chunk with the tail of its predecessor from the same section
fn add_overlap(mut chunks: Vec<ContentChunk>, config: &ChunkingConfig) -> Vec<ContentChunk> {
    for i in 1..chunks.len() {
        let (left, right) = chunks.split_at_mut(i);
        let prev_chunk = &left[i - 1];
        let curr_chunk = &mut right[0];

        if prev_chunk.section_index == curr_chunk.section_index {
            let overlap_text = extract_overlap_text(&prev_chunk.content, config.overlap_size);
            if !overlap_text.is_empty() {
                curr_chunk.content = format!("{}\n{}", overlap_text, curr_chunk.content);
                curr_chunk.token_count += estimate_token_count(&overlap_text);
            }
        }
    }

    chunks
}

/// Extract overlap text from the end of a chunk
fn extract_overlap_text(content: &str, overlap_tokens: usize) -> String {
    let words: Vec<&str> = content.split_whitespace().collect();
    let word_count = (overlap_tokens as f64 * 0.75) as usize; // Rough word-to-token ratio

    if words.len() <= word_count {
        return String::new();
    }

    words[words.len() - word_count..].join(" ")
}

/// Estimate token count using a simple heuristic
/// This is a rough approximation - actual tokenization would be more accurate
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    // Rough heuristic: 1 token ≈ 0.75 words for English text
    // Add extra tokens for punctuation and special characters
    let word_count = text.split_whitespace().count();
    let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();

    (punct_count as f64).mul_add(0.1, word_count as f64 / 0.75) as usize
}

/// Count whitespace-separated words, the unit of retrieval word budgets
#[inline]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
