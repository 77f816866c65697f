
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::embeddings::chunking::{ChunkingConfig, CorpusSection, chunk_sections};
use crate::{Result, ScribeError};

/// How a tabular source is cut into knowledge entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// The whole table rendered as one aligned text document
    Document,
    /// One entry per data row
    #[default]
    Row,
    /// Rows split further into size-bounded chunks
    Chunk,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [Granularity::Document, Granularity::Row, Granularity::Chunk];

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Document => "document",
            Granularity::Row => "row",
            Granularity::Chunk => "chunk",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub granularity: Granularity,
    /// Column whose value becomes each entry's category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_column: Option<String>,
    /// Skip ingestion when a ready knowledge base with the same name exists
    pub dedup_on_insert: bool,
}

impl Default for CorpusConfig {
    #[inline]
    fn default() -> Self {
        Self {
            granularity: Granularity::Row,
            category_column: None,
            dedup_on_insert: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeMetadata {
    pub category: String,
    /// 0-based data row, `None` when the entry spans the whole table
    pub source_row: Option<usize>,
}

/// A snippet of reference text; never modified once loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Stable position within the knowledge base
    pub ordinal: usize,
    pub text: String,
    pub metadata: KnowledgeMetadata,
}

/// A named tabular source cut into knowledge entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corpus {
    name: String,
    source_path: PathBuf,
    granularity: Granularity,
    entries: Vec<KnowledgeEntry>,
}

struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Corpus {
    /// Read a CSV file with a header row, named after the file stem
    #[inline]
    pub fn load<P: AsRef<Path>>(
        path: P,
        config: &CorpusConfig,
        chunking: &ChunkingConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| {
                ScribeError::CorpusLoad(format!("{}: not a file path", path.display()))
            })?;

        Self::load_named(path, &name, config, chunking)
    }

    #[inline]
    pub fn load_named<P: AsRef<Path>>(
        path: P,
        name: &str,
        config: &CorpusConfig,
        chunking: &ChunkingConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading knowledge base {} from {}", name, path.display());

        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(|e| ScribeError::CorpusLoad(format!("{}: {}", path.display(), e)))?;
        let table = read_table(reader)
            .map_err(|e| ScribeError::CorpusLoad(format!("{}: {}", path.display(), e)))?;

        let entries = build_entries(&table, name, config, chunking)?;

        info!(
            "Loaded {} {} entries from {} ({} rows)",
            entries.len(),
            config.granularity.as_str(),
            path.display(),
            table.rows.len()
        );

        Ok(Self {
            name: name.to_string(),
            source_path: path.to_path_buf(),
            granularity: config.granularity,
            entries,
        })
    }

    /// Parse CSV text held in memory
    #[inline]
    pub fn from_csv_str(
        name: &str,
        data: &str,
        config: &CorpusConfig,
        chunking: &ChunkingConfig,
    ) -> Result<Self> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(data.as_bytes());
        let table = read_table(reader).map_err(|e| ScribeError::CorpusLoad(format!("{name}: {e}")))?;
        let entries = build_entries(&table, name, config, chunking)?;

        Ok(Self {
            name: name.to_string(),
            source_path: PathBuf::new(),
            granularity: config.granularity,
            entries,
        })
    }

    /// A corpus with no entries
    #[inline]
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            source_path: PathBuf::new(),
            granularity: Granularity::default(),
            entries: Vec::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    #[inline]
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    #[inline]
    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    /// SHA-256 hex digest over granularity and every entry's text and category
    #[inline]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.granularity.as_str().as_bytes());
        for entry in &self.entries {
            // Length prefixes keep adjacent fields from running together
            for field in [entry.text.as_str(), entry.metadata.category.as_str()] {
                hasher.update(u64::try_from(field.len()).unwrap_or(u64::MAX).to_le_bytes());
                hasher.update(field.as_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn read_table<R: std::io::Read>(mut reader: csv::Reader<R>) -> std::result::Result<Table, String> {
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| e.to_string())?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err("missing header row".to_string());
    }

    let rows = reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(str::to_string).collect::<Vec<_>>())
                .map_err(|e| e.to_string())
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Table { headers, rows })
}

fn build_entries(
    table: &Table,
    name: &str,
    config: &CorpusConfig,
    chunking: &ChunkingConfig,
) -> Result<Vec<KnowledgeEntry>> {
    if table.rows.is_empty() {
        return Ok(Vec::new());
    }

    let category_index = config.category_column.as_ref().and_then(|column| {
        let index = table.headers.iter().position(|h| h == column);
        if index.is_none() {
            warn!(
                "Category column {} not found in {}, using the knowledge base name",
                column, name
            );
        }
        index
    });

    let category_for = |row: &[String]| -> String {
        category_index
            .and_then(|i| row.get(i))
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .unwrap_or(name)
            .to_string()
    };

    let entries = match config.granularity {
        Granularity::Document => vec![KnowledgeEntry {
            ordinal: 0,
            text: render_table(table),
            metadata: KnowledgeMetadata {
                category: name.to_string(),
                source_row: None,
            },
        }],
        Granularity::Row => table
            .rows
            .iter()
            .enumerate()
            .map(|(row_index, row)| KnowledgeEntry {
                ordinal: row_index,
                text: serialize_row(&table.headers, row),
                metadata: KnowledgeMetadata {
                    category: category_for(row),
                    source_row: Some(row_index),
                },
            })
            .filter(|entry| !entry.text.is_empty())
            .enumerate()
            .map(|(ordinal, entry)| KnowledgeEntry { ordinal, ..entry })
            .collect(),
        Granularity::Chunk => {
            let mut source_rows = Vec::new();
            let sections: Vec<CorpusSection> = table
                .rows
                .iter()
                .enumerate()
                .filter_map(|(row_index, row)| {
                    let content = serialize_row(&table.headers, row);
                    (!content.is_empty()).then(|| {
                        source_rows.push(row_index);
                        CorpusSection {
                            label: category_for(row),
                            content,
                        }
                    })
                })
                .collect();

            chunk_sections(&sections, chunking)
                .map_err(|e| ScribeError::CorpusLoad(format!("{name}: {e}")))?
                .into_iter()
                .enumerate()
                .map(|(ordinal, chunk)| KnowledgeEntry {
                    ordinal,
                    text: chunk.content,
                    metadata: KnowledgeMetadata {
                        category: chunk.label,
                        source_row: source_rows.get(chunk.section_index).copied(),
                    },
                })
                .collect()
        }
    };

    Ok(entries)
}

/// One `column: value` line per non-empty cell
fn serialize_row(headers: &[String], row: &[String]) -> String {
    headers
        .iter()
        .zip(row)
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(header, value)| format!("{}: {}", header, flatten(value)))
        .join("\n")
}

/// Render every row and column as a right-aligned text table with a row index
fn render_table(table: &Table) -> String {
    let index_width = table.rows.len().saturating_sub(1).to_string().len();

    let cells: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| row.iter().map(|value| flatten(value)).collect())
        .collect();

    let widths: Vec<usize> = table
        .headers
        .iter()
        .enumerate()
        .map(|(column, header)| {
            cells
                .iter()
                .filter_map(|row| row.get(column))
                .map(|value| value.chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut lines = Vec::with_capacity(cells.len() + 1);

    let header_line = table
        .headers
        .iter()
        .zip(widths.iter().copied())
        .map(|(header, width)| format!("{header:>width$}"))
        .join("  ");
    lines.push(format!("{:index_width$}  {}", "", header_line));

    for (row_index, row) in cells.iter().enumerate() {
        let row_line = row
            .iter()
            .zip(widths.iter().copied())
            .map(|(value, width)| format!("{value:>width$}"))
            .join("  ");
        lines.push(format!("{row_index:<index_width$}  {row_line}"));
    }

    lines
        .into_iter()
        .map(|line| line.trim_end().to_string())
        .join("\n")
}

/// Collapse embedded line breaks so each cell stays on one line
fn flatten(value: &str) -> String {
    value.split_whitespace().join(" ")
}
