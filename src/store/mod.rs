// Result store
// Append-only persistence of generated note sections


use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::{Database, SectionRecord};
use crate::section::SectionKind;
use crate::{Result, ScribeError};

/// Append-only storage for generated sections
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Append a section and return its row id
    async fn save(&self, category: SectionKind, text: &str) -> Result<i64>;

    /// Every saved text for a category, oldest first
    async fn list(&self, category: SectionKind) -> Result<Vec<String>>;
}

/// Result store on the SQLite `sections` table
#[derive(Debug, Clone)]
pub struct SqliteResultStore {
    database: Database,
}

impl SqliteResultStore {
    #[inline]
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    #[inline]
    pub async fn open(config_dir: &Path) -> Result<Self> {
        let database = Database::initialize_from_config_dir(config_dir)
            .await
            .map_err(|e| ScribeError::Persistence(format!("{e:#}")))?;
        Ok(Self::new(database))
    }

    /// Saved sections with their ids and timestamps
    #[inline]
    pub async fn records(&self, category: SectionKind) -> Result<Vec<SectionRecord>> {
        self.database
            .sections(category.as_str())
            .await
            .map_err(|e| ScribeError::Persistence(format!("{e:#}")))
    }
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn save(&self, category: SectionKind, text: &str) -> Result<i64> {
        let record = self
            .database
            .append_section(category.as_str(), text)
            .await
            .map_err(|e| ScribeError::Persistence(format!("{e:#}")))?;

        info!("Saved {} section #{}", category, record.id);
        Ok(record.id)
    }

    async fn list(&self, category: SectionKind) -> Result<Vec<String>> {
        let texts: Vec<String> = self
            .records(category)
            .await?
            .into_iter()
            .map(|record| record.text)
            .collect();

        debug!("Loaded {} {} sections", texts.len(), category);
        Ok(texts)
    }
}
