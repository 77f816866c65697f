use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};


pub mod models;
pub mod queries;

pub use models::{
    KnowledgeBaseRecord, KnowledgeBaseStatus, KnowledgeEntryRecord, NewKnowledgeBase,
    NewKnowledgeEntry, SectionRecord,
};
pub use queries::{KnowledgeBaseQueries, KnowledgeEntryQueries, SectionQueries};

pub type DbPool = Pool<Sqlite>;

const DATABASE_FILE_NAME: &str = "scribe.db";

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_url: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_url)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        let db_path = config_dir.join(DATABASE_FILE_NAME);

        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(&db_path).await
    }

    // Knowledge base operations
    #[inline]
    pub async fn create_knowledge_base(
        &self,
        new_knowledge_base: NewKnowledgeBase,
    ) -> Result<KnowledgeBaseRecord> {
        KnowledgeBaseQueries::create(&self.pool, new_knowledge_base).await
    }

    #[inline]
    pub async fn knowledge_bases_named(&self, name: &str) -> Result<Vec<KnowledgeBaseRecord>> {
        KnowledgeBaseQueries::list_by_name(&self.pool, name).await
    }

    #[inline]
    pub async fn list_knowledge_bases(&self) -> Result<Vec<KnowledgeBaseRecord>> {
        KnowledgeBaseQueries::list_all(&self.pool).await
    }

    #[inline]
    pub async fn mark_knowledge_base_ready(&self, id: i64, entry_count: i64) -> Result<()> {
        KnowledgeBaseQueries::mark_ready(&self.pool, id, entry_count).await
    }

    #[inline]
    pub async fn mark_knowledge_base_failed(&self, id: i64) -> Result<()> {
        KnowledgeBaseQueries::mark_failed(&self.pool, id).await
    }

    #[inline]
    pub async fn delete_knowledge_base(&self, id: i64) -> Result<bool> {
        KnowledgeBaseQueries::delete(&self.pool, id).await
    }

    // Knowledge entry operations
    #[inline]
    pub async fn insert_knowledge_entries(
        &self,
        entries: Vec<NewKnowledgeEntry>,
    ) -> Result<Vec<KnowledgeEntryRecord>> {
        KnowledgeEntryQueries::create_batch(&self.pool, entries).await
    }

    #[inline]
    pub async fn knowledge_entries(&self, knowledge_base_id: i64) -> Result<Vec<KnowledgeEntryRecord>> {
        KnowledgeEntryQueries::list_by_knowledge_base(&self.pool, knowledge_base_id).await
    }

    // Section operations
    #[inline]
    pub async fn append_section(&self, category: &str, text: &str) -> Result<SectionRecord> {
        SectionQueries::append(&self.pool, category, text).await
    }

    #[inline]
    pub async fn sections(&self, category: &str) -> Result<Vec<SectionRecord>> {
        SectionQueries::list_by_category(&self.pool, category).await
    }
}
