
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

const KNOWLEDGE_BASE_COLUMNS: &str =
    "id, name, source_path, granularity, fingerprint, status, entry_count, created_date";
const KNOWLEDGE_ENTRY_COLUMNS: &str =
    "id, knowledge_base_id, ordinal, content, category, source_row, vector_id, created_date";

pub struct KnowledgeBaseQueries;

impl KnowledgeBaseQueries {
    #[inline]
    pub async fn create(
        pool: &SqlitePool,
        new_knowledge_base: NewKnowledgeBase,
    ) -> Result<KnowledgeBaseRecord> {
        let now = Utc::now().naive_utc();
        let id = sqlx::query(
            "INSERT INTO knowledge_bases (name, source_path, granularity, fingerprint, status, created_date) VALUES (?, ?, ?, ?, 'pending', ?)",
        )
        .bind(&new_knowledge_base.name)
        .bind(&new_knowledge_base.source_path)
        .bind(&new_knowledge_base.granularity)
        .bind(&new_knowledge_base.fingerprint)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create knowledge base")?
        .last_insert_rowid();

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created knowledge base"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<KnowledgeBaseRecord>> {
        let result = sqlx::query_as::<_, KnowledgeBaseRecord>(&format!(
            "SELECT {KNOWLEDGE_BASE_COLUMNS} FROM knowledge_bases WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get knowledge base by id")?;

        Ok(result)
    }

    /// All knowledge bases registered under a name, oldest first
    #[inline]
    pub async fn list_by_name(pool: &SqlitePool, name: &str) -> Result<Vec<KnowledgeBaseRecord>> {
        let result = sqlx::query_as::<_, KnowledgeBaseRecord>(&format!(
            "SELECT {KNOWLEDGE_BASE_COLUMNS} FROM knowledge_bases WHERE name = ? ORDER BY id"
        ))
        .bind(name)
        .fetch_all(pool)
        .await
        .context("Failed to get knowledge bases by name")?;

        Ok(result)
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<KnowledgeBaseRecord>> {
        let result = sqlx::query_as::<_, KnowledgeBaseRecord>(&format!(
            "SELECT {KNOWLEDGE_BASE_COLUMNS} FROM knowledge_bases ORDER BY id"
        ))
        .fetch_all(pool)
        .await
        .context("Failed to list knowledge bases")?;

        Ok(result)
    }

    #[inline]
    pub async fn mark_ready(pool: &SqlitePool, id: i64, entry_count: i64) -> Result<()> {
        sqlx::query("UPDATE knowledge_bases SET status = 'ready', entry_count = ? WHERE id = ?")
            .bind(entry_count)
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to mark knowledge base ready")?;

        debug!("Knowledge base {} ready with {} entries", id, entry_count);
        Ok(())
    }

    #[inline]
    pub async fn mark_failed(pool: &SqlitePool, id: i64) -> Result<()> {
        sqlx::query("UPDATE knowledge_bases SET status = 'failed' WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to mark knowledge base failed")?;

        Ok(())
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM knowledge_bases WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete knowledge base")?;

        Ok(result.rows_affected() > 0)
    }
}

pub struct KnowledgeEntryQueries;

impl KnowledgeEntryQueries {
    #[inline]
    pub async fn create_batch(
        pool: &SqlitePool,
        entries: Vec<NewKnowledgeEntry>,
    ) -> Result<Vec<KnowledgeEntryRecord>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut transaction = pool
            .begin()
            .await
            .context("Failed to begin transaction for batch entry insert")?;

        let mut created_entries = Vec::with_capacity(entries.len());
        let now = Utc::now().naive_utc();

        for entry in entries {
            let id = sqlx::query(
                r#"
                INSERT INTO knowledge_entries (knowledge_base_id, ordinal, content, category, source_row, vector_id, created_date)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(entry.knowledge_base_id)
            .bind(entry.ordinal)
            .bind(&entry.content)
            .bind(&entry.category)
            .bind(entry.source_row)
            .bind(&entry.vector_id)
            .bind(now)
            .execute(&mut *transaction)
            .await
            .context("Failed to create knowledge entry in batch")?
            .last_insert_rowid();

            created_entries.push(KnowledgeEntryRecord {
                id,
                knowledge_base_id: entry.knowledge_base_id,
                ordinal: entry.ordinal,
                content: entry.content,
                category: entry.category,
                source_row: entry.source_row,
                vector_id: entry.vector_id,
                created_date: now,
            });
        }

        transaction
            .commit()
            .await
            .context("Failed to commit batch entry insert transaction")?;

        debug!("Created {} knowledge entries", created_entries.len());
        Ok(created_entries)
    }

    #[inline]
    pub async fn list_by_knowledge_base(
        pool: &SqlitePool,
        knowledge_base_id: i64,
    ) -> Result<Vec<KnowledgeEntryRecord>> {
        let entries = sqlx::query_as::<_, KnowledgeEntryRecord>(&format!(
            "SELECT {KNOWLEDGE_ENTRY_COLUMNS} FROM knowledge_entries WHERE knowledge_base_id = ? ORDER BY ordinal"
        ))
        .bind(knowledge_base_id)
        .fetch_all(pool)
        .await
        .context("Failed to list knowledge entries")?;

        Ok(entries)
    }

    #[inline]
    pub async fn count_by_knowledge_base(pool: &SqlitePool, knowledge_base_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM knowledge_entries WHERE knowledge_base_id = ?",
        )
        .bind(knowledge_base_id)
        .fetch_one(pool)
        .await
        .context("Failed to count knowledge entries")?;

        Ok(count)
    }
}

pub struct SectionQueries;

impl SectionQueries {
    #[inline]
    pub async fn append(pool: &SqlitePool, category: &str, text: &str) -> Result<SectionRecord> {
        let now = Utc::now().naive_utc();
        let id = sqlx::query("INSERT INTO sections (category, text, created_date) VALUES (?, ?, ?)")
            .bind(category)
            .bind(text)
            .bind(now)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to append {category} section"))?
            .last_insert_rowid();

        Ok(SectionRecord {
            id,
            category: category.to_string(),
            text: text.to_string(),
            created_date: now,
        })
    }

    /// Sections of one category in insertion order
    #[inline]
    pub async fn list_by_category(pool: &SqlitePool, category: &str) -> Result<Vec<SectionRecord>> {
        let sections = sqlx::query_as::<_, SectionRecord>(
            "SELECT id, category, text, created_date FROM sections WHERE category = ? ORDER BY id",
        )
        .bind(category)
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to list {category} sections"))?;

        Ok(sections)
    }

    #[inline]
    pub async fn count_by_category(pool: &SqlitePool, category: &str) -> Result<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sections WHERE category = ?")
                .bind(category)
                .fetch_one(pool)
                .await
                .context("Failed to count sections")?;

        Ok(count)
    }
}
