#[cfg(test)]
mod tests;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct KnowledgeBaseRecord {
    pub id: i64,
    pub name: String,
    pub source_path: String,
    pub granularity: String,
    /// Content digest of the ingested corpus
    pub fingerprint: String,
    pub status: KnowledgeBaseStatus,
    pub entry_count: i64,
    pub created_date: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum KnowledgeBaseStatus {
    Pending,
    Ready,
    Failed,
}

impl std::fmt::Display for KnowledgeBaseStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            KnowledgeBaseStatus::Pending => write!(f, "Pending"),
            KnowledgeBaseStatus::Ready => write!(f, "Ready"),
            KnowledgeBaseStatus::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewKnowledgeBase {
    pub name: String,
    pub source_path: String,
    pub granularity: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct KnowledgeEntryRecord {
    pub id: i64,
    pub knowledge_base_id: i64,
    pub ordinal: i64,
    pub content: String,
    pub category: Option<String>,
    pub source_row: Option<i64>,
    pub vector_id: String,
    pub created_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewKnowledgeEntry {
    pub knowledge_base_id: i64,
    pub ordinal: i64,
    pub content: String,
    pub category: Option<String>,
    pub source_row: Option<i64>,
    pub vector_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SectionRecord {
    pub id: i64,
    pub category: String,
    pub text: String,
    pub created_date: NaiveDateTime,
}

impl KnowledgeBaseRecord {
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.status == KnowledgeBaseStatus::Ready
    }
}
