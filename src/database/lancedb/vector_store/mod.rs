
use super::{EmbeddingRecord, EntryMetadata};
use crate::{ScribeError, config::Config};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatchIterator, StringArray,
    UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const TABLE_NAME: &str = "knowledge_entries";

/// Extra rows requested beyond the limit so ties at the cut can be ordered
const TIE_OVERFETCH: usize = 8;

/// Vector database store using LanceDB for similarity search
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    vector_dimension: usize,
}

/// Search result from vector similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub entry_id: String,
    pub metadata: EntryMetadata,
    /// Cosine distance, lower is more relevant
    pub distance: f32,
}

impl VectorStore {
    /// Open (or create) the vector database under the configured base directory
    #[inline]
    pub async fn new(config: &Config) -> Result<Self, ScribeError> {
        let db_path = config.vector_database_path();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(&db_path).map_err(|e| {
            ScribeError::Index(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = format!("file://{}", db_path.display());

        // Attempt to connect with corruption recovery
        let connection = match lancedb::connect(&uri).execute().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to connect to LanceDB: {}", e);

                let error_msg = e.to_string().to_lowercase();
                if error_msg.contains("corrupt")
                    || error_msg.contains("invalid")
                    || error_msg.contains("malformed")
                {
                    warn!("Database corruption detected, attempting recovery");
                    Self::attempt_corruption_recovery(&db_path)?;

                    lancedb::connect(&uri).execute().await.map_err(|e| {
                        ScribeError::Index(format!(
                            "Failed to connect to LanceDB after recovery: {}",
                            e
                        ))
                    })?
                } else {
                    return Err(ScribeError::Index(format!(
                        "Failed to connect to LanceDB: {}",
                        e
                    )));
                }
            }
        };

        let mut store = Self {
            connection,
            table_name: TABLE_NAME.to_string(),
            vector_dimension: config.ollama.embedding_dimension as usize,
        };

        store.initialize_table().await?;

        info!("Vector store initialized successfully");
        Ok(store)
    }

    #[inline]
    pub fn vector_dimension(&self) -> usize {
        self.vector_dimension
    }

    /// Create the entries table if needed, adopting the dimension of an existing one
    async fn initialize_table(&mut self) -> Result<(), ScribeError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| ScribeError::Index(format!("Failed to list tables: {}", e)))?;

        if table_names.contains(&self.table_name) {
            match self.detect_existing_vector_dimension().await {
                Ok(dim) => {
                    debug!("Detected existing vector dimension: {}", dim);
                    self.vector_dimension = dim;
                    return Ok(());
                }
                Err(e) => {
                    warn!("Entries table is unreadable, recreating it: {}", e);
                    self.drop_table_if_exists().await?;
                }
            }
        }

        self.create_table(self.vector_dimension).await
    }

    async fn create_table(&self, vector_dim: usize) -> Result<(), ScribeError> {
        self.connection
            .create_empty_table(&self.table_name, Self::create_schema(vector_dim))
            .execute()
            .await
            .map_err(|e| ScribeError::Index(format!("Failed to create table: {}", e)))?;

        info!("Entries table created with {} dimensions", vector_dim);
        Ok(())
    }

    async fn open_table(&self) -> Result<Table, ScribeError> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| ScribeError::Index(format!("Failed to open table: {}", e)))
    }

    /// Detect vector dimension from existing table schema
    async fn detect_existing_vector_dimension(&self) -> Result<usize, ScribeError> {
        let schema = self
            .open_table()
            .await?
            .schema()
            .await
            .map_err(|e| ScribeError::Index(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(ScribeError::Index(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn create_schema(vector_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim as i32,
                ),
                false,
            ),
            Field::new("ordinal", DataType::UInt32, false),
            Field::new("knowledge_base_id", DataType::Int64, false),
            Field::new("knowledge_base", DataType::Utf8, false),
            Field::new("category", DataType::Utf8, true),
            Field::new("source_row", DataType::UInt32, true),
            Field::new("content", DataType::Utf8, false),
            Field::new("token_count", DataType::UInt32, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    /// Store multiple embeddings in a batch
    ///
    /// An empty table adopts the dimension of the first batch; a populated
    /// table rejects vectors of any other width.
    #[inline]
    pub async fn store_embeddings_batch(
        &mut self,
        records: Vec<EmbeddingRecord>,
    ) -> Result<(), ScribeError> {
        let Some(first) = records.first() else {
            debug!("No embeddings to store");
            return Ok(());
        };

        debug!("Storing batch of {} embeddings", records.len());

        let vector_dim = first.vector.len();
        if let Some(bad) = records.iter().find(|r| r.vector.len() != vector_dim) {
            return Err(ScribeError::Index(format!(
                "Embedding {} has {} dimensions, expected {}",
                bad.id,
                bad.vector.len(),
                vector_dim
            )));
        }

        if vector_dim != self.vector_dimension {
            if self.count_embeddings(None).await? > 0 {
                return Err(ScribeError::Index(format!(
                    "Vector dimension {} does not match the indexed dimension {}",
                    vector_dim, self.vector_dimension
                )));
            }

            info!(
                "Vector dimension changed from {} to {}, recreating empty table",
                self.vector_dimension, vector_dim
            );
            self.drop_table_if_exists().await?;
            self.create_table(vector_dim).await?;
            self.vector_dimension = vector_dim;
        }

        let record_batch = self.create_record_batch(&records)?;
        let table = self.open_table().await?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| ScribeError::Index(format!("Failed to insert embeddings: {}", e)))?;

        info!("Successfully stored {} embeddings", records.len());
        Ok(())
    }

    /// Create a RecordBatch from embedding records
    fn create_record_batch(&self, records: &[EmbeddingRecord]) -> Result<RecordBatch, ScribeError> {
        let len = records.len();
        let vector_dim = self.vector_dimension;

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);
        let mut ordinals = Vec::with_capacity(len);
        let mut knowledge_base_ids = Vec::with_capacity(len);
        let mut knowledge_bases = Vec::with_capacity(len);
        let mut categories = Vec::with_capacity(len);
        let mut source_rows = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut token_counts = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        for record in records {
            ids.push(record.id.as_str());
            flat_values.extend_from_slice(&record.vector);
            ordinals.push(record.metadata.ordinal);
            knowledge_base_ids.push(record.metadata.knowledge_base_id);
            knowledge_bases.push(record.metadata.knowledge_base.as_str());
            categories.push(record.metadata.category.as_deref());
            source_rows.push(record.metadata.source_row);
            contents.push(record.metadata.content.as_str());
            token_counts.push(record.metadata.token_count);
            created_ats.push(record.metadata.created_at.as_str());
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
                .map_err(|e| {
                    ScribeError::Index(format!("Failed to create vector array: {}", e))
                })?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(UInt32Array::from(ordinals)),
            Arc::new(Int64Array::from(knowledge_base_ids)),
            Arc::new(StringArray::from(knowledge_bases)),
            Arc::new(StringArray::from(categories)),
            Arc::new(UInt32Array::from(source_rows)),
            Arc::new(StringArray::from(contents)),
            Arc::new(UInt32Array::from(token_counts)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(Self::create_schema(vector_dim), arrays)
            .map_err(|e| ScribeError::Index(format!("Failed to create record batch: {}", e)))
    }

    /// Cosine nearest-neighbour search, ascending by distance
    ///
    /// Equal distances are ordered by entry ordinal and then id, so repeated
    /// searches over an unchanged table return identical sequences. Rows tied
    /// with the last one kept are all fetched before the cut, widening the
    /// request as needed.
    #[inline]
    pub async fn search_similar(
        &self,
        query_vector: &[f32],
        limit: usize,
        knowledge_base_id: Option<i64>,
    ) -> Result<Vec<SearchResult>, ScribeError> {
        debug!("Searching for similar vectors with limit: {}", limit);

        if limit == 0 {
            return Ok(Vec::new());
        }

        let table = self.open_table().await?;
        let mut fetch = limit.saturating_add(TIE_OVERFETCH);

        loop {
            let mut query = table
                .vector_search(query_vector)
                .map_err(|e| ScribeError::Index(format!("Failed to create vector search: {}", e)))?
                .column("vector")
                .distance_type(DistanceType::Cosine)
                .limit(fetch);

            if let Some(id) = knowledge_base_id {
                query = query.only_if(knowledge_base_filter(id));
            }

            let results = query
                .execute()
                .await
                .map_err(|e| ScribeError::Index(format!("Failed to execute search: {}", e)))?;

            let mut search_results = Self::parse_search_results_stream(results).await?;
            search_results.sort_by(|a, b| {
                a.distance
                    .total_cmp(&b.distance)
                    .then(a.metadata.ordinal.cmp(&b.metadata.ordinal))
                    .then_with(|| a.entry_id.cmp(&b.entry_id))
            });

            let exhausted = search_results.len() < fetch;
            let cut_is_clear = match (search_results.get(limit - 1), search_results.last()) {
                (Some(kept), Some(furthest)) => kept.distance < furthest.distance,
                _ => true,
            };

            if exhausted || cut_is_clear || fetch == usize::MAX {
                search_results.truncate(limit);
                return Ok(search_results);
            }

            debug!("Distance tie at the cut, widening search beyond {} rows", fetch);
            fetch = fetch.saturating_mul(2);
        }
    }

    /// Parse search results from LanceDB stream into SearchResult structs
    async fn parse_search_results_stream(
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<SearchResult>, ScribeError> {
        let mut search_results = Vec::new();

        while let Some(batch_result) = results
            .try_next()
            .await
            .map_err(|e| ScribeError::Index(format!("Failed to read result stream: {}", e)))?
        {
            search_results.extend(Self::parse_search_batch(&batch_result)?);
        }

        debug!("Parsed {} search results from stream", search_results.len());
        Ok(search_results)
    }

    /// Parse a single record batch from search results
    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>, ScribeError> {
        let ids = column::<StringArray>(batch, "id")?;
        let ordinals = column::<UInt32Array>(batch, "ordinal")?;
        let knowledge_base_ids = column::<Int64Array>(batch, "knowledge_base_id")?;
        let knowledge_bases = column::<StringArray>(batch, "knowledge_base")?;
        let categories = column::<StringArray>(batch, "category")?;
        let source_rows = column::<UInt32Array>(batch, "source_row")?;
        let contents = column::<StringArray>(batch, "content")?;
        let token_counts = column::<UInt32Array>(batch, "token_count")?;
        let created_ats = column::<StringArray>(batch, "created_at")?;

        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let results = (0..batch.num_rows())
            .map(|row| SearchResult {
                entry_id: ids.value(row).to_string(),
                metadata: EntryMetadata {
                    ordinal: ordinals.value(row),
                    knowledge_base_id: knowledge_base_ids.value(row),
                    knowledge_base: knowledge_bases.value(row).to_string(),
                    category: (!categories.is_null(row))
                        .then(|| categories.value(row).to_string()),
                    source_row: (!source_rows.is_null(row)).then(|| source_rows.value(row)),
                    content: contents.value(row).to_string(),
                    token_count: token_counts.value(row),
                    created_at: created_ats.value(row).to_string(),
                },
                distance: distances
                    .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) }),
            })
            .collect();

        Ok(results)
    }

    /// Delete all embeddings for a knowledge base
    #[inline]
    pub async fn delete_knowledge_base_embeddings(
        &mut self,
        knowledge_base_id: i64,
    ) -> Result<(), ScribeError> {
        debug!("Deleting embeddings for knowledge base: {}", knowledge_base_id);

        self.open_table()
            .await?
            .delete(&knowledge_base_filter(knowledge_base_id))
            .await
            .map_err(|e| {
                ScribeError::Index(format!("Failed to delete knowledge base embeddings: {}", e))
            })?;

        info!("Deleted embeddings for knowledge base: {}", knowledge_base_id);
        Ok(())
    }

    /// Count stored embeddings, optionally for one knowledge base
    #[inline]
    pub async fn count_embeddings(
        &self,
        knowledge_base_id: Option<i64>,
    ) -> Result<u64, ScribeError> {
        let count = self
            .open_table()
            .await?
            .count_rows(knowledge_base_id.map(knowledge_base_filter))
            .await
            .map_err(|e| ScribeError::Index(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }

    /// Move a corrupted database aside so a fresh one can be created
    fn attempt_corruption_recovery(db_path: &Path) -> Result<(), ScribeError> {
        warn!("Attempting database corruption recovery at {:?}", db_path);

        if db_path.exists() {
            let backup_path = db_path.with_extension("corrupted_backup");
            if let Err(e) = std::fs::rename(db_path, &backup_path) {
                error!("Failed to backup corrupted database: {}", e);
            } else {
                info!("Corrupted database backed up to {:?}", backup_path);
            }
        }

        if db_path.exists() {
            std::fs::remove_dir_all(db_path).map_err(|e| {
                ScribeError::Index(format!("Failed to remove corrupted database: {}", e))
            })?;
        }

        info!("Database corruption recovery completed");
        Ok(())
    }

    /// Drop the entries table if it exists
    async fn drop_table_if_exists(&self) -> Result<(), ScribeError> {
        let table_names =
            self.connection.table_names().execute().await.map_err(|e| {
                ScribeError::Index(format!("Failed to list tables for drop: {}", e))
            })?;

        if table_names.contains(&self.table_name) {
            info!("Dropping existing entries table");
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| ScribeError::Index(format!("Failed to drop table: {}", e)))?;
        }

        Ok(())
    }
}

fn knowledge_base_filter(knowledge_base_id: i64) -> String {
    format!("knowledge_base_id = {knowledge_base_id}")
}

fn column<'a, T: Array + 'static>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a T, ScribeError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| ScribeError::Index(format!("Missing {name} column")))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| ScribeError::Index(format!("Invalid {name} column type")))
}
