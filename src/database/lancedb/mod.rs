// LanceDB backend
// Local on-disk tables, one per logical index, searched by cosine distance


use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{
    MetadataFilter, RecordMetadata, UpsertReport, VectorMatch, VectorRecord, VectorStore,
    check_dimensions, vector_store_error,
};
use crate::Result;

/// Vector store backed by a local LanceDB directory
pub struct LanceStore {
    connection: Connection,
    batch_size: usize,
}

impl std::fmt::Debug for LanceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanceStore")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl LanceStore {
    /// Open (creating if needed) the database directory at `path`
    #[inline]
    pub async fn open(path: &Path, batch_size: usize) -> Result<Self> {
        std::fs::create_dir_all(path).map_err(|e| {
            vector_store_error("Failed to create vector database directory", e)
        })?;

        let uri = format!("file://{}", path.display());
        debug!("Connecting to LanceDB at {}", uri);
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| vector_store_error("Failed to connect to LanceDB", e))?;

        Ok(Self {
            connection,
            batch_size: batch_size.max(1),
        })
    }

    async fn table_exists(&self, index: &str) -> Result<bool> {
        let names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| vector_store_error("Failed to list tables", e))?;
        Ok(names.iter().any(|name| name == index))
    }

    async fn open_table(&self, index: &str) -> Result<Table> {
        self.connection
            .open_table(index)
            .execute()
            .await
            .map_err(|e| vector_store_error(&format!("Failed to open table {}", index), e))
    }

    /// Vector width of an existing table, read from its schema
    async fn table_dimension(table: &Table) -> Result<usize> {
        let schema = table
            .schema()
            .await
            .map_err(|e| vector_store_error("Failed to get table schema", e))?;

        schema
            .fields()
            .iter()
            .find(|field| field.name() == "vector")
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            })
            .ok_or_else(|| vector_store_error("Table schema", "missing fixed-size vector column"))
    }

    /// Insert new ids and overwrite existing ones in a single merge, so a
    /// failed batch leaves previously stored rows untouched
    async fn upsert_batch(
        &self,
        table: &Table,
        dimension: usize,
        batch: &[VectorRecord],
    ) -> Result<()> {
        let record_batch = create_record_batch(dimension, batch)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| vector_store_error("Failed to merge records", e))?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for LanceStore {
    async fn ensure_index(&self, index: &str, dimension: usize) -> Result<()> {
        if self.table_exists(index).await? {
            let table = self.open_table(index).await?;
            let existing = Self::table_dimension(&table).await?;
            if existing != dimension {
                return Err(vector_store_error(
                    &format!("Table {}", index),
                    format!("has {} dimensions, expected {}", existing, dimension),
                ));
            }
            debug!("Table {} already exists", index);
            return Ok(());
        }

        info!("Creating table {} with {} dimensions", index, dimension);
        self.connection
            .create_empty_table(index, create_schema(dimension))
            .execute()
            .await
            .map_err(|e| vector_store_error(&format!("Failed to create table {}", index), e))?;
        Ok(())
    }

    async fn list_indexes(&self) -> Result<Vec<String>> {
        self.connection
            .table_names()
            .execute()
            .await
            .map_err(|e| vector_store_error("Failed to list tables", e))
    }

    async fn count(&self, index: &str) -> Result<usize> {
        let table = self.open_table(index).await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| vector_store_error("Failed to count rows", e))
    }

    async fn upsert(&self, index: &str, records: Vec<VectorRecord>) -> Result<UpsertReport> {
        let mut report = UpsertReport::default();
        let Some(first) = records.first() else {
            return Ok(report);
        };

        if !self.table_exists(index).await? {
            self.ensure_index(index, first.values.len()).await?;
        }
        let table = self.open_table(index).await?;
        let dimension = Self::table_dimension(&table).await?;
        check_dimensions(
            index,
            dimension,
            records.iter().map(|record| record.values.as_slice()),
        )?;
        let total_batches = records.len().div_ceil(self.batch_size);

        for (batch_number, batch) in records.chunks(self.batch_size).enumerate() {
            match self.upsert_batch(&table, dimension, batch).await {
                Ok(()) => report.upserted += batch.len(),
                Err(e) => {
                    error!(
                        "Upsert batch {}/{} into {} failed, skipping {} records: {}",
                        batch_number + 1,
                        total_batches,
                        index,
                        batch.len(),
                        e
                    );
                    report.failed_batches += 1;
                    report.failed_records += batch.len();
                }
            }
        }

        if !report.is_clean() {
            warn!(
                "Upserted {} records into {}, {} batches failed",
                report.upserted, index, report.failed_batches
            );
        }
        Ok(report)
    }

    async fn query(
        &self,
        index: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>> {
        let table = self.open_table(index).await?;
        check_dimensions(index, Self::table_dimension(&table).await?, [vector])?;

        let mut query = table
            .query()
            .nearest_to(vector)
            .map_err(|e| vector_store_error("Failed to build vector search", e))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(top_k);
        if let Some(filter) = filter {
            query = query.only_if(predicate(filter));
        }

        let results = query
            .execute()
            .await
            .map_err(|e| vector_store_error("Failed to execute search", e))?;
        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| vector_store_error("Failed to read result stream", e))?;

        let mut matches = Vec::new();
        for batch in &batches {
            matches.extend(parse_batch(batch)?);
        }
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        debug!("Search in {} returned {} matches", index, matches.len());
        Ok(matches)
    }

    async fn fetch_by_metadata(
        &self,
        index: &str,
        filter: &MetadataFilter,
        limit: usize,
    ) -> Result<Vec<VectorMatch>> {
        let table = self.open_table(index).await?;

        let results = table
            .query()
            .only_if(predicate(filter))
            .limit(limit)
            .execute()
            .await
            .map_err(|e| vector_store_error("Failed to scan table", e))?;
        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| vector_store_error("Failed to read result stream", e))?;

        let mut matches = Vec::new();
        for batch in &batches {
            matches.extend(parse_batch(batch)?);
        }
        Ok(matches)
    }
}

const METADATA_COLUMNS: [&str; 4] = ["paper_id", "title", "year", "content"];
const OPTIONAL_COLUMNS: [&str; 5] = ["section", "filename", "authors", "pdf_url", "abstract_url"];

fn create_schema(dimension: usize) -> Arc<Schema> {
    let mut fields = vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension as i32,
            ),
            false,
        ),
    ];
    fields.extend(
        METADATA_COLUMNS
            .iter()
            .map(|name| Field::new(*name, DataType::Utf8, false)),
    );
    fields.extend(
        OPTIONAL_COLUMNS
            .iter()
            .map(|name| Field::new(*name, DataType::Utf8, true)),
    );
    Arc::new(Schema::new(fields))
}

fn create_record_batch(dimension: usize, records: &[VectorRecord]) -> Result<RecordBatch> {
    if let Some(bad) = records.iter().find(|r| r.values.len() != dimension) {
        return Err(vector_store_error(
            &format!("Record {}", bad.id),
            format!("has {} dimensions, table expects {}", bad.values.len(), dimension),
        ));
    }

    let flat_values = records
        .iter()
        .flat_map(|record| record.values.iter().copied())
        .collect::<Vec<f32>>();
    let field = Arc::new(Field::new("item", DataType::Float32, true));
    let vector_array = FixedSizeListArray::try_new(
        field,
        dimension as i32,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| vector_store_error("Failed to create vector array", e))?;

    let required = |get: fn(&RecordMetadata) -> &str| -> Arc<dyn Array> {
        Arc::new(StringArray::from(
            records.iter().map(|r| get(&r.metadata)).collect::<Vec<_>>(),
        ))
    };
    let optional = |get: fn(&RecordMetadata) -> Option<&str>| -> Arc<dyn Array> {
        Arc::new(StringArray::from(
            records.iter().map(|r| get(&r.metadata)).collect::<Vec<_>>(),
        ))
    };

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(
            records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(vector_array),
        required(|m| m.paper_id.as_str()),
        required(|m| m.title.as_str()),
        required(|m| m.year.as_str()),
        required(|m| m.content.as_str()),
        optional(|m| m.section.as_deref()),
        optional(|m| m.filename.as_deref()),
        optional(|m| m.authors.as_deref()),
        optional(|m| m.pdf_url.as_deref()),
        optional(|m| m.abstract_url.as_deref()),
    ];

    RecordBatch::try_new(create_schema(dimension), arrays)
        .map_err(|e| vector_store_error("Failed to create record batch", e))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| vector_store_error("Result batch", format!("missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| vector_store_error("Result batch", format!("invalid {} column type", name)))
}

fn optional_value(column: &StringArray, row: usize) -> Option<String> {
    (!column.is_null(row)).then(|| column.value(row).to_string())
}

fn parse_batch(batch: &RecordBatch) -> Result<Vec<VectorMatch>> {
    let ids = string_column(batch, "id")?;
    let paper_ids = string_column(batch, "paper_id")?;
    let titles = string_column(batch, "title")?;
    let years = string_column(batch, "year")?;
    let contents = string_column(batch, "content")?;
    let sections = string_column(batch, "section")?;
    let filenames = string_column(batch, "filename")?;
    let authors = string_column(batch, "authors")?;
    let pdf_urls = string_column(batch, "pdf_url")?;
    let abstract_urls = string_column(batch, "abstract_url")?;

    // Present on vector searches only
    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    Ok((0..batch.num_rows())
        .map(|row| {
            let distance = distances
                .filter(|d| !d.is_null(row))
                .map_or(1.0, |d| d.value(row));
            VectorMatch {
                id: ids.value(row).to_string(),
                score: 1.0 - distance,
                metadata: RecordMetadata {
                    paper_id: paper_ids.value(row).to_string(),
                    title: titles.value(row).to_string(),
                    year: years.value(row).to_string(),
                    content: contents.value(row).to_string(),
                    section: optional_value(sections, row),
                    filename: optional_value(filenames, row),
                    authors: optional_value(authors, row),
                    pdf_url: optional_value(pdf_urls, row),
                    abstract_url: optional_value(abstract_urls, row),
                },
            }
        })
        .collect())
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn predicate(filter: &MetadataFilter) -> String {
    match filter {
        MetadataFilter::TitleEquals(title) => format!("title = {}", quote(title)),
    }
}
