// Database module
// Vector index capability plus its hosted (Pinecone) and local (LanceDB) backends


pub mod lancedb;
pub mod pinecone;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{Config, VectorBackend};
use crate::{Result, ScholarError};

pub use self::lancedb::LanceStore;
pub use self::pinecone::PineconeStore;

/// Metadata stored alongside every vector.
///
/// Chunk records fill `content` with the chunk text and may carry `section`
/// or `filename`; abstract records carry the catalog fields and the abstract
/// as `content`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    #[serde(default)]
    pub paper_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstract_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: RecordMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    /// Cosine similarity, higher is closer
    pub score: f32,
    pub metadata: RecordMetadata,
}

/// Exact-match metadata predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataFilter {
    TitleEquals(String),
}

impl MetadataFilter {
    #[inline]
    pub fn title(title: impl Into<String>) -> Self {
        Self::TitleEquals(title.into())
    }

    #[inline]
    pub fn matches(&self, metadata: &RecordMetadata) -> bool {
        match self {
            Self::TitleEquals(title) => metadata.title == *title,
        }
    }
}

/// Outcome of a batched upsert; failed batches are skipped, not retried
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub upserted: usize,
    pub failed_batches: usize,
    pub failed_records: usize,
}

impl UpsertReport {
    #[inline]
    pub fn merge(&mut self, other: Self) {
        self.upserted += other.upserted;
        self.failed_batches += other.failed_batches;
        self.failed_records += other.failed_records;
    }

    #[inline]
    pub fn is_clean(&self) -> bool {
        self.failed_batches == 0
    }
}

/// A set of named, fixed-dimension cosine indexes
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the index if it does not exist yet
    async fn ensure_index(&self, index: &str, dimension: usize) -> Result<()>;

    /// Names of the indexes that currently exist
    async fn list_indexes(&self) -> Result<Vec<String>>;

    /// Number of records stored in `index`
    async fn count(&self, index: &str) -> Result<usize>;

    /// Insert or overwrite records by id, in batches
    async fn upsert(&self, index: &str, records: Vec<VectorRecord>) -> Result<UpsertReport>;

    /// Nearest neighbours by descending cosine similarity
    async fn query(
        &self,
        index: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>>;

    /// Every record matching `filter`, up to `limit`, with no similarity ordering
    async fn fetch_by_metadata(
        &self,
        index: &str,
        filter: &MetadataFilter,
        limit: usize,
    ) -> Result<Vec<VectorMatch>>;
}

/// Deterministic record id so re-indexing the same unit overwrites it
#[inline]
pub fn record_id(index: &str, paper_id: &str, unit: &str) -> String {
    let name = format!("{}/{}/{}", index, paper_id, unit);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

/// Build the backend selected in the configuration
#[inline]
pub async fn build_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    match config.vector_store.backend {
        VectorBackend::Pinecone => {
            let api_key = config
                .pinecone_api_key()
                .map_err(|e| ScholarError::Config(e.to_string()))?;
            let store = PineconeStore::new(&config.vector_store, api_key)?;
            Ok(Arc::new(store))
        }
        VectorBackend::Lance => {
            let store = LanceStore::open(
                &config.vector_database_path(),
                config.vector_store.batch_size,
            )
            .await?;
            Ok(Arc::new(store))
        }
    }
}

/// Reject vectors whose width differs from the index before anything is sent
pub(crate) fn check_dimensions<'a>(
    index: &str,
    expected: usize,
    vectors: impl IntoIterator<Item = &'a [f32]>,
) -> Result<()> {
    match vectors.into_iter().find(|v| v.len() != expected) {
        Some(bad) => Err(ScholarError::Embedding(format!(
            "vector has {} dimensions but index {} expects {}",
            bad.len(),
            index,
            expected
        ))),
        None => Ok(()),
    }
}

pub(crate) fn vector_store_error(context: &str, error: impl std::fmt::Display) -> ScholarError {
    ScholarError::VectorStore(format!("{}: {}", context, error))
}
