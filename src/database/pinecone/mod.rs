#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::{
    MetadataFilter, RecordMetadata, UpsertReport, VectorMatch, VectorRecord, VectorStore,
    check_dimensions, vector_store_error,
};
use crate::Result;
use crate::config::VectorStoreConfig;
use crate::http::RetryingAgent;

const API_KEY_HEADER: &str = "Api-Key";
const API_VERSION_HEADER: &str = "X-Pinecone-API-Version";

/// Client for hosted Pinecone serverless indexes.
///
/// Index management goes to the control plane; upserts and queries go to the
/// per-index data-plane host, which is looked up once and cached.
pub struct PineconeStore {
    http: RetryingAgent,
    api_key: String,
    controller_url: String,
    api_version: String,
    cloud: String,
    region: String,
    dimension: usize,
    batch_size: usize,
    endpoints: RwLock<HashMap<String, IndexEndpoint>>,
}

impl std::fmt::Debug for PineconeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PineconeStore")
            .field("controller_url", &self.controller_url)
            .field("api_version", &self.api_version)
            .field("region", &self.region)
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
struct IndexEndpoint {
    base_url: String,
    dimension: usize,
}

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexDescription>,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    name: String,
    #[serde(default)]
    host: String,
    #[serde(default)]
    dimension: Option<usize>,
}

#[derive(Debug, Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a RecordMetadata,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStats {
    #[serde(default)]
    total_vector_count: usize,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<RecordMetadata>,
}

impl PineconeStore {
    #[inline]
    pub fn new(config: &VectorStoreConfig, api_key: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(vector_store_error("Pinecone", "API key is empty"));
        }

        Ok(Self {
            http: RetryingAgent::new(Duration::from_secs(config.timeout_secs.max(1))),
            api_key: api_key.to_string(),
            controller_url: config.controller_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            cloud: config.cloud.clone(),
            region: config.region.clone(),
            dimension: config.dimension as usize,
            batch_size: config.batch_size.max(1),
            endpoints: RwLock::new(HashMap::new()),
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.http = self.http.with_retry_attempts(attempts);
        self
    }

    #[inline]
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.http = self.http.with_backoff_unit(unit);
        self
    }

    fn headers(&self) -> [(&str, &str); 2] {
        [
            (API_KEY_HEADER, self.api_key.as_str()),
            (API_VERSION_HEADER, self.api_version.as_str()),
        ]
    }

    fn describe_indexes(&self) -> Result<Vec<IndexDescription>> {
        let url = format!("{}/indexes", self.controller_url);
        let body = self
            .http
            .get(&url, &self.headers())
            .map_err(|e| vector_store_error("Failed to list indexes", e))?;
        let list: IndexList = serde_json::from_str(&body)
            .map_err(|e| vector_store_error("Invalid index list response", e))?;
        Ok(list.indexes)
    }

    /// Data-plane endpoint for `index`, resolved through the control plane on
    /// first use
    async fn endpoint(&self, index: &str) -> Result<IndexEndpoint> {
        let cached = self.endpoints.read().await.get(index).cloned();
        if let Some(endpoint) = cached {
            return Ok(endpoint);
        }

        let url = format!("{}/indexes/{}", self.controller_url, index);
        let body = self
            .http
            .get(&url, &self.headers())
            .map_err(|e| vector_store_error(&format!("Failed to describe index {}", index), e))?;
        let description: IndexDescription = serde_json::from_str(&body)
            .map_err(|e| vector_store_error("Invalid index description", e))?;

        if description.host.is_empty() {
            return Err(vector_store_error(
                &format!("Index {}", index),
                "no host reported yet",
            ));
        }

        let host = description.host.trim_end_matches('/');
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };
        let endpoint = IndexEndpoint {
            base_url,
            dimension: description.dimension.unwrap_or(self.dimension),
        };

        debug!("Resolved data plane for {}: {}", index, endpoint.base_url);
        self.endpoints
            .write()
            .await
            .insert(index.to_string(), endpoint.clone());
        Ok(endpoint)
    }

    fn upsert_batch(&self, base: &str, batch: &[VectorRecord]) -> anyhow::Result<()> {
        let request = UpsertRequest {
            vectors: batch
                .iter()
                .map(|record| UpsertVector {
                    id: &record.id,
                    values: &record.values,
                    metadata: &record.metadata,
                })
                .collect(),
        };
        let body = serde_json::to_string(&request)?;
        self.http
            .post_json(&format!("{}/vectors/upsert", base), &self.headers(), &body)?;
        Ok(())
    }

    fn run_query(
        &self,
        base: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>> {
        let mut request = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
        });
        if let Some(filter) = filter {
            request["filter"] = filter_json(filter);
        }

        let body = self
            .http
            .post_json(
                &format!("{}/query", base),
                &self.headers(),
                &request.to_string(),
            )
            .map_err(|e| vector_store_error("Query failed", e))?;
        let response: QueryResponse = serde_json::from_str(&body)
            .map_err(|e| vector_store_error("Invalid query response", e))?;

        Ok(response
            .matches
            .into_iter()
            .map(|m| VectorMatch {
                id: m.id,
                score: m.score,
                metadata: m.metadata.unwrap_or_default(),
            })
            .collect())
    }
}

fn filter_json(filter: &MetadataFilter) -> serde_json::Value {
    match filter {
        MetadataFilter::TitleEquals(title) => json!({ "title": { "$eq": title } }),
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn ensure_index(&self, index: &str, dimension: usize) -> Result<()> {
        if self
            .describe_indexes()?
            .iter()
            .any(|existing| existing.name == index)
        {
            debug!("Index {} already exists", index);
            return Ok(());
        }

        info!(
            "Creating index {} ({} dims, cosine, {}/{})",
            index, dimension, self.cloud, self.region
        );
        let request = json!({
            "name": index,
            "dimension": dimension,
            "metric": "cosine",
            "spec": { "serverless": { "cloud": self.cloud, "region": self.region } },
        });
        self.http
            .post_json(
                &format!("{}/indexes", self.controller_url),
                &self.headers(),
                &request.to_string(),
            )
            .map_err(|e| vector_store_error(&format!("Failed to create index {}", index), e))?;
        Ok(())
    }

    async fn list_indexes(&self) -> Result<Vec<String>> {
        Ok(self
            .describe_indexes()?
            .into_iter()
            .map(|index| index.name)
            .collect())
    }

    async fn count(&self, index: &str) -> Result<usize> {
        let endpoint = self.endpoint(index).await?;
        let body = self
            .http
            .post_json(
                &format!("{}/describe_index_stats", endpoint.base_url),
                &self.headers(),
                "{}",
            )
            .map_err(|e| vector_store_error(&format!("Failed to describe {}", index), e))?;
        let stats: IndexStats = serde_json::from_str(&body)
            .map_err(|e| vector_store_error("Invalid index stats response", e))?;
        Ok(stats.total_vector_count)
    }

    async fn upsert(&self, index: &str, records: Vec<VectorRecord>) -> Result<UpsertReport> {
        let mut report = UpsertReport::default();
        if records.is_empty() {
            return Ok(report);
        }

        let endpoint = self.endpoint(index).await?;
        check_dimensions(
            index,
            endpoint.dimension,
            records.iter().map(|record| record.values.as_slice()),
        )?;
        let total_batches = records.len().div_ceil(self.batch_size);

        for (batch_number, batch) in records.chunks(self.batch_size).enumerate() {
            match self.upsert_batch(&endpoint.base_url, batch) {
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

        if report.is_clean() {
            debug!("Upserted {} records into {}", report.upserted, index);
        } else {
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
        let endpoint = self.endpoint(index).await?;
        check_dimensions(index, endpoint.dimension, [vector])?;
        let mut matches = self.run_query(&endpoint.base_url, vector, top_k, filter)?;
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(matches)
    }

    /// Pinecone has no metadata scan, so this is a filtered query with an
    /// all-zero vector. Matches come back in no meaningful order.
    async fn fetch_by_metadata(
        &self,
        index: &str,
        filter: &MetadataFilter,
        limit: usize,
    ) -> Result<Vec<VectorMatch>> {
        let endpoint = self.endpoint(index).await?;
        let placeholder = vec![0.0_f32; endpoint.dimension];
        self.run_query(&endpoint.base_url, &placeholder, limit, Some(filter))
    }
}
