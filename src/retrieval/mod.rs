// Retrieval module
// Query-time lookups: similar papers by embedding, cached chunks by title


use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::database::{MetadataFilter, VectorMatch, VectorStore};
use crate::embeddings::Embedder;

/// A paper returned by similarity search over the abstracts index
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedPaper {
    pub id: String,
    pub title: String,
    pub authors: String,
    pub pdf_url: String,
    pub abstract_url: String,
    pub score: f32,
}

impl From<VectorMatch> for RetrievedPaper {
    fn from(m: VectorMatch) -> Self {
        Self {
            id: m.id,
            title: m.metadata.title,
            authors: m.metadata.authors.unwrap_or_default(),
            pdf_url: m.metadata.pdf_url.unwrap_or_default(),
            abstract_url: m.metadata.abstract_url.unwrap_or_default(),
            score: m.score,
        }
    }
}

/// A full-text chunk held in the session for follow-up questions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedChunk {
    pub content: String,
    pub title: String,
}

/// Embeds queries and reads the paper and chunk indexes.
///
/// Both lookups absorb store and embedding failures: they log the error and
/// return what they have, which callers treat as "no matches".
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    papers_index: String,
    chunks_index: String,
    title_lookup_limit: usize,
}

impl Retriever {
    pub const DEFAULT_TITLE_LOOKUP_LIMIT: usize = 100;

    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        papers_index: impl Into<String>,
        chunks_index: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            store,
            papers_index: papers_index.into(),
            chunks_index: chunks_index.into(),
            title_lookup_limit: Self::DEFAULT_TITLE_LOOKUP_LIMIT,
        }
    }

    #[inline]
    pub fn with_title_lookup_limit(mut self, limit: usize) -> Self {
        self.title_lookup_limit = limit.max(1);
        self
    }

    /// Top `top_k` papers for `query`, most similar first
    #[inline]
    pub async fn retrieve_similar_papers(&self, query: &str, top_k: usize) -> Vec<RetrievedPaper> {
        let vector = match self.embedder.embed(query) {
            Ok(vector) => vector,
            Err(e) => {
                warn!("Could not embed query, treating as no matches: {}", e);
                return Vec::new();
            }
        };

        match self
            .store
            .query(&self.papers_index, &vector, top_k, None)
            .await
        {
            Ok(matches) => {
                debug!("Retrieved {} papers for query", matches.len());
                matches.into_iter().map(RetrievedPaper::from).collect()
            }
            Err(e) => {
                error!("Paper search in {} failed: {}", self.papers_index, e);
                Vec::new()
            }
        }
    }

    /// Every indexed chunk whose title exactly equals one of `titles`, grouped
    /// by title in the order given. A failed lookup for one title is logged and
    /// the remaining titles are still fetched.
    #[inline]
    pub async fn retrieve_chunks_by_titles(&self, titles: &[String]) -> Vec<CachedChunk> {
        let mut chunks = Vec::new();

        for title in titles {
            let filter = MetadataFilter::title(title.as_str());
            match self
                .store
                .fetch_by_metadata(&self.chunks_index, &filter, self.title_lookup_limit)
                .await
            {
                Ok(matches) => {
                    debug!("Found {} chunks titled {:?}", matches.len(), title);
                    chunks.extend(matches.into_iter().map(|m| CachedChunk {
                        content: m.metadata.content,
                        title: m.metadata.title,
                    }));
                }
                Err(e) => error!("Error retrieving chunks for title {:?}: {}", title, e),
            }
        }

        chunks
    }
}
