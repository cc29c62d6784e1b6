// In-memory stand-ins for the external capabilities, shared by unit tests

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::database::{
    MetadataFilter, RecordMetadata, UpsertReport, VectorMatch, VectorRecord, VectorStore,
};
use crate::embeddings::Embedder;
use crate::llm::{ChatMessage, ChatModel};
use crate::{Result, ScholarError};

pub(crate) struct FakeEmbedder {
    dimension: usize,
    fail: bool,
    /// Texts containing this marker fail to embed
    fail_on: Option<String>,
    calls: AtomicUsize,
    batch_calls: AtomicUsize,
}

impl FakeEmbedder {
    pub(crate) fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail: false,
            fail_on: None,
            calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing_on(marker: &str) -> Self {
        Self {
            fail_on: Some(marker.to_string()),
            ..Self::new(3)
        }
    }

    pub(crate) fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(3)
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for FakeEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let marked = self
            .fail_on
            .as_deref()
            .is_some_and(|marker| text.contains(marker));
        if self.fail || marked || text.trim().is_empty() {
            return Err(ScholarError::Embedding("fake embedder failure".to_string()));
        }
        let mut vector = vec![0.0; self.dimension];
        vector[text.len() % self.dimension] = 1.0;
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

#[derive(Default)]
pub(crate) struct FakeStore {
    pub(crate) papers: Vec<VectorMatch>,
    pub(crate) chunks: Vec<VectorMatch>,
    pub(crate) fail_queries: bool,
    pub(crate) failing_titles: Vec<String>,
    pub(crate) failing_index: Option<String>,
    /// Upserts containing a record from this year return an error
    pub(crate) rejected_year: Option<String>,
    pub(crate) query_calls: AtomicUsize,
    pub(crate) fetch_calls: AtomicUsize,
    pub(crate) ensured: Mutex<Vec<(String, usize)>>,
    pub(crate) upserted: Mutex<Vec<(String, VectorRecord)>>,
}

impl FakeStore {
    pub(crate) fn with_papers(papers: Vec<VectorMatch>) -> Self {
        Self {
            papers,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst) + self.fetch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn upserted_into(&self, index: &str) -> Vec<VectorRecord> {
        self.upserted
            .lock()
            .expect("upsert log lock")
            .iter()
            .filter(|(name, _)| name == index)
            .map(|(_, record)| record.clone())
            .collect()
    }
}

#[async_trait]
impl VectorStore for FakeStore {
    async fn ensure_index(&self, index: &str, dimension: usize) -> Result<()> {
        self.ensured
            .lock()
            .expect("ensure log lock")
            .push((index.to_string(), dimension));
        Ok(())
    }

    async fn list_indexes(&self) -> Result<Vec<String>> {
        Ok(self
            .ensured
            .lock()
            .expect("ensure log lock")
            .iter()
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn count(&self, index: &str) -> Result<usize> {
        Ok(self.upserted_into(index).len())
    }

    async fn upsert(&self, index: &str, records: Vec<VectorRecord>) -> Result<UpsertReport> {
        if self.failing_index.as_deref() == Some(index) {
            return Ok(UpsertReport {
                upserted: 0,
                failed_batches: 1,
                failed_records: records.len(),
            });
        }
        let rejected = self
            .rejected_year
            .as_ref()
            .filter(|year| records.iter().any(|r| r.metadata.year == **year));
        if let Some(year) = rejected {
            return Err(ScholarError::VectorStore(format!(
                "fake upsert failure for {}",
                year
            )));
        }
        let count = records.len();
        self.upserted
            .lock()
            .expect("upsert log lock")
            .extend(records.into_iter().map(|r| (index.to_string(), r)));
        Ok(UpsertReport {
            upserted: count,
            ..UpsertReport::default()
        })
    }

    async fn query(
        &self,
        _index: &str,
        _vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries {
            return Err(ScholarError::VectorStore("fake query failure".to_string()));
        }
        Ok(self
            .papers
            .iter()
            .filter(|m| filter.is_none_or(|f| f.matches(&m.metadata)))
            .take(top_k)
            .cloned()
            .collect())
    }

    async fn fetch_by_metadata(
        &self,
        _index: &str,
        filter: &MetadataFilter,
        limit: usize,
    ) -> Result<Vec<VectorMatch>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let MetadataFilter::TitleEquals(title) = filter;
        if self.fail_queries || self.failing_titles.contains(title) {
            return Err(ScholarError::VectorStore("fake lookup failure".to_string()));
        }
        Ok(self
            .chunks
            .iter()
            .filter(|m| filter.matches(&m.metadata))
            .take(limit)
            .cloned()
            .collect())
    }
}

pub(crate) struct FakeChatModel {
    reply: Option<String>,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeChatModel {
    pub(crate) fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.prompts.lock().expect("prompt log lock").len()
    }

    /// The user message of the most recent call
    pub(crate) fn last_prompt(&self) -> String {
        self.prompts
            .lock()
            .expect("prompt log lock")
            .last()
            .and_then(|messages| messages.last())
            .map(|message| message.content.clone())
            .unwrap_or_default()
    }
}

impl ChatModel for FakeChatModel {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.prompts
            .lock()
            .expect("prompt log lock")
            .push(messages.to_vec());
        self.reply
            .clone()
            .ok_or_else(|| ScholarError::LanguageModel("fake model failure".to_string()))
    }
}

pub(crate) fn paper_match(title: &str, authors: &str, abstract_url: &str) -> VectorMatch {
    VectorMatch {
        id: format!("paper-{}", title),
        score: 0.9,
        metadata: RecordMetadata {
            title: title.to_string(),
            authors: Some(authors.to_string()),
            abstract_url: Some(abstract_url.to_string()),
            pdf_url: Some(format!("{}.pdf", abstract_url)),
            ..RecordMetadata::default()
        },
    }
}

pub(crate) fn chunk_match(title: &str, content: &str) -> VectorMatch {
    VectorMatch {
        id: format!("chunk-{}-{}", title, content.len()),
        score: 0.0,
        metadata: RecordMetadata {
            title: title.to_string(),
            content: content.to_string(),
            ..RecordMetadata::default()
        },
    }
}

/// Write a minimal PDF with one text line per page
pub(crate) fn write_pdf(path: &Path, page_texts: &[&str]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in page_texts {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content should encode"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("pdf should save");
}
