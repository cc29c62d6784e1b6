// Indexer module
// Turns dataset directories into embedded records in one of the three indexes

#[cfg(test)]
mod tests;

use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::config::IndexKind;
use crate::database::{RecordMetadata, UpsertReport, VectorRecord, VectorStore, record_id};
use crate::documents::{
    Dataset, Paper, PaperCatalog, PdfEntry, SectionExtractor, discover_datasets, extract_text,
    list_pdfs,
};
use crate::embeddings::{ChunkingConfig, Embedder, chunk_for_embedding};

/// What gets embedded for each paper
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum IndexStrategy {
    /// Overlapping word windows over the whole PDF text
    FullText,
    /// One record per recognised section of the PDF
    Sections,
    /// One record per paper from the abstracts CSV, no PDFs read
    Abstracts,
}

impl IndexStrategy {
    /// The index this strategy writes to
    #[inline]
    pub fn kind(self) -> IndexKind {
        match self {
            Self::FullText => IndexKind::Contents,
            Self::Sections => IndexKind::Sections,
            Self::Abstracts => IndexKind::Abstracts,
        }
    }
}

impl fmt::Display for IndexStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullText => write!(f, "full-text"),
            Self::Sections => write!(f, "sections"),
            Self::Abstracts => write!(f, "abstracts"),
        }
    }
}

/// Counts from one indexing run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub datasets: usize,
    pub papers_indexed: usize,
    pub papers_skipped: usize,
    pub records_embedded: usize,
    pub report: UpsertReport,
}

impl IndexSummary {
    fn merge(&mut self, other: Self) {
        self.datasets += other.datasets;
        self.papers_indexed += other.papers_indexed;
        self.papers_skipped += other.papers_skipped;
        self.records_embedded += other.records_embedded;
        self.report.merge(other.report);
    }
}

/// A piece of text about to be embedded, with the label that keeps its id stable
#[derive(Debug, Clone, PartialEq, Eq)]
struct Unit {
    label: String,
    text: String,
    section: Option<String>,
}

pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    chunking: ChunkingConfig,
    sections: SectionExtractor,
    show_progress: bool,
}

impl Indexer {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        chunking: ChunkingConfig,
    ) -> anyhow::Result<Self> {
        chunking.step()?;

        Ok(Self {
            embedder,
            store,
            chunking,
            sections: SectionExtractor::new()?,
            show_progress: false,
        })
    }

    #[inline]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Index every dataset found under `root` into `index`, creating the
    /// index first if needed. Unreadable datasets and papers are skipped.
    #[inline]
    pub async fn index_root(
        &self,
        root: &Path,
        strategy: IndexStrategy,
        index: &str,
    ) -> Result<IndexSummary> {
        let datasets = discover_datasets(root)?;
        if datasets.is_empty() {
            warn!("No datasets found under {}", root.display());
        }

        self.store
            .ensure_index(index, self.embedder.dimension())
            .await?;

        let mut summary = IndexSummary::default();
        for dataset in &datasets {
            summary.merge(self.index_dataset(dataset, strategy, index).await);
        }

        info!(
            "Indexed {} papers from {} datasets into {} ({} records, {} papers skipped)",
            summary.papers_indexed,
            summary.datasets,
            index,
            summary.report.upserted,
            summary.papers_skipped
        );
        Ok(summary)
    }

    /// Index a single dataset.
    ///
    /// Nothing here fails the run: an unreadable catalog or papers directory
    /// skips the dataset, and a store error counts every record as failed.
    #[inline]
    pub async fn index_dataset(
        &self,
        dataset: &Dataset,
        strategy: IndexStrategy,
        index: &str,
    ) -> IndexSummary {
        info!("Processing {} ({})", dataset.label(), strategy);

        let catalog = match PaperCatalog::load(dataset) {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!("Skipping {}: {}", dataset.label(), e);
                return IndexSummary::default();
            }
        };

        let mut summary = IndexSummary {
            datasets: 1,
            ..IndexSummary::default()
        };
        let records = match strategy {
            IndexStrategy::Abstracts => self.abstract_records(&catalog, index, &mut summary),
            IndexStrategy::FullText | IndexStrategy::Sections => {
                match list_pdfs(&dataset.papers_dir()) {
                    Ok(pdfs) => self.pdf_records(&catalog, &pdfs, strategy, index, &mut summary),
                    Err(e) => {
                        warn!("Skipping {}: cannot list papers: {}", dataset.label(), e);
                        return summary;
                    }
                }
            }
        };

        summary.records_embedded = records.len();
        if !records.is_empty() {
            let count = records.len();
            summary.report = match self.store.upsert(index, records).await {
                Ok(report) => report,
                Err(e) => {
                    error!(
                        "Storing {} records from {} in {} failed: {}",
                        count,
                        dataset.label(),
                        index,
                        e
                    );
                    UpsertReport {
                        upserted: 0,
                        failed_batches: 1,
                        failed_records: count,
                    }
                }
            };
        }
        if !summary.report.is_clean() {
            warn!(
                "{} batches ({} records) from {} were not stored",
                summary.report.failed_batches,
                summary.report.failed_records,
                dataset.label()
            );
        }

        summary
    }

    /// Embed every abstract in the catalog with one batch call. If the batch
    /// fails, abstracts are retried one at a time so a single bad one only
    /// skips its own paper.
    fn abstract_records(
        &self,
        catalog: &PaperCatalog,
        index: &str,
        summary: &mut IndexSummary,
    ) -> Vec<VectorRecord> {
        let papers: Vec<&Paper> = catalog
            .papers()
            .iter()
            .filter(|paper| {
                let usable =
                    !paper.title.trim().is_empty() && !paper.abstract_text.trim().is_empty();
                if !usable {
                    debug!("Skipping {}: no title or abstract", paper.id);
                }
                usable
            })
            .collect();
        summary.papers_skipped += catalog.len() - papers.len();
        if papers.is_empty() {
            return Vec::new();
        }

        let texts: Vec<String> = papers
            .iter()
            .map(|paper| paper.abstract_text.trim().to_string())
            .collect();
        let progress = self.progress_bar(papers.len(), "Embedding abstracts");
        let vectors: Vec<Result<Vec<f32>>> = match self.embedder.embed_batch(&texts) {
            Ok(vectors) => vectors.into_iter().map(Ok).collect(),
            Err(e) => {
                warn!(
                    "Embedding {} abstracts in one batch failed, retrying one by one: {}",
                    texts.len(),
                    e
                );
                texts.iter().map(|text| self.embedder.embed(text)).collect()
            }
        };

        let mut records = Vec::with_capacity(papers.len());
        for ((paper, text), vector) in papers.into_iter().zip(texts).zip(vectors) {
            progress.inc(1);
            match vector {
                Ok(values) => {
                    let unit = Unit {
                        label: "abstract".to_string(),
                        text,
                        section: None,
                    };
                    let mut record = build_record(index, paper, unit, None, values);
                    record.metadata.authors = Some(paper.authors.clone());
                    record.metadata.pdf_url = Some(paper.pdf_url.clone());
                    record.metadata.abstract_url = Some(paper.abstract_url.clone());
                    records.push(record);
                    summary.papers_indexed += 1;
                }
                Err(e) => {
                    warn!("Skipping abstract of {:?}: {}", paper.title, e);
                    summary.papers_skipped += 1;
                }
            }
        }

        progress.finish_and_clear();
        records
    }

    fn pdf_records(
        &self,
        catalog: &PaperCatalog,
        pdfs: &[PdfEntry],
        strategy: IndexStrategy,
        index: &str,
        summary: &mut IndexSummary,
    ) -> Vec<VectorRecord> {
        let progress = self.progress_bar(pdfs.len(), "Embedding papers");
        let mut records = Vec::new();

        for entry in pdfs {
            progress.inc(1);
            let filename = entry.file_name();
            progress.set_message(filename.clone());

            let Some(paper) = catalog.paper_at(entry.row) else {
                warn!("No title for paper {}. Skipping.", filename);
                summary.papers_skipped += 1;
                continue;
            };

            let embedded = extract_text(&entry.path)
                .and_then(|text| self.paper_units(strategy, &text))
                .and_then(|units| {
                    let filename = (strategy == IndexStrategy::Sections).then_some(&filename);
                    self.embed_units(paper, units, index, filename.map(String::as_str))
                });
            match embedded {
                Ok(embedded) => {
                    debug!("{} produced {} records", filename, embedded.len());
                    records.extend(embedded);
                    summary.papers_indexed += 1;
                }
                Err(e) => {
                    warn!("Skipping {}: {}", filename, e);
                    summary.papers_skipped += 1;
                }
            }
        }

        progress.finish_and_clear();
        records
    }

    /// Split one paper's text into embeddable units; short units are dropped
    fn paper_units(&self, strategy: IndexStrategy, text: &str) -> Result<Vec<Unit>> {
        let units = match strategy {
            IndexStrategy::FullText => chunk_for_embedding(text, &self.chunking)?
                .into_iter()
                .enumerate()
                .map(|(i, chunk)| Unit {
                    label: format!("chunk-{}", i),
                    text: chunk,
                    section: None,
                })
                .collect(),
            IndexStrategy::Sections => self
                .sections
                .extract(text)
                .into_iter()
                .filter_map(|section| {
                    let content = section.content.trim();
                    (content.chars().count() >= self.chunking.min_chunk_chars).then(|| Unit {
                        label: section.name.as_str().to_string(),
                        text: content.to_string(),
                        section: Some(section.name.to_string()),
                    })
                })
                .collect(),
            IndexStrategy::Abstracts => Vec::new(),
        };
        Ok(units)
    }

    fn embed_units(
        &self,
        paper: &Paper,
        units: Vec<Unit>,
        index: &str,
        filename: Option<&str>,
    ) -> Result<Vec<VectorRecord>> {
        if units.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = units.iter().map(|unit| unit.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts)?;

        Ok(units
            .into_iter()
            .zip(vectors)
            .map(|(unit, values)| build_record(index, paper, unit, filename, values))
            .collect())
    }

    fn progress_bar(&self, len: usize, prefix: &'static str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let style = ProgressStyle::with_template("{spinner} {prefix} [{pos}/{len}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        ProgressBar::new(len as u64)
            .with_style(style)
            .with_prefix(prefix)
    }
}

fn build_record(
    index: &str,
    paper: &Paper,
    unit: Unit,
    filename: Option<&str>,
    values: Vec<f32>,
) -> VectorRecord {
    VectorRecord {
        id: record_id(index, &paper.id, &unit.label),
        values,
        metadata: RecordMetadata {
            paper_id: paper.id.clone(),
            title: paper.title.clone(),
            year: paper.year.clone(),
            content: unit.text,
            section: unit.section,
            filename: filename.map(str::to_string),
            ..RecordMetadata::default()
        },
    }
}
