use super::*;
use crate::config::VectorStoreConfig;
use crate::testing::{FakeEmbedder, FakeStore, write_pdf};
use std::fs;
use tempfile::TempDir;

const FUSION_TEXT: &str = "FusionNet projects LiDAR points into the camera frame and fuses both \
                           modalities in a shared birds eye view grid for 3D object detection.";

fn write(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("should create parent dirs");
    }
    fs::write(path, contents).expect("should write file");
}

/// `<root>/cvpr/2023` with two catalogued papers and three PDFs:
/// a readable one for row 0, a corrupt one for row 1 and one with no row
fn dataset_root() -> TempDir {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let dir = temp_dir.path().join("cvpr").join("2023");
    write(
        &dir.join("authors.csv"),
        "title~authors\nFusionNet~Ada Lovelace\nDepthFormer~Grace Hopper\n",
    );
    write(
        &dir.join("abstracts.csv"),
        "title~abstract\nFusionNet~We fuse LiDAR and camera features.\n",
    );
    write(
        &dir.join("paper_info.csv"),
        "title~pdf_url~abstract_url\nFusionNet~https://example.org/fusion.pdf~https://example.org/fusion\n",
    );

    let papers = dir.join("papers");
    fs::create_dir_all(&papers).expect("should create papers dir");
    write_pdf(&papers.join("0.pdf"), &[FUSION_TEXT]);
    write(&papers.join("1.pdf"), "not a pdf");
    write_pdf(&papers.join("7.pdf"), &[FUSION_TEXT]);
    temp_dir
}

fn indexer(embedder: FakeEmbedder, store: &Arc<FakeStore>) -> Indexer {
    Indexer::new(
        Arc::new(embedder),
        Arc::clone(store) as Arc<dyn VectorStore>,
        ChunkingConfig::default(),
    )
    .expect("indexer should build")
}

#[test]
fn strategies_write_to_their_own_index() {
    let names = VectorStoreConfig::default();
    assert_eq!(
        names.index_name(IndexStrategy::FullText.kind()),
        "paper-contents"
    );
    assert_eq!(
        names.index_name(IndexStrategy::Sections.kind()),
        "research-sections"
    );
    assert_eq!(
        names.index_name(IndexStrategy::Abstracts.kind()),
        "research-abstracts"
    );
    assert_eq!(IndexStrategy::FullText.to_string(), "full-text");
}

#[test]
fn invalid_chunking_is_rejected_up_front() {
    let store = Arc::new(FakeStore::default());
    let result = Indexer::new(
        Arc::new(FakeEmbedder::new(3)),
        store as Arc<dyn VectorStore>,
        ChunkingConfig {
            chunk_size: 10,
            overlap: 10,
            ..ChunkingConfig::default()
        },
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn full_text_indexes_readable_papers_and_skips_the_rest() {
    let root = dataset_root();
    let store = Arc::new(FakeStore::default());

    let summary = indexer(FakeEmbedder::new(3), &store)
        .index_root(root.path(), IndexStrategy::FullText, "paper-contents")
        .await
        .expect("indexing should succeed");

    assert_eq!(summary.datasets, 1);
    assert_eq!(summary.papers_indexed, 1);
    assert_eq!(summary.papers_skipped, 2);
    assert_eq!(summary.report.upserted, 1);
    assert_eq!(
        *store.ensured.lock().expect("lock"),
        vec![("paper-contents".to_string(), 3)]
    );

    let records = store.upserted_into("paper-contents");
    assert_eq!(records.len(), 1);
    let metadata = &records[0].metadata;
    assert_eq!(metadata.paper_id, "2023_0");
    assert_eq!(metadata.title, "FusionNet");
    assert_eq!(metadata.year, "2023");
    assert!(metadata.content.contains("birds eye view"));
    assert!(metadata.section.is_none());
    assert_eq!(records[0].values.len(), 3);
}

#[tokio::test]
async fn reindexing_produces_the_same_ids() {
    let root = dataset_root();
    let store = Arc::new(FakeStore::default());
    let indexer = indexer(FakeEmbedder::new(3), &store);

    for _ in 0..2 {
        indexer
            .index_root(root.path(), IndexStrategy::FullText, "paper-contents")
            .await
            .expect("indexing should succeed");
    }

    let records = store.upserted_into("paper-contents");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, records[1].id);
}

#[tokio::test]
async fn abstracts_carry_catalog_metadata() {
    let root = dataset_root();
    let store = Arc::new(FakeStore::default());

    let summary = indexer(FakeEmbedder::new(3), &store)
        .index_root(root.path(), IndexStrategy::Abstracts, "research-abstracts")
        .await
        .expect("indexing should succeed");

    // DepthFormer has no abstract
    assert_eq!(summary.papers_indexed, 1);
    assert_eq!(summary.papers_skipped, 1);

    let records = store.upserted_into("research-abstracts");
    assert_eq!(records.len(), 1);
    let metadata = &records[0].metadata;
    assert_eq!(metadata.title, "FusionNet");
    assert_eq!(metadata.content, "We fuse LiDAR and camera features.");
    assert_eq!(metadata.authors.as_deref(), Some("Ada Lovelace"));
    assert_eq!(
        metadata.abstract_url.as_deref(),
        Some("https://example.org/fusion")
    );
    assert_eq!(
        metadata.pdf_url.as_deref(),
        Some("https://example.org/fusion.pdf")
    );
}

#[test]
fn section_units_drop_short_sections() {
    let store = Arc::new(FakeStore::default());
    let indexer = indexer(FakeEmbedder::new(3), &store);
    let long_body = "We evaluate on nuScenes and KITTI with several strong baselines. ".repeat(3);
    let text = format!("Title page\nAbstract\nToo short.\nExperiments\n{}\n", long_body);

    let units = indexer
        .paper_units(IndexStrategy::Sections, &text)
        .expect("sections should split");

    assert_eq!(units.len(), 1);
    assert_eq!(units[0].label, "experiments");
    assert_eq!(units[0].section.as_deref(), Some("experiments"));
    assert_eq!(units[0].text, long_body.trim());
}

#[test]
fn full_text_units_are_numbered_windows() {
    let store = Arc::new(FakeStore::default());
    let indexer = Indexer::new(
        Arc::new(FakeEmbedder::new(3)),
        Arc::clone(&store) as Arc<dyn VectorStore>,
        ChunkingConfig {
            chunk_size: 30,
            overlap: 10,
            min_chunk_chars: 10,
        },
    )
    .expect("indexer should build");
    let text = "word ".repeat(50);

    let units = indexer
        .paper_units(IndexStrategy::FullText, &text)
        .expect("chunking should succeed");

    let labels: Vec<&str> = units.iter().map(|unit| unit.label.as_str()).collect();
    assert_eq!(labels, vec!["chunk-0", "chunk-1"]);
}

#[tokio::test]
async fn embedding_failures_skip_papers() {
    let root = dataset_root();
    let store = Arc::new(FakeStore::default());

    let summary = indexer(FakeEmbedder::failing(), &store)
        .index_root(root.path(), IndexStrategy::FullText, "paper-contents")
        .await
        .expect("indexing should still finish");

    assert_eq!(summary.papers_indexed, 0);
    assert_eq!(summary.papers_skipped, 3);
    assert!(store.upserted_into("paper-contents").is_empty());
}

#[tokio::test]
async fn failed_batches_are_reported() {
    let root = dataset_root();
    let store = Arc::new(FakeStore {
        failing_index: Some("paper-contents".to_string()),
        ..FakeStore::default()
    });

    let summary = indexer(FakeEmbedder::new(3), &store)
        .index_root(root.path(), IndexStrategy::FullText, "paper-contents")
        .await
        .expect("indexing should still finish");

    assert_eq!(summary.records_embedded, 1);
    assert_eq!(summary.report.failed_batches, 1);
    assert!(!summary.report.is_clean());
}

#[tokio::test]
async fn dataset_without_authors_is_skipped() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let papers = temp_dir.path().join("icml").join("2024").join("papers");
    fs::create_dir_all(&papers).expect("should create papers dir");
    write_pdf(&papers.join("0.pdf"), &[FUSION_TEXT]);
    let store = Arc::new(FakeStore::default());

    let summary = indexer(FakeEmbedder::new(3), &store)
        .index_root(temp_dir.path(), IndexStrategy::FullText, "paper-contents")
        .await
        .expect("indexing should still finish");

    assert_eq!(summary, IndexSummary::default());
    assert!(store.upserted_into("paper-contents").is_empty());
}

/// `<root>/cvpr/<year>` holding only CSV metadata, one abstract per title
fn write_abstract_dataset(root: &Path, year: &str, papers: &[(&str, &str)]) {
    let dir = root.join("cvpr").join(year);
    let authors: String = papers
        .iter()
        .map(|(title, _)| format!("{}~Ada Lovelace\n", title))
        .collect();
    let abstracts: String = papers
        .iter()
        .map(|(title, text)| format!("{}~{}\n", title, text))
        .collect();
    write(&dir.join("authors.csv"), &format!("title~authors\n{}", authors));
    write(
        &dir.join("abstracts.csv"),
        &format!("title~abstract\n{}", abstracts),
    );
}

#[tokio::test]
async fn store_error_skips_only_that_dataset() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    write_abstract_dataset(
        temp_dir.path(),
        "2022",
        &[("PointPillars", "Fast encoders for LiDAR point clouds.")],
    );
    write_abstract_dataset(
        temp_dir.path(),
        "2023",
        &[("FusionNet", "We fuse LiDAR and camera features.")],
    );
    let store = Arc::new(FakeStore {
        rejected_year: Some("2022".to_string()),
        ..FakeStore::default()
    });

    let summary = indexer(FakeEmbedder::new(3), &store)
        .index_root(temp_dir.path(), IndexStrategy::Abstracts, "research-abstracts")
        .await
        .expect("a store error in one dataset should not end the run");

    assert_eq!(summary.datasets, 2);
    assert_eq!(summary.records_embedded, 2);
    assert_eq!(summary.report.upserted, 1);
    assert_eq!(summary.report.failed_batches, 1);
    assert_eq!(summary.report.failed_records, 1);

    let records = store.upserted_into("research-abstracts");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].metadata.title, "FusionNet");
    assert_eq!(records[0].metadata.year, "2023");
}

#[tokio::test]
async fn abstracts_are_embedded_in_one_batch() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    write_abstract_dataset(
        temp_dir.path(),
        "2023",
        &[
            ("FusionNet", "We fuse LiDAR and camera features."),
            ("DepthFormer", "A transformer for monocular depth."),
            ("GraphBot", "Graph planning for household robots."),
        ],
    );
    let embedder = Arc::new(FakeEmbedder::new(3));
    let store = Arc::new(FakeStore::default());
    let indexer = Indexer::new(
        Arc::clone(&embedder) as Arc<dyn Embedder>,
        Arc::clone(&store) as Arc<dyn VectorStore>,
        ChunkingConfig::default(),
    )
    .expect("indexer should build");

    let summary = indexer
        .index_root(temp_dir.path(), IndexStrategy::Abstracts, "research-abstracts")
        .await
        .expect("indexing should succeed");

    assert_eq!(summary.papers_indexed, 3);
    assert_eq!(embedder.batch_calls(), 1);
    let titles: Vec<String> = store
        .upserted_into("research-abstracts")
        .into_iter()
        .map(|record| record.metadata.title)
        .collect();
    assert_eq!(titles, vec!["FusionNet", "DepthFormer", "GraphBot"]);
}

#[tokio::test]
async fn failing_abstract_only_skips_its_own_paper() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    write_abstract_dataset(
        temp_dir.path(),
        "2023",
        &[
            ("FusionNet", "We fuse LiDAR and camera features."),
            ("Garbled", "corrupted abstract text"),
            ("GraphBot", "Graph planning for household robots."),
        ],
    );
    let store = Arc::new(FakeStore::default());

    let summary = indexer(FakeEmbedder::failing_on("corrupted"), &store)
        .index_root(temp_dir.path(), IndexStrategy::Abstracts, "research-abstracts")
        .await
        .expect("indexing should still finish");

    assert_eq!(summary.papers_indexed, 2);
    assert_eq!(summary.papers_skipped, 1);
    let records = store.upserted_into("research-abstracts");
    assert!(records.iter().all(|record| record.metadata.title != "Garbled"));
    assert_eq!(records.len(), 2);
}
