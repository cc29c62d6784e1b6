use super::*;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_store(server: &MockServer, batch_size: usize) -> PineconeStore {
    let config = VectorStoreConfig {
        controller_url: server.uri(),
        batch_size,
        dimension: 3,
        timeout_secs: 5,
        ..VectorStoreConfig::default()
    };
    PineconeStore::new(&config, "test-key")
        .expect("store should build")
        .with_retry_attempts(1)
}

async fn mount_index(server: &MockServer, name: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/indexes/{}", name)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": name,
            "dimension": 3,
            "host": server.uri(),
        })))
        .mount(server)
        .await;
}

fn record(id: &str, title: &str) -> VectorRecord {
    VectorRecord {
        id: id.to_string(),
        values: vec![0.1, 0.2, 0.3],
        metadata: RecordMetadata {
            paper_id: "2023_0".to_string(),
            title: title.to_string(),
            year: "2023".to_string(),
            content: format!("content of {}", id),
            ..RecordMetadata::default()
        },
    }
}

#[test]
fn empty_api_key_is_rejected() {
    let result = PineconeStore::new(&VectorStoreConfig::default(), "  ");
    assert!(matches!(result, Err(crate::ScholarError::VectorStore(_))));
}

#[test]
fn title_filter_uses_eq_operator() {
    let value = filter_json(&MetadataFilter::title("FusionNet"));
    assert_eq!(value, json!({ "title": { "$eq": "FusionNet" } }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ensure_index_creates_missing_index() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes"))
        .and(header("Api-Key", "test-key"))
        .and(header("X-Pinecone-API-Version", "2024-07"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "indexes": [{ "name": "other", "host": "h" }] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/indexes"))
        .and(body_partial_json(json!({
            "name": "paper-contents",
            "dimension": 384,
            "metric": "cosine",
            "spec": { "serverless": { "cloud": "aws", "region": "us-east-1" } },
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let store = test_store(&server, 50);
    store
        .ensure_index("paper-contents", 384)
        .await
        .expect("index should be created");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ensure_index_skips_existing_index() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "indexes": [{ "name": "paper-contents" }] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/indexes"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let store = test_store(&server, 50);
    store
        .ensure_index("paper-contents", 384)
        .await
        .expect("existing index is fine");
    assert_eq!(
        store.list_indexes().await.expect("list should succeed"),
        vec!["paper-contents".to_string()]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn upsert_splits_batches_and_skips_failures() {
    let server = MockServer::start().await;
    mount_index(&server, "paper-contents").await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .and(body_partial_json(json!({ "vectors": [{ "id": "c" }] })))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "upsertedCount": 2 })))
        .expect(1)
        .mount(&server)
        .await;

    let store = test_store(&server, 2);
    let records = vec![
        record("a", "FusionNet"),
        record("b", "FusionNet"),
        record("c", "DepthFormer"),
    ];

    let report = store
        .upsert("paper-contents", records)
        .await
        .expect("upsert reports failures instead of erroring");

    assert_eq!(report.upserted, 2);
    assert_eq!(report.failed_batches, 1);
    assert_eq!(report.failed_records, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn query_returns_matches_by_descending_score() {
    let server = MockServer::start().await;
    mount_index(&server, "research-abstracts").await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_partial_json(json!({ "topK": 5, "includeMetadata": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "matches": [
                { "id": "low", "score": 0.2, "metadata": { "title": "Other" } },
                { "id": "high", "score": 0.9, "metadata": {
                    "title": "FusionNet",
                    "authors": "Ada Lovelace",
                    "abstract_url": "https://example.org/fusion",
                } },
            ]
        })))
        .mount(&server)
        .await;

    let store = test_store(&server, 50);
    let matches = store
        .query("research-abstracts", &[0.1, 0.2, 0.3], 5, None)
        .await
        .expect("query should succeed");

    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].id, "high");
    assert_eq!(matches[0].metadata.title, "FusionNet");
    assert_eq!(matches[0].metadata.authors.as_deref(), Some("Ada Lovelace"));
    assert_eq!(matches[1].id, "low");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fetch_by_metadata_sends_zero_vector_with_filter() {
    let server = MockServer::start().await;
    mount_index(&server, "paper-contents").await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_partial_json(json!({
            "vector": [0.0, 0.0, 0.0],
            "topK": 100,
            "filter": { "title": { "$eq": "FusionNet" } },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "matches": [
                { "id": "x", "score": 0.0, "metadata": { "title": "FusionNet", "content": "chunk one" } },
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = test_store(&server, 50);
    let matches = store
        .fetch_by_metadata("paper-contents", &MetadataFilter::title("FusionNet"), 100)
        .await
        .expect("lookup should succeed");

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].metadata.content, "chunk one");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn host_lookup_is_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/research-abstracts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "research-abstracts",
            "host": server.uri(),
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "matches": [] })))
        .mount(&server)
        .await;

    let store = test_store(&server, 50);
    for _ in 0..3 {
        let matches = store
            .query("research-abstracts", &[0.0, 1.0, 0.0], 5, None)
            .await
            .expect("query should succeed");
        assert!(matches.is_empty());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_index_is_a_vector_store_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/nope"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = test_store(&server, 50);
    let result = store.query("nope", &[0.0, 0.0, 1.0], 5, None).await;

    assert!(matches!(result, Err(crate::ScholarError::VectorStore(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wrong_width_vector_never_reaches_the_data_plane() {
    let server = MockServer::start().await;
    mount_index(&server, "research-abstracts").await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "matches": [] })))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "upsertedCount": 1 })))
        .expect(0)
        .mount(&server)
        .await;

    let store = test_store(&server, 50);
    let query = store
        .query("research-abstracts", &[0.1, 0.2, 0.3, 0.4], 5, None)
        .await;
    assert!(matches!(query, Err(crate::ScholarError::Embedding(_))));

    let mut wide = record("wide", "FusionNet");
    wide.values.push(0.4);
    let upsert = store.upsert("research-abstracts", vec![wide]).await;
    assert!(matches!(upsert, Err(crate::ScholarError::Embedding(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn count_reads_total_vector_count() {
    let server = MockServer::start().await;
    mount_index(&server, "paper-contents").await;
    Mock::given(method("POST"))
        .and(path("/describe_index_stats"))
        .and(header("Api-Key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "dimension": 3,
            "indexFullness": 0.0,
            "totalVectorCount": 42,
            "namespaces": { "": { "vectorCount": 42 } },
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = test_store(&server, 50);
    let count = store.count("paper-contents").await.expect("count should succeed");

    assert_eq!(count, 42);
}
