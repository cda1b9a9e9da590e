//! End-to-end scenarios against the public capability ports, mirroring
//! the literal inputs/outputs enumerated for the retrieval core.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use context_harness::config::{
    ChunkingConfig, CollectionConfig, Config, DbConfig, EmbeddingConfig, IngestionConfig, RetrievalConfig,
    TimeoutsConfig,
};
use context_harness::embedding::HashEmbedder;
use context_harness::language_model::NullLanguageModel;
use context_harness::models::DuplicatePolicy;
use context_harness::ports::{Admission, Engine, Search};
use context_harness::progress::NoProgress;
use context_harness::reranker::NullReranker;
use context_harness::search::{Query, SearchMode, SearchOptions};
use context_harness::store::{MetadataFilter, Store};

fn test_config(root: &Path, duplicate_policy: DuplicatePolicy) -> Config {
    Config {
        db: DbConfig { path: root.join("db.sqlite") },
        collection: CollectionConfig { duplicate_policy, ..CollectionConfig::default() },
        chunking: ChunkingConfig::default(),
        retrieval: RetrievalConfig::default(),
        embedding: EmbeddingConfig {
            enabled: true,
            dims: Some(8),
            batch_size: 8,
            max_retries: 1,
            backoff_base_ms: 1,
        },
        ingestion: IngestionConfig { worker_count: Some(2), ..IngestionConfig::default() },
        timeouts: TimeoutsConfig::default(),
    }
}

async fn new_engine(config: &Config) -> Engine {
    Engine::with_capabilities(
        config.clone(),
        Arc::new(HashEmbedder::new(8)),
        Arc::new(NullLanguageModel),
        Arc::new(NullReranker),
    )
    .await
    .unwrap()
}

fn no_cancel() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

/// Scenario 1: *Unchanged-file skip.*
#[tokio::test]
async fn unchanged_file_skip() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "hello world").unwrap();
    let config = test_config(dir.path(), DuplicatePolicy::Skip);
    let engine = new_engine(&config).await;

    let first = engine.ingest(dir.path(), None, Arc::new(NoProgress), no_cancel()).await.unwrap();
    assert_eq!(first.admitted, 1);
    assert_eq!(first.skipped_unchanged, 0);

    let second = engine.ingest(dir.path(), None, Arc::new(NoProgress), no_cancel()).await.unwrap();
    assert_eq!(second.admitted, 0);
    assert_eq!(second.skipped_unchanged, 1);
}

/// Scenario 2: *Deterministic search.*
#[tokio::test]
async fn deterministic_keyword_search() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("doc1.md"), "# Auth\nOAuth is a protocol.").unwrap();
    std::fs::write(dir.path().join("doc2.md"), "# Fruit\nApples are red.").unwrap();
    let config = test_config(dir.path(), DuplicatePolicy::Skip);
    let engine = new_engine(&config).await;
    engine.ingest(dir.path(), None, Arc::new(NoProgress), no_cancel()).await.unwrap();

    let options = SearchOptions { mode: SearchMode::Keyword, limit: 5, ..SearchOptions::from_config(&config.retrieval) };
    let results = Search::search(
        &engine,
        Query { text: "OAuth".to_string(), filter: MetadataFilter::default() },
        options,
        no_cancel(),
    )
    .await
    .unwrap();

    assert_eq!(results.len(), 1);
    let hit = &results[0];
    assert!(hit.citation.source_path.ends_with("doc1.md"));
    assert!(hit.citation.page_spans.is_empty());
    assert_eq!(hit.citation.section_path, vec!["Auth".to_string()]);
}

/// Scenario 4: *Duplicate policy.*
#[tokio::test]
async fn duplicate_policy_skip_links_search_to_original() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = b"identical duplicate payload about gardening";
    std::fs::write(dir.path().join("x.txt"), bytes).unwrap();
    let config = test_config(dir.path(), DuplicatePolicy::Skip);
    let engine = new_engine(&config).await;
    engine.ingest(dir.path(), None, Arc::new(NoProgress), no_cancel()).await.unwrap();

    std::fs::write(dir.path().join("x_copy.txt"), bytes).unwrap();
    let second = engine.ingest(dir.path(), None, Arc::new(NoProgress), no_cancel()).await.unwrap();
    assert_eq!(second.duplicates, 1);

    let options = SearchOptions { mode: SearchMode::Keyword, ..SearchOptions::from_config(&config.retrieval) };
    let results = Search::search(
        &engine,
        Query { text: "gardening".to_string(), filter: MetadataFilter::default() },
        options,
        no_cancel(),
    )
    .await
    .unwrap();
    assert!(results.iter().all(|r| r.citation.source_path.ends_with("x.txt")));
}

/// Scenario 5: *Cascade delete.*
#[tokio::test]
async fn cascade_delete_removes_document_from_both_indices() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("doc1.md"), "# Auth\nOAuth is a protocol.").unwrap();
    std::fs::write(dir.path().join("doc2.md"), "# Fruit\nApples are red.").unwrap();
    let config = test_config(dir.path(), DuplicatePolicy::Skip);
    let engine = new_engine(&config).await;
    engine.ingest(dir.path(), None, Arc::new(NoProgress), no_cancel()).await.unwrap();

    let before = engine.store().scan_chunks(&MetadataFilter::default()).await.unwrap();
    let doc1 = before.iter().find(|c| c.source_path.ends_with("doc1.md")).unwrap().doc_id.clone();
    let doc1_chunk_count = before.iter().filter(|c| c.doc_id == doc1).count();
    let total_before = before.len();

    engine.store().delete_document(&doc1).await.unwrap();
    engine.refresh_indices().await.unwrap();

    let after = engine.store().scan_chunks(&MetadataFilter::default()).await.unwrap();
    assert_eq!(after.len(), total_before - doc1_chunk_count);
    assert!(after.iter().all(|c| c.doc_id != doc1));

    let options = SearchOptions { mode: SearchMode::Keyword, ..SearchOptions::from_config(&config.retrieval) };
    let results = Search::search(
        &engine,
        Query { text: "OAuth".to_string(), filter: MetadataFilter::default() },
        options,
        no_cancel(),
    )
    .await
    .unwrap();
    assert!(results.is_empty());
}

/// Scenario 6: *Resumable ingest.* A run cancelled partway through and
/// restarted under the same run id processes each file exactly once and
/// ends with the same totals as an uninterrupted run.
#[tokio::test]
async fn resumable_ingest_processes_each_file_once() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..20 {
        std::fs::write(dir.path().join(format!("f{i:02}.txt")), format!("document body number {i}")).unwrap();
    }
    let config = test_config(dir.path(), DuplicatePolicy::Skip);
    let engine = new_engine(&config).await;

    let run_id = uuid::Uuid::new_v4().to_string();
    let cancel = Arc::new(AtomicBool::new(true));
    let first = engine
        .ingest(dir.path(), Some(run_id.clone()), Arc::new(NoProgress), cancel)
        .await
        .unwrap();
    assert!(first.cancelled);
    assert!(first.admitted < 20);

    let second = engine
        .ingest(dir.path(), Some(run_id), Arc::new(NoProgress), no_cancel())
        .await
        .unwrap();
    assert!(!second.cancelled);
    assert_eq!(first.admitted + second.admitted, 20);

    let chunks = engine.store().scan_chunks(&MetadataFilter::default()).await.unwrap();
    let distinct_docs: std::collections::HashSet<_> = chunks.iter().map(|c| c.doc_id.clone()).collect();
    assert_eq!(distinct_docs.len(), 20);
}

/// `limit = 0` → empty result with no capability calls made (spec §8
/// boundary behaviour); exercised here through the public port rather
/// than the internal `retrieve` function.
#[tokio::test]
async fn zero_limit_short_circuits() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "hello world").unwrap();
    let config = test_config(dir.path(), DuplicatePolicy::Skip);
    let engine = new_engine(&config).await;
    engine.ingest(dir.path(), None, Arc::new(NoProgress), no_cancel()).await.unwrap();

    let options = SearchOptions { limit: 0, ..SearchOptions::from_config(&config.retrieval) };
    let results = Search::search(
        &engine,
        Query { text: "hello".to_string(), filter: MetadataFilter::default() },
        options,
        no_cancel(),
    )
    .await
    .unwrap();
    assert!(results.is_empty());
}
