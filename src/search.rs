//! Retriever (C11): parallel vector + keyword fan-out, Reciprocal Rank
//! Fusion, optional rerank, metadata filtering, and citation assembly.
//!
//! Vector and keyword candidates are fetched in parallel via
//! `tokio::join!`, ranked with Reciprocal Rank Fusion, broken ties
//! deterministically, and enriched into citations from the store — the
//! algorithm spec.md §4.11 names explicitly and non-optionally.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

use crate::config::{RetrievalConfig, TimeoutsConfig};
use crate::embedding::{embed_query, Embedder, EmbeddingConfig};
use crate::error::{EngineError, EngineResult};
use crate::keyword_index::KeywordIndex;
use crate::models::{Chunk, Document};
use crate::reranker::{rerank_or_passthrough, Reranker};
use crate::store::{ChunkRecord, MetadataFilter, Store};
use crate::vector_index::VectorIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Hybrid,
    Semantic,
    Keyword,
}

impl SearchMode {
    pub fn parse(raw: &str) -> EngineResult<Self> {
        match raw {
            "hybrid" => Ok(Self::Hybrid),
            "semantic" => Ok(Self::Semantic),
            "keyword" => Ok(Self::Keyword),
            other => Err(EngineError::MalformedQuery {
                reason: format!("unknown search mode '{other}' (expected hybrid, semantic, or keyword)"),
            }),
        }
    }
}

/// Free-text query plus an optional metadata filter.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub text: String,
    pub filter: MetadataFilter,
}

/// Tunables recognised by [`retrieve`] (spec.md §4.11). Seeded from
/// [`RetrievalConfig`] and overridable per call (e.g. a CLI `--mode` flag).
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub mode: SearchMode,
    pub limit: usize,
    pub min_score: f64,
    pub rerank: bool,
    pub semantic_weight: f64,
    pub keyword_weight: f64,
    pub rrf_k: u32,
}

impl SearchOptions {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            mode: SearchMode::Hybrid,
            limit: config.default_limit.max(0) as usize,
            min_score: config.min_score,
            rerank: config.rerank,
            semantic_weight: config.semantic_weight,
            keyword_weight: config.keyword_weight,
            rrf_k: config.rrf_k,
        }
    }

    fn over_fetch(&self, config: &RetrievalConfig) -> usize {
        let factor = if self.rerank {
            config.over_fetch_with_rerank
        } else {
            config.over_fetch_plain
        };
        self.limit.saturating_mul(factor.max(1) as usize).max(self.limit)
    }
}

/// Citation payload: everything needed to show a human where a result
/// came from without re-extracting the source file.
#[derive(Debug, Clone)]
pub struct Citation {
    pub source_path: String,
    pub page_spans: Vec<u32>,
    pub section_path: Vec<String>,
    pub char_start: usize,
    pub char_end: usize,
}

/// One fused, enriched, citable result.
#[derive(Debug, Clone)]
pub struct RankedResult {
    pub chunk_id: String,
    pub doc_id: String,
    pub text: String,
    pub context_prefix: Option<String>,
    pub score: f64,
    pub semantic_rank: Option<usize>,
    pub keyword_rank: Option<usize>,
    pub title: Option<String>,
    pub citation: Citation,
}

/// Resolves a [`MetadataFilter`] to an explicit allow-list of chunk ids,
/// by scanning the store once up front. `None` means "no restriction" —
/// both indices treat that as skip-the-filter rather than an empty set.
async fn resolve_allowed(store: &dyn Store, filter: &MetadataFilter) -> EngineResult<Option<HashSet<String>>> {
    if filter.doc_ids.is_none() && filter.tags.is_none() && filter.since.is_none() {
        return Ok(None);
    }
    let records = store.scan_chunks(filter).await?;
    Ok(Some(records.into_iter().map(|r| r.chunk.chunk_id).collect()))
}

/// Sorts `hits` by descending score (ties broken by ascending chunk id,
/// so fusion is invariant to which of the two concurrent lookups
/// happened to finish first) and returns the 1-based rank and raw score
/// per chunk id.
fn build_rank_map(mut hits: Vec<(String, f64)>) -> (HashMap<String, usize>, HashMap<String, f64>) {
    hits.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    let mut ranks = HashMap::with_capacity(hits.len());
    let mut scores = HashMap::with_capacity(hits.len());
    for (rank, (chunk_id, score)) in hits.into_iter().enumerate() {
        ranks.insert(chunk_id.clone(), rank + 1);
        scores.insert(chunk_id, score);
    }
    (ranks, scores)
}

/// Min-max normalises a score map into `[0, 1]`; a flat map (including a
/// single entry) normalises to all-`1.0` rather than dividing by zero.
fn min_max_normalise(scores: &HashMap<String, f64>) -> HashMap<String, f64> {
    if scores.is_empty() {
        return HashMap::new();
    }
    let min = scores.values().cloned().fold(f64::INFINITY, f64::min);
    let max = scores.values().cloned().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < f64::EPSILON {
        return scores.keys().map(|k| (k.clone(), 1.0)).collect();
    }
    scores.iter().map(|(k, v)| (k.clone(), (v - min) / (max - min))).collect()
}

/// Runs the full retrieval pipeline: `Embedding → (Vector, Keyword) →
/// Fusing → (Reranking?) → Enriching → Done` (spec.md §4.11).
///
/// `vector_index`/`keyword_index` are shared, mutex-guarded caches so
/// this can run concurrently with an ingestion run updating them; both
/// lookups are fanned out with `tokio::join!`. Each embedder/reranker
/// call is bounded by `timeouts` (spec.md §5); a capability overrun
/// surfaces as [`EngineError::Timeout`], a terminal error here (unlike
/// ingestion, retrieval never retries). `cancel` is polled at each stage
/// boundary; once set, any partial results gathered so far are
/// discarded and [`EngineError::Cancelled`] is returned.
#[allow(clippy::too_many_arguments)]
pub async fn retrieve(
    store: &dyn Store,
    vector_index: &Mutex<VectorIndex>,
    keyword_index: &Mutex<KeywordIndex>,
    embedder: &dyn Embedder,
    embedding_config: &EmbeddingConfig,
    reranker: &dyn Reranker,
    retrieval_config: &RetrievalConfig,
    timeouts: &TimeoutsConfig,
    query: &Query,
    options: &SearchOptions,
    cancel: &AtomicBool,
) -> EngineResult<Vec<RankedResult>> {
    if options.limit == 0 || query.text.trim().is_empty() {
        return Ok(Vec::new());
    }
    if cancel.load(Ordering::Relaxed) {
        return Err(EngineError::Cancelled);
    }

    // spec.md §8 boundary case: a keyword query made up entirely of
    // stop-words has an empty keyword list. In keyword mode that means no
    // results at all; in hybrid mode it means falling back to semantic
    // only rather than letting stop-word terms dominate BM25 scoring.
    let stopwords_only = crate::keyword_index::is_stopwords_only(&query.text);
    if options.mode == SearchMode::Keyword && stopwords_only {
        return Ok(Vec::new());
    }

    let need_semantic = matches!(options.mode, SearchMode::Hybrid | SearchMode::Semantic);
    let need_keyword = matches!(options.mode, SearchMode::Hybrid | SearchMode::Keyword) && !stopwords_only;
    let fetch_n = options.over_fetch(retrieval_config);

    let query_vector = if need_semantic {
        if !embedding_config.is_enabled() {
            return Err(EngineError::EmbeddingFailed {
                category: "disabled".to_string(),
                reason: "embedding is disabled; semantic/hybrid search is unavailable".to_string(),
            });
        }
        Some(embed_query(embedder, embedding_config, timeouts.embedder_ms, &query.text).await?)
    } else {
        None
    };

    let allowed = resolve_allowed(store, &query.filter).await?;

    if cancel.load(Ordering::Relaxed) {
        return Err(EngineError::Cancelled);
    }

    let (semantic_hits, keyword_result) = tokio::join!(
        async {
            match &query_vector {
                Some(qv) => vector_index.lock().await.search(qv, fetch_n, allowed.as_ref()),
                None => Vec::new(),
            }
        },
        async {
            if need_keyword {
                keyword_index.lock().await.search(&query.text, fetch_n, allowed.as_ref())
            } else {
                Ok(Vec::new())
            }
        }
    );
    let keyword_hits = keyword_result?;

    if cancel.load(Ordering::Relaxed) {
        return Err(EngineError::Cancelled);
    }

    let (semantic_ranks, semantic_scores) = build_rank_map(
        semantic_hits
            .iter()
            .map(|hit| (hit.chunk_id.clone(), hit.score as f64))
            .collect(),
    );
    let (keyword_ranks, keyword_scores) = build_rank_map(keyword_hits);
    let keyword_normalised = min_max_normalise(&keyword_scores);

    let mut candidate_ids: Vec<String> = {
        let mut set: HashSet<String> = semantic_ranks.keys().cloned().collect();
        set.extend(keyword_ranks.keys().cloned());
        set.into_iter().collect()
    };
    candidate_ids.sort();
    if candidate_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut records: HashMap<String, ChunkRecord> = HashMap::with_capacity(candidate_ids.len());
    let mut documents: HashMap<String, Option<Document>> = HashMap::new();
    for id in &candidate_ids {
        if let Some(record) = store.get_chunk_by_id(id).await? {
            if let std::collections::hash_map::Entry::Vacant(slot) = documents.entry(record.doc_id.clone()) {
                slot.insert(store.get_document(&record.doc_id).await?);
            }
            records.insert(id.clone(), record);
        }
    }
    candidate_ids.retain(|id| records.contains_key(id));

    let weight_sum = options.semantic_weight + options.keyword_weight;
    let (w_sem, w_kw) = if weight_sum > 0.0 {
        (options.semantic_weight / weight_sum, options.keyword_weight / weight_sum)
    } else {
        (0.5, 0.5)
    };
    let k = f64::from(options.rrf_k);

    let mut scored: Vec<(String, f64)> = candidate_ids
        .iter()
        .map(|id| {
            let score = match options.mode {
                SearchMode::Semantic => semantic_scores.get(id).copied().unwrap_or(0.0),
                SearchMode::Keyword => keyword_normalised.get(id).copied().unwrap_or(0.0),
                SearchMode::Hybrid => {
                    let sem = semantic_ranks.get(id).map(|r| w_sem / (k + *r as f64)).unwrap_or(0.0);
                    let kw = keyword_ranks.get(id).map(|r| w_kw / (k + *r as f64)).unwrap_or(0.0);
                    sem + kw
                }
            };
            (id.clone(), score)
        })
        .collect();

    sort_candidates(&mut scored, &semantic_scores, &records);

    if cancel.load(Ordering::Relaxed) {
        return Err(EngineError::Cancelled);
    }

    if options.rerank {
        let texts: Vec<String> = scored.iter().map(|(id, _)| records[id].chunk.text.clone()).collect();
        let ids: Vec<String> = scored.iter().map(|(id, _)| id.clone()).collect();
        let score_by_id: HashMap<String, f64> = scored.iter().cloned().collect();
        let reordered = rerank_or_passthrough(reranker, timeouts.reranker_ms, &query.text, &texts, ids).await;
        scored = reordered
            .into_iter()
            .map(|id| {
                let score = score_by_id.get(&id).copied().unwrap_or(0.0);
                (id, score)
            })
            .collect();
    }

    scored.retain(|(_, score)| *score >= options.min_score);
    scored.truncate(options.limit);

    let results = scored
        .into_iter()
        .map(|(id, score)| {
            let record = &records[&id];
            let title = documents
                .get(&record.doc_id)
                .and_then(|doc| doc.as_ref())
                .and_then(|doc| doc.title.clone());
            to_ranked_result(id, record, score, title, &semantic_ranks, &keyword_ranks)
        })
        .collect();

    Ok(results)
}

fn sort_candidates(
    scored: &mut [(String, f64)],
    semantic_scores: &HashMap<String, f64>,
    records: &HashMap<String, ChunkRecord>,
) {
    scored.sort_by(|(id_a, score_a), (id_b, score_b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let sim_a = semantic_scores.get(id_a).copied().unwrap_or(f64::MIN);
                let sim_b = semantic_scores.get(id_b).copied().unwrap_or(f64::MIN);
                sim_b.partial_cmp(&sim_a).unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| records[id_a].doc_id.cmp(&records[id_b].doc_id))
            .then_with(|| records[id_a].chunk.ordinal.cmp(&records[id_b].chunk.ordinal))
    });
}

fn to_ranked_result(
    chunk_id: String,
    record: &ChunkRecord,
    score: f64,
    title: Option<String>,
    semantic_ranks: &HashMap<String, usize>,
    keyword_ranks: &HashMap<String, usize>,
) -> RankedResult {
    let chunk: &Chunk = &record.chunk;
    RankedResult {
        chunk_id: chunk_id.clone(),
        doc_id: record.doc_id.clone(),
        text: chunk.text.clone(),
        context_prefix: chunk.context_prefix.clone(),
        score,
        semantic_rank: semantic_ranks.get(&chunk_id).copied(),
        keyword_rank: keyword_ranks.get(&chunk_id).copied(),
        title,
        citation: Citation {
            source_path: record.source_path.clone(),
            page_spans: chunk.page_spans.clone(),
            section_path: chunk.section_path.clone(),
            char_start: chunk.char_start,
            char_end: chunk.char_end,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, CollectionConfig, DbConfig};
    use crate::embedding::{HashEmbedder, NullEmbedder};
    use crate::ingest::Coordinator;
    use crate::language_model::NullLanguageModel;
    use crate::progress::{NoProgress, ProgressReporter};
    use crate::reranker::NullReranker;
    use crate::store::sqlite::SqliteStore;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn test_config(root: &std::path::Path, embedding_enabled: bool) -> Config {
        Config {
            db: DbConfig { path: root.join("db.sqlite") },
            collection: CollectionConfig::default(),
            chunking: Default::default(),
            retrieval: Default::default(),
            embedding: crate::config::EmbeddingConfig {
                enabled: embedding_enabled,
                dims: Some(8),
                batch_size: 8,
                max_retries: 1,
                backoff_base_ms: 1,
            },
            ingestion: crate::config::IngestionConfig {
                worker_count: Some(2),
                ..Default::default()
            },
            timeouts: Default::default(),
        }
    }

    struct Harness {
        store: Arc<dyn Store>,
        embedder: Arc<dyn Embedder>,
        vector_index: Mutex<VectorIndex>,
        keyword_index: Mutex<KeywordIndex>,
        retrieval_config: RetrievalConfig,
    }

    async fn build_harness(dir: &std::path::Path, embedding_enabled: bool) -> Harness {
        let config = test_config(dir, embedding_enabled);
        crate::migrate::run_migrations(&config).await.unwrap();
        let pool = crate::db::connect(&config).await.unwrap();
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool.clone()));
        let embedder: Arc<dyn Embedder> = if embedding_enabled {
            Arc::new(HashEmbedder::new(8))
        } else {
            Arc::new(NullEmbedder)
        };
        let coordinator = Coordinator::new(
            store.clone(),
            pool,
            embedder.clone(),
            Arc::new(NullLanguageModel),
            config.clone(),
        );
        let reporter: Arc<dyn ProgressReporter> = Arc::new(NoProgress);
        coordinator
            .run(dir, None, reporter, Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();

        let vector_index = Mutex::new(
            VectorIndex::rebuild_from(store.as_ref(), &MetadataFilter::default()).await.unwrap(),
        );
        let keyword_index = Mutex::new(
            KeywordIndex::rebuild_from(store.as_ref(), &MetadataFilter::default()).await.unwrap(),
        );

        Harness {
            store,
            embedder,
            vector_index,
            keyword_index,
            retrieval_config: config.retrieval,
        }
    }

    async fn search(harness: &Harness, query: &str, options: SearchOptions, embedding_cfg: &EmbeddingConfig) -> Vec<RankedResult> {
        retrieve(
            harness.store.as_ref(),
            &harness.vector_index,
            &harness.keyword_index,
            harness.embedder.as_ref(),
            embedding_cfg,
            &NullReranker,
            &harness.retrieval_config,
            &TimeoutsConfig::default(),
            &Query { text: query.to_string(), filter: MetadataFilter::default() },
            &options,
            &AtomicBool::new(false),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn keyword_mode_finds_matching_chunk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "The quick brown fox jumps over the lazy dog").unwrap();
        std::fs::write(dir.path().join("b.txt"), "Unrelated content about gardening").unwrap();
        let harness = build_harness(dir.path(), false).await;
        let cfg = crate::config::EmbeddingConfig { enabled: false, ..Default::default() };

        let options = SearchOptions {
            mode: SearchMode::Keyword,
            limit: 5,
            min_score: 0.0,
            rerank: false,
            semantic_weight: 0.5,
            keyword_weight: 0.5,
            rrf_k: 60,
        };
        let results = search(&harness, "fox", options, &cfg).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].citation.source_path.ends_with("a.txt"));
    }

    #[tokio::test]
    async fn semantic_mode_errors_when_embedding_disabled() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello world").unwrap();
        let harness = build_harness(dir.path(), false).await;
        let cfg = crate::config::EmbeddingConfig { enabled: false, ..Default::default() };

        let options = SearchOptions {
            mode: SearchMode::Semantic,
            limit: 5,
            min_score: 0.0,
            rerank: false,
            semantic_weight: 0.5,
            keyword_weight: 0.5,
            rrf_k: 60,
        };
        let err = retrieve(
            harness.store.as_ref(),
            &harness.vector_index,
            &harness.keyword_index,
            harness.embedder.as_ref(),
            &cfg,
            &NullReranker,
            &harness.retrieval_config,
            &TimeoutsConfig::default(),
            &Query { text: "hello".to_string(), filter: MetadataFilter::default() },
            &options,
            &AtomicBool::new(false),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::EmbeddingFailed { .. }));
    }

    #[tokio::test]
    async fn hybrid_mode_fuses_and_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "Rust programming and cargo crates").unwrap();
        std::fs::write(dir.path().join("b.txt"), "Python machine learning frameworks").unwrap();
        let harness = build_harness(dir.path(), true).await;
        let cfg = crate::config::EmbeddingConfig {
            enabled: true,
            dims: Some(8),
            batch_size: 8,
            max_retries: 1,
            backoff_base_ms: 1,
        };

        let options = SearchOptions::from_config(&harness.retrieval_config);
        let first = search(&harness, "Rust cargo", options.clone(), &cfg).await;
        let second = search(&harness, "Rust cargo", options, &cfg).await;
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.chunk_id, b.chunk_id);
            assert!((a.score - b.score).abs() < 1e-9);
        }
    }

    fn fixture_chunk_record(doc_id: &str, chunk_id: &str, ordinal: i64) -> ChunkRecord {
        ChunkRecord {
            chunk: Chunk {
                chunk_id: chunk_id.to_string(),
                doc_id: doc_id.to_string(),
                ordinal,
                text: String::new(),
                char_start: 0,
                char_end: 0,
                page_spans: Vec::new(),
                section_path: Vec::new(),
                token_count: 0,
                prev_chunk_id: None,
                next_chunk_id: None,
                content_hash: String::new(),
                context_prefix: None,
            },
            doc_id: doc_id.to_string(),
            source_path: format!("{doc_id}.txt"),
            indexed_at: chrono::Utc::now(),
        }
    }

    /// spec.md §8 scenario 3 (*fusion tie-break*): A at semantic rank 1 /
    /// keyword rank 3, B at semantic rank 3 / keyword rank 1. With equal
    /// weights and rrf_k=60, `RRF(A) == RRF(B)`; the tie is broken by
    /// semantic similarity, so the chunk with the higher semantic score wins.
    #[test]
    fn rrf_tie_is_broken_by_semantic_similarity() {
        let rrf_k = 60.0;
        let score = 0.5 / (rrf_k + 1.0) + 0.5 / (rrf_k + 3.0);

        let mut scored = vec![("chunk-a".to_string(), score), ("chunk-b".to_string(), score)];
        let mut semantic_scores = HashMap::new();
        semantic_scores.insert("chunk-a".to_string(), 0.9);
        semantic_scores.insert("chunk-b".to_string(), 0.4);

        let mut records = HashMap::new();
        records.insert("chunk-a".to_string(), fixture_chunk_record("doc-a", "chunk-a", 0));
        records.insert("chunk-b".to_string(), fixture_chunk_record("doc-b", "chunk-b", 0));

        sort_candidates(&mut scored, &semantic_scores, &records);

        assert_eq!(scored[0].0, "chunk-a");
        assert_eq!(scored[1].0, "chunk-b");
    }

    /// When scores and semantic similarity are both tied, the remaining
    /// order is deterministic: `doc_id` ascending, then `ordinal` ascending.
    #[test]
    fn fully_tied_candidates_order_by_doc_id_then_ordinal() {
        let mut scored = vec![
            ("chunk-z".to_string(), 1.0),
            ("chunk-y".to_string(), 1.0),
            ("chunk-x".to_string(), 1.0),
        ];
        let semantic_scores = HashMap::new();
        let mut records = HashMap::new();
        records.insert("chunk-z".to_string(), fixture_chunk_record("doc-2", "chunk-z", 1));
        records.insert("chunk-y".to_string(), fixture_chunk_record("doc-2", "chunk-y", 0));
        records.insert("chunk-x".to_string(), fixture_chunk_record("doc-1", "chunk-x", 5));

        sort_candidates(&mut scored, &semantic_scores, &records);

        assert_eq!(scored[0].0, "chunk-x");
        assert_eq!(scored[1].0, "chunk-y");
        assert_eq!(scored[2].0, "chunk-z");
    }

    #[tokio::test]
    async fn limit_zero_returns_no_results_without_capability_calls() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello world").unwrap();
        let harness = build_harness(dir.path(), false).await;
        let cfg = crate::config::EmbeddingConfig { enabled: false, ..Default::default() };
        let options = SearchOptions {
            mode: SearchMode::Keyword,
            limit: 0,
            min_score: 0.0,
            rerank: false,
            semantic_weight: 0.5,
            keyword_weight: 0.5,
            rrf_k: 60,
        };
        let results = search(&harness, "hello", options, &cfg).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn empty_query_returns_no_results() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello world").unwrap();
        let harness = build_harness(dir.path(), false).await;
        let cfg = crate::config::EmbeddingConfig { enabled: false, ..Default::default() };
        let options = SearchOptions {
            mode: SearchMode::Keyword,
            limit: 5,
            min_score: 0.0,
            rerank: false,
            semantic_weight: 0.5,
            keyword_weight: 0.5,
            rrf_k: 60,
        };
        let results = search(&harness, "   ", options, &cfg).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn stopwords_only_query_is_empty_in_keyword_mode() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "the quick brown fox").unwrap();
        let harness = build_harness(dir.path(), false).await;
        let cfg = crate::config::EmbeddingConfig { enabled: false, ..Default::default() };
        let options = SearchOptions {
            mode: SearchMode::Keyword,
            limit: 5,
            min_score: 0.0,
            rerank: false,
            semantic_weight: 0.5,
            keyword_weight: 0.5,
            rrf_k: 60,
        };
        let results = search(&harness, "the of a", options, &cfg).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn stopwords_only_query_falls_back_to_semantic_in_hybrid_mode() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "Rust ownership and borrowing").unwrap();
        std::fs::write(dir.path().join("b.txt"), "Python decorators and generators").unwrap();
        let harness = build_harness(dir.path(), true).await;
        let cfg = crate::config::EmbeddingConfig {
            enabled: true,
            dims: Some(8),
            batch_size: 8,
            max_retries: 1,
            backoff_base_ms: 1,
        };
        let options = SearchOptions::from_config(&harness.retrieval_config);
        let results = search(&harness, "the of a", options, &cfg).await;
        // Hybrid falls back to semantic only: every surviving hit has a
        // semantic rank and none has a keyword rank.
        for r in &results {
            assert!(r.semantic_rank.is_some());
            assert!(r.keyword_rank.is_none());
        }
    }

    #[tokio::test]
    async fn cancelled_signal_short_circuits_with_cancelled_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello world").unwrap();
        let harness = build_harness(dir.path(), false).await;
        let cfg = crate::config::EmbeddingConfig { enabled: false, ..Default::default() };
        let options = SearchOptions {
            mode: SearchMode::Keyword,
            limit: 5,
            min_score: 0.0,
            rerank: false,
            semantic_weight: 0.5,
            keyword_weight: 0.5,
            rrf_k: 60,
        };
        let err = retrieve(
            harness.store.as_ref(),
            &harness.vector_index,
            &harness.keyword_index,
            harness.embedder.as_ref(),
            &cfg,
            &NullReranker,
            &harness.retrieval_config,
            &TimeoutsConfig::default(),
            &Query { text: "hello".to_string(), filter: MetadataFilter::default() },
            &options,
            &AtomicBool::new(true),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }
}
