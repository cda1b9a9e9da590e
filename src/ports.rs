//! Capability Ports (C12): `Search`, `ContextProvider`, and `Admission` —
//! the only contracts a higher generation layer (ask/chat) depends on.
//!
//! [`Engine`] owns the store, the shared vector/keyword index caches,
//! and the capability trait objects, and implements all three ports
//! directly — the single object a generation layer (ask/chat) would
//! hold onto.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::db;
use crate::embedding::{Embedder, NullEmbedder};
use crate::error::EngineResult;
use crate::ingest::{Coordinator, IngestionSummary};
use crate::keyword_index::KeywordIndex;
use crate::language_model::{LanguageModel, NullLanguageModel};
use crate::migrate;
use crate::progress::ProgressReporter;
use crate::reranker::{NullReranker, Reranker};
use crate::search::{retrieve, Query, RankedResult, SearchOptions};
use crate::store::sqlite::SqliteStore;
use crate::store::{MetadataFilter, Store};
use crate::vector_index::VectorIndex;

/// `Search` port (spec.md §4.11/§4.12): free-text + filtered retrieval.
/// `cancel`, once set, causes the retriever to discard any partial
/// results and return [`crate::error::EngineError::Cancelled`] (spec.md §5).
#[async_trait]
pub trait Search: Send + Sync {
    async fn search(
        &self,
        query: Query,
        options: SearchOptions,
        cancel: Arc<AtomicBool>,
    ) -> EngineResult<Vec<RankedResult>>;
}

/// Caller-supplied budget for [`ContextProvider::context`].
#[derive(Debug, Clone, Copy)]
pub struct ContextBudget {
    pub max_chunks: usize,
    /// Approximate token budget; chunks are admitted greedily in score
    /// order until the next one would exceed it.
    pub max_tokens: usize,
    /// Keep only the first (highest-scored) chunk per `doc_id`.
    pub dedupe_by_doc: bool,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            max_chunks: 8,
            max_tokens: 4000,
            dedupe_by_doc: true,
        }
    }
}

/// One chunk admitted into a [`ContextBlock`], carrying the citation
/// marker a generation layer can cite back to the user.
#[derive(Debug, Clone)]
pub struct ContextEntry {
    pub marker: String,
    pub text: String,
    pub citation: crate::search::Citation,
}

/// A prompt-ready context block: ordered, budget-respecting, de-duplicated.
#[derive(Debug, Clone, Default)]
pub struct ContextBlock {
    pub entries: Vec<ContextEntry>,
}

impl ContextBlock {
    /// Renders the block as plain text with `[n]` citation markers, the
    /// shape a prompt template would splice in directly.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{} {}", e.marker, e.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// `ContextProvider` port (spec.md §4.12): query + budget → prompt-ready
/// context block.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn context(&self, query: Query, budget: ContextBudget) -> EngineResult<ContextBlock>;
}

/// `Admission` port (spec.md §4.12): ingest a path or tree, surfacing
/// progress events and a final summary.
#[async_trait]
pub trait Admission: Send + Sync {
    async fn ingest(
        &self,
        root: &Path,
        run_id: Option<String>,
        reporter: Arc<dyn ProgressReporter>,
        cancel: Arc<AtomicBool>,
    ) -> EngineResult<IngestionSummary>;
}

/// Owns the durable store, the shared index caches, and the capability
/// collaborators, and implements all three capability ports over them.
pub struct Engine {
    store: Arc<dyn Store>,
    pool: SqlitePool,
    config: Config,
    embedder: Arc<dyn Embedder>,
    language_model: Arc<dyn LanguageModel>,
    reranker: Arc<dyn Reranker>,
    vector_index: Mutex<VectorIndex>,
    keyword_index: Mutex<KeywordIndex>,
}

impl Engine {
    /// Opens `config`'s database (running migrations), rebuilds both
    /// indices from whatever the store already holds, and wires in
    /// no-op capability collaborators. Use [`Self::with_capabilities`] to
    /// supply a real embedder / language model / reranker.
    pub async fn open(config: Config) -> EngineResult<Self> {
        Self::with_capabilities(
            config,
            Arc::new(NullEmbedder),
            Arc::new(NullLanguageModel),
            Arc::new(NullReranker),
        )
        .await
    }

    pub async fn with_capabilities(
        config: Config,
        embedder: Arc<dyn Embedder>,
        language_model: Arc<dyn LanguageModel>,
        reranker: Arc<dyn Reranker>,
    ) -> EngineResult<Self> {
        migrate::run_migrations(&config).await?;
        let pool = db::connect(&config).await?;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool.clone()));
        let vector_index = Mutex::new(VectorIndex::rebuild_from(store.as_ref(), &MetadataFilter::default()).await?);
        let keyword_index =
            Mutex::new(KeywordIndex::rebuild_from(store.as_ref(), &MetadataFilter::default()).await?);

        Ok(Self {
            store,
            pool,
            config,
            embedder,
            language_model,
            reranker,
            vector_index,
            keyword_index,
        })
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Rebuilds the in-memory index caches from the store. Call after an
    /// ingestion run so subsequent searches see the new chunks — the
    /// coordinator's own indices are scoped to that one run and are not
    /// shared with the engine's (spec.md §4.8/§4.9: both indices are
    /// rebuildable caches, not a source of truth).
    pub async fn refresh_indices(&self) -> EngineResult<()> {
        let vectors = VectorIndex::rebuild_from(self.store.as_ref(), &MetadataFilter::default()).await?;
        let keywords = KeywordIndex::rebuild_from(self.store.as_ref(), &MetadataFilter::default()).await?;
        *self.vector_index.lock().await = vectors;
        *self.keyword_index.lock().await = keywords;
        Ok(())
    }
}

#[async_trait]
impl Search for Engine {
    async fn search(
        &self,
        query: Query,
        options: SearchOptions,
        cancel: Arc<AtomicBool>,
    ) -> EngineResult<Vec<RankedResult>> {
        retrieve(
            self.store.as_ref(),
            &self.vector_index,
            &self.keyword_index,
            self.embedder.as_ref(),
            &self.config.embedding,
            self.reranker.as_ref(),
            &self.config.retrieval,
            &self.config.timeouts,
            &query,
            &options,
            cancel.as_ref(),
        )
        .await
    }
}

#[async_trait]
impl ContextProvider for Engine {
    async fn context(&self, query: Query, budget: ContextBudget) -> EngineResult<ContextBlock> {
        let options = SearchOptions {
            limit: budget.max_chunks.max(1) * 3,
            ..SearchOptions::from_config(&self.config.retrieval)
        };
        let hits = Search::search(self, query, options, Arc::new(AtomicBool::new(false))).await?;

        let mut seen_docs = std::collections::HashSet::new();
        let mut entries = Vec::new();
        let mut used_tokens = 0usize;
        for hit in hits {
            if entries.len() >= budget.max_chunks {
                break;
            }
            if budget.dedupe_by_doc && !seen_docs.insert(hit.doc_id.clone()) {
                continue;
            }
            let estimated_tokens = hit.text.len() / 4;
            if used_tokens + estimated_tokens > budget.max_tokens && !entries.is_empty() {
                break;
            }
            used_tokens += estimated_tokens;
            entries.push(ContextEntry {
                marker: format!("[{}]", entries.len() + 1),
                text: hit.text,
                citation: hit.citation,
            });
        }
        Ok(ContextBlock { entries })
    }
}

#[async_trait]
impl Admission for Engine {
    async fn ingest(
        &self,
        root: &Path,
        run_id: Option<String>,
        reporter: Arc<dyn ProgressReporter>,
        cancel: Arc<AtomicBool>,
    ) -> EngineResult<IngestionSummary> {
        let coordinator = Coordinator::new(
            self.store.clone(),
            self.pool.clone(),
            self.embedder.clone(),
            self.language_model.clone(),
            self.config.clone(),
        );
        let summary = coordinator.run(root, run_id, reporter, cancel).await?;
        self.refresh_indices().await?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CollectionConfig, DbConfig};
    use crate::embedding::HashEmbedder;
    use crate::progress::NoProgress;
    use crate::search::SearchMode;

    fn test_config(root: &Path) -> Config {
        Config {
            db: DbConfig { path: root.join("db.sqlite") },
            collection: CollectionConfig::default(),
            chunking: Default::default(),
            retrieval: Default::default(),
            embedding: crate::config::EmbeddingConfig {
                enabled: true,
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

    #[tokio::test]
    async fn ingest_then_search_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "Rust ownership and borrowing explained").unwrap();
        let config = test_config(dir.path());
        let engine = Engine::with_capabilities(
            config.clone(),
            Arc::new(HashEmbedder::new(8)),
            Arc::new(NullLanguageModel),
            Arc::new(NullReranker),
        )
        .await
        .unwrap();

        let summary = engine
            .ingest(dir.path(), None, Arc::new(NoProgress), Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();
        assert_eq!(summary.admitted, 1);

        let options = SearchOptions { mode: SearchMode::Keyword, ..SearchOptions::from_config(&config.retrieval) };
        let results = Search::search(
            &engine,
            Query { text: "ownership".to_string(), filter: MetadataFilter::default() },
            options,
            Arc::new(AtomicBool::new(false)),
        )
        .await
        .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn context_provider_respects_chunk_budget() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            std::fs::write(dir.path().join(format!("f{i}.txt")), format!("Document number {i} about Rust")).unwrap();
        }
        let config = test_config(dir.path());
        let engine = Engine::with_capabilities(
            config.clone(),
            Arc::new(HashEmbedder::new(8)),
            Arc::new(NullLanguageModel),
            Arc::new(NullReranker),
        )
        .await
        .unwrap();
        engine
            .ingest(dir.path(), None, Arc::new(NoProgress), Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();

        let block = engine
            .context(
                Query { text: "Rust".to_string(), filter: MetadataFilter::default() },
                ContextBudget { max_chunks: 2, max_tokens: 100_000, dedupe_by_doc: true },
            )
            .await
            .unwrap();
        assert!(block.entries.len() <= 2);
    }
}
