//! Ingestion Coordinator (C10): orchestrates a run over a root path,
//! driving every file through C1 → C2 → C3 → C4 → (C6) → C5 → C7, then
//! updating the Vector (C8) and Keyword (C9) indices.
//!
//! The worker pool is sized to CPU count by default, the checkpoint is
//! rewritten after every file completion, and a per-file failure is
//! captured rather than aborting the run — this is what makes a run
//! resumable after a crash or cancellation.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::content_address;
use crate::contextualizer;
use crate::discovery;
use crate::embedding::{embed_batched, Embedder};
use crate::error::{EngineError, EngineResult};
use crate::extract::ExtractorRegistry;
use crate::keyword_index::KeywordIndex;
use crate::language_model::LanguageModel;
use crate::models::{Checkpoint, Document, DuplicatePolicy, DuplicateVerdict, Embedding, FailedFile};
use crate::normalize;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::store::{classify_duplicate, MetadataFilter, Store};
use crate::vector_index::VectorIndex;

/// Outcome of admitting a single file, before it is folded into the
/// checkpoint and final summary.
#[derive(Debug, Clone)]
enum FileOutcome {
    Admitted,
    SkippedUnchanged,
    Duplicate,
    Linked,
}

impl FileOutcome {
    fn category(&self) -> &'static str {
        match self {
            FileOutcome::Admitted => "admitted",
            FileOutcome::SkippedUnchanged => "skipped_unchanged",
            FileOutcome::Duplicate => "duplicate",
            FileOutcome::Linked => "linked",
        }
    }
}

/// Final report of one coordinator run.
#[derive(Debug, Clone)]
pub struct IngestionSummary {
    pub run_id: String,
    pub total_files: usize,
    pub admitted: usize,
    pub skipped_unchanged: usize,
    pub duplicates: usize,
    pub linked: usize,
    pub failed: Vec<FailedFile>,
    pub cancelled: bool,
}

type WorkResult = (PathBuf, EngineResult<FileOutcome>);

/// Shared, cheaply cloneable context every spawned worker task needs.
/// Bundled so a single `.clone()` wires up one task instead of six.
#[derive(Clone)]
struct WorkerContext {
    store: Arc<dyn Store>,
    extractors: Arc<ExtractorRegistry>,
    embedder: Arc<dyn Embedder>,
    language_model: Arc<dyn LanguageModel>,
    config: Config,
    vector_index: Arc<Mutex<VectorIndex>>,
    keyword_index: Arc<Mutex<KeywordIndex>>,
    reporter: Arc<dyn ProgressReporter>,
}

fn spawn_one(set: &mut JoinSet<WorkResult>, ctx: &WorkerContext, path: PathBuf) {
    let ctx = ctx.clone();
    set.spawn(async move {
        ctx.reporter.report(ProgressEvent::FileBegin {
            path: path.to_string_lossy().to_string(),
        });
        let outcome = ingest_file(
            &path,
            ctx.store.as_ref(),
            &ctx.extractors,
            ctx.embedder.as_ref(),
            ctx.language_model.as_ref(),
            &ctx.config,
            &ctx.vector_index,
            &ctx.keyword_index,
        )
        .await;
        (path, outcome)
    });
}

/// Everything needed to drive one ingestion run.
pub struct Coordinator {
    store: Arc<dyn Store>,
    pool: SqlitePool,
    extractors: Arc<ExtractorRegistry>,
    embedder: Arc<dyn Embedder>,
    language_model: Arc<dyn LanguageModel>,
    config: Config,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn Store>,
        pool: SqlitePool,
        embedder: Arc<dyn Embedder>,
        language_model: Arc<dyn LanguageModel>,
        config: Config,
    ) -> Self {
        Self {
            store,
            pool,
            extractors: Arc::new(ExtractorRegistry::with_builtins()),
            embedder,
            language_model,
            config,
        }
    }

    /// Runs ingestion over `root`. If `run_id` names an existing
    /// checkpoint, resumes it (spec.md §4.10 resumability): files already
    /// in `completed_paths` are skipped without re-reading them. `cancel`
    /// is polled between files; on cancellation the in-flight batch
    /// finishes (so no C7 transaction is interrupted), the checkpoint is
    /// written, and the summary is returned with `cancelled = true`.
    pub async fn run(
        &self,
        root: &Path,
        run_id: Option<String>,
        reporter: Arc<dyn ProgressReporter>,
        cancel: Arc<AtomicBool>,
    ) -> EngineResult<IngestionSummary> {
        let discovered = discovery::discover_files(root, &self.config.ingestion)?;
        let root_str = root.to_string_lossy().to_string();

        let mut checkpoint = match &run_id {
            Some(id) => load_checkpoint(&self.pool, id)
                .await?
                .unwrap_or_else(|| Checkpoint::new(id.clone(), root_str.clone(), discovered.len())),
            None => Checkpoint::new(Uuid::new_v4().to_string(), root_str.clone(), discovered.len()),
        };
        checkpoint.total_files = discovered.len();

        let to_process: Vec<PathBuf> = discovered
            .into_iter()
            .filter(|p| !checkpoint.completed_paths.contains(&p.to_string_lossy().to_string()))
            .collect();

        info!(run_id = %checkpoint.run_id, total = checkpoint.total_files, remaining = to_process.len(), "ingestion starting");
        reporter.report(ProgressEvent::Started {
            run_id: checkpoint.run_id.clone(),
            total_files: checkpoint.total_files,
        });

        let ctx = WorkerContext {
            store: self.store.clone(),
            extractors: self.extractors.clone(),
            embedder: self.embedder.clone(),
            language_model: self.language_model.clone(),
            config: self.config.clone(),
            vector_index: Arc::new(Mutex::new(
                VectorIndex::rebuild_from(self.store.as_ref(), &MetadataFilter::default()).await?,
            )),
            keyword_index: Arc::new(Mutex::new(
                KeywordIndex::rebuild_from(self.store.as_ref(), &MetadataFilter::default()).await?,
            )),
            reporter: reporter.clone(),
        };

        let worker_count = self.config.ingestion.effective_worker_count().max(1);
        let mut admitted = 0usize;
        let mut skipped_unchanged = 0usize;
        let mut duplicates = 0usize;
        let mut linked = 0usize;
        let mut cancelled = false;

        let mut iter = to_process.into_iter();
        let mut set: JoinSet<WorkResult> = JoinSet::new();

        for _ in 0..worker_count {
            match iter.next() {
                Some(path) => spawn_one(&mut set, &ctx, path),
                None => break,
            }
        }

        while let Some(joined) = set.join_next().await {
            let (path, result) = joined.map_err(|e| EngineError::Unknown {
                reason: format!("ingestion worker panicked: {e}"),
            })?;
            let path_str = path.to_string_lossy().to_string();

            let category = fold_outcome(
                &result,
                &mut admitted,
                &mut skipped_unchanged,
                &mut duplicates,
                &mut linked,
            );
            if let Err(err) = &result {
                warn!(path = %path_str, error = %err, "file ingestion failed");
                checkpoint.failed.push(FailedFile {
                    path: path_str.clone(),
                    category: err.category().to_string(),
                    message: err.to_string(),
                });
            }

            checkpoint.completed_paths.insert(path_str.clone());
            reporter.report(ProgressEvent::FileDone {
                path: path_str,
                category: category.to_string(),
            });
            reporter.report(ProgressEvent::Progress {
                completed: checkpoint.completed_paths.len(),
                total: checkpoint.total_files,
            });
            save_checkpoint(&self.pool, &checkpoint).await?;

            if cancel.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }
            if let Some(path) = iter.next() {
                spawn_one(&mut set, &ctx, path);
            }
        }

        if cancelled {
            // Let any still in-flight tasks finish so their C7 transaction
            // completes before we return; their completions are folded
            // into the checkpoint the same way.
            while let Some(joined) = set.join_next().await {
                let (path, result) = joined.map_err(|e| EngineError::Unknown {
                    reason: format!("ingestion worker panicked: {e}"),
                })?;
                let path_str = path.to_string_lossy().to_string();
                fold_outcome(&result, &mut admitted, &mut skipped_unchanged, &mut duplicates, &mut linked);
                if let Err(err) = &result {
                    checkpoint.failed.push(FailedFile {
                        path: path_str.clone(),
                        category: err.category().to_string(),
                        message: err.to_string(),
                    });
                }
                checkpoint.completed_paths.insert(path_str);
            }
            save_checkpoint(&self.pool, &checkpoint).await?;
        }

        reporter.report(ProgressEvent::Finished {
            completed: checkpoint.completed_paths.len(),
            failed: checkpoint.failed.len(),
        });
        info!(
            run_id = %checkpoint.run_id,
            admitted,
            skipped_unchanged,
            duplicates,
            linked,
            failed = checkpoint.failed.len(),
            cancelled,
            "ingestion finished"
        );

        Ok(IngestionSummary {
            run_id: checkpoint.run_id,
            total_files: checkpoint.total_files,
            admitted,
            skipped_unchanged,
            duplicates,
            linked,
            failed: checkpoint.failed,
            cancelled,
        })
    }
}

fn fold_outcome(
    result: &EngineResult<FileOutcome>,
    admitted: &mut usize,
    skipped_unchanged: &mut usize,
    duplicates: &mut usize,
    linked: &mut usize,
) -> &'static str {
    match result {
        Ok(outcome) => {
            match outcome {
                FileOutcome::Admitted => *admitted += 1,
                FileOutcome::SkippedUnchanged => *skipped_unchanged += 1,
                FileOutcome::Duplicate => *duplicates += 1,
                FileOutcome::Linked => *linked += 1,
            }
            outcome.category()
        }
        Err(err) => err.category(),
    }
}

/// Runs the full per-file pipeline (spec.md §4.10 steps 1-4): fingerprint,
/// duplicate classification, extract, normalise, chunk, contextualise,
/// embed, then atomically admit and update the derived indices.
#[allow(clippy::too_many_arguments)]
async fn ingest_file(
    path: &Path,
    store: &dyn Store,
    extractors: &ExtractorRegistry,
    embedder: &dyn Embedder,
    language_model: &dyn LanguageModel,
    config: &Config,
    vector_index: &Mutex<VectorIndex>,
    keyword_index: &Mutex<KeywordIndex>,
) -> EngineResult<FileOutcome> {
    let source_path = path.to_string_lossy().to_string();
    let (file_hash, size, bytes) = content_address::fingerprint(path)?;

    let policy = config.collection.duplicate_policy;
    if policy == DuplicatePolicy::Skip {
        if store.find_unchanged(&source_path, &file_hash).await?.is_some() {
            return Ok(FileOutcome::SkippedUnchanged);
        }
    }

    let content_hash = content_address::content_hash(&bytes);
    let verdict = classify_duplicate(store, policy, &content_hash).await?;
    let doc_id = match verdict {
        DuplicateVerdict::New => Uuid::new_v4().to_string(),
        DuplicateVerdict::Duplicate(_doc_id) => return Ok(FileOutcome::Duplicate),
        DuplicateVerdict::Linked(doc_id) => {
            crate::error::with_timeout(config.timeouts.store_write_ms, "store_write", store.link_path(&doc_id, &source_path))
                .await?;
            return Ok(FileOutcome::Linked);
        }
    };

    let (extractor_id, extraction) = extractors.extract_with_id(path, &bytes)?;
    let normalised = normalize::normalise(&extraction.text);

    let title = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| source_path.clone());
    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "unknown".to_string());

    let mut chunks = crate::chunk::chunk_text(
        &doc_id,
        &normalised.text,
        &extraction.headings,
        &extraction.tables,
        extraction.pages.as_deref().unwrap_or(&[]),
        &config.chunking,
    );

    for c in chunks.iter_mut() {
        c.context_prefix = contextualizer::contextualize(
            language_model,
            config.timeouts.language_model_ms,
            &title,
            &c.section_path,
            &c.text,
        )
        .await;
    }

    let embeddings: Option<Vec<Embedding>> = if config.embedding.is_enabled() {
        let texts: Vec<String> = chunks
            .iter()
            .map(|c| match &c.context_prefix {
                Some(prefix) => format!("{prefix}\n\n{}", c.text),
                None => c.text.clone(),
            })
            .collect();
        let vectors = embed_batched(embedder, &config.embedding, config.timeouts.embedder_ms, &texts).await?;
        Some(
            vectors
                .into_iter()
                .zip(chunks.iter())
                .map(|(vector, c)| Embedding {
                    chunk_id: c.chunk_id.clone(),
                    vector,
                    embedder_id: embedder.id().to_string(),
                })
                .collect(),
        )
    } else {
        None
    };

    let document = Document {
        doc_id: doc_id.clone(),
        source_path: source_path.clone(),
        content_hash,
        file_hash,
        format,
        byte_size: size,
        indexed_at: chrono::Utc::now(),
        embedder_id: embeddings.as_ref().map(|_| embedder.id().to_string()),
        chunker_id: crate::chunk::CHUNKER_ID.to_string(),
        normaliser_id: normalize::NORMALISER_ID.to_string(),
        extractor_id: extractor_id.to_string(),
        title: Some(title),
        author: None,
        publication_date: None,
        chunk_count: chunks.len(),
    };

    crate::error::with_timeout(
        config.timeouts.store_write_ms,
        "store_write",
        store.admit(&document, &chunks, embeddings.as_deref()),
    )
    .await?;
    crate::error::with_timeout(
        config.timeouts.store_write_ms,
        "store_write",
        store.append_audit_log("admit", Some(&doc_id), &format!("ingested {source_path}")),
    )
    .await?;

    {
        let mut vi = vector_index.lock().await;
        if let Some(embeddings) = &embeddings {
            for e in embeddings {
                vi.insert(e.chunk_id.clone(), e.vector.clone());
            }
        }
    }
    {
        let mut ki = keyword_index.lock().await;
        for c in &chunks {
            ki.insert(&c.chunk_id, &c.text);
        }
    }

    Ok(FileOutcome::Admitted)
}

/// Loads the most recent checkpoint row for `run_id`, if any.
pub async fn load_checkpoint(pool: &SqlitePool, run_id: &str) -> EngineResult<Option<Checkpoint>> {
    let row: Option<(String, String, String, i64, String, String, i64)> = sqlx::query_as(
        "SELECT run_id, started_at, root_path, total_files, completed_paths_json, failed_json, schema_version \
         FROM checkpoints WHERE run_id = ?",
    )
    .bind(run_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| EngineError::StorageError { reason: e.to_string() })?;

    let Some((run_id, started_at, root_path, total_files, completed_json, failed_json, schema_version)) = row else {
        return Ok(None);
    };

    let completed_paths: std::collections::BTreeSet<String> =
        serde_json::from_str(&completed_json).unwrap_or_default();
    let failed: Vec<FailedFile> = serde_json::from_str(&failed_json).unwrap_or_default();
    let started_at = chrono::DateTime::parse_from_rfc3339(&started_at)
        .map(|d| d.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now());

    Ok(Some(Checkpoint {
        run_id,
        started_at,
        root_path,
        total_files: total_files as usize,
        completed_paths,
        failed,
        schema_version: schema_version as u32,
    }))
}

/// Persists `checkpoint`, overwriting any prior row for the same
/// `run_id`. Called after every file so a crash loses at most one file's
/// worth of progress (spec.md §4.10 resumability).
pub async fn save_checkpoint(pool: &SqlitePool, checkpoint: &Checkpoint) -> EngineResult<()> {
    let completed_json = serde_json::to_string(&checkpoint.completed_paths).unwrap_or_else(|_| "[]".to_string());
    let failed_json = serde_json::to_string(&checkpoint.failed).unwrap_or_else(|_| "[]".to_string());
    sqlx::query(
        r#"
        INSERT INTO checkpoints (run_id, started_at, root_path, total_files, completed_paths_json, failed_json, schema_version)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(run_id) DO UPDATE SET
            total_files = excluded.total_files,
            completed_paths_json = excluded.completed_paths_json,
            failed_json = excluded.failed_json,
            schema_version = excluded.schema_version
        "#,
    )
    .bind(&checkpoint.run_id)
    .bind(checkpoint.started_at.to_rfc3339())
    .bind(&checkpoint.root_path)
    .bind(checkpoint.total_files as i64)
    .bind(completed_json)
    .bind(failed_json)
    .bind(checkpoint.schema_version as i64)
    .execute(pool)
    .await
    .map_err(|e| EngineError::StorageError { reason: e.to_string() })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CollectionConfig, DbConfig};
    use crate::embedding::HashEmbedder;
    use crate::language_model::NullLanguageModel;
    use crate::store::sqlite::SqliteStore;

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

    async fn fresh_coordinator(config: &Config) -> (Coordinator, SqlitePool) {
        crate::migrate::run_migrations(config).await.unwrap();
        let pool = crate::db::connect(config).await.unwrap();
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool.clone()));
        let coordinator = Coordinator::new(
            store,
            pool.clone(),
            Arc::new(HashEmbedder::new(8)),
            Arc::new(NullLanguageModel),
            config.clone(),
        );
        (coordinator, pool)
    }

    #[tokio::test]
    async fn unchanged_file_is_skipped_on_second_run() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello world").unwrap();
        let config = test_config(dir.path());
        let (coordinator, _pool) = fresh_coordinator(&config).await;
        let reporter: Arc<dyn ProgressReporter> = Arc::new(crate::progress::NoProgress);
        let cancel = Arc::new(AtomicBool::new(false));

        let first = coordinator.run(dir.path(), None, reporter.clone(), cancel.clone()).await.unwrap();
        assert_eq!(first.admitted, 1);

        let second = coordinator
            .run(dir.path(), Some(Uuid::new_v4().to_string()), reporter, cancel)
            .await
            .unwrap();
        assert_eq!(second.skipped_unchanged, 1);
        assert_eq!(second.admitted, 0);
    }

    #[tokio::test]
    async fn resumable_ingest_does_not_reprocess_completed_files() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            std::fs::write(dir.path().join(format!("f{i}.txt")), format!("content number {i}")).unwrap();
        }
        let config = test_config(dir.path());
        let (coordinator, _pool) = fresh_coordinator(&config).await;
        let reporter: Arc<dyn ProgressReporter> = Arc::new(crate::progress::NoProgress);
        let run_id = Uuid::new_v4().to_string();

        let cancel = Arc::new(AtomicBool::new(true));
        let first = coordinator
            .run(dir.path(), Some(run_id.clone()), reporter.clone(), cancel)
            .await
            .unwrap();
        assert!(first.admitted >= 1);
        assert!(first.admitted < 5, "cancellation should stop before all files complete");

        let cancel = Arc::new(AtomicBool::new(false));
        let second = coordinator.run(dir.path(), Some(run_id), reporter, cancel).await.unwrap();
        assert_eq!(first.admitted + second.admitted, 5);
    }

    #[tokio::test]
    async fn duplicate_content_is_recorded_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.txt"), "same bytes").unwrap();
        std::fs::write(dir.path().join("x_copy.txt"), "same bytes").unwrap();
        let config = test_config(dir.path());
        let (coordinator, _pool) = fresh_coordinator(&config).await;
        let reporter: Arc<dyn ProgressReporter> = Arc::new(crate::progress::NoProgress);
        let summary = coordinator
            .run(dir.path(), None, reporter, Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();
        assert_eq!(summary.admitted, 1);
        assert_eq!(summary.duplicates, 1);
    }
}
