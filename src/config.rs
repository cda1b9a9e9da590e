//! Configuration parsing and validation.
//!
//! The engine is configured via a TOML file (default: `config/engine.toml`).
//! The config defines the database path, chunking parameters, retrieval
//! tuning, embedding batching, ingestion concurrency, and per-capability
//! timeouts.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::DuplicatePolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub collection: CollectionConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Collection configuration envelope (spec.md §3 `Collection`).
#[derive(Debug, Deserialize, Clone)]
pub struct CollectionConfig {
    #[serde(default = "default_collection_id")]
    pub collection_id: String,
    #[serde(default = "default_chunker_profile")]
    pub chunker_profile: String,
    #[serde(default = "default_normaliser_profile")]
    pub normaliser_profile: String,
    #[serde(default = "default_duplicate_policy")]
    pub duplicate_policy: DuplicatePolicy,
}

fn default_collection_id() -> String {
    "default".to_string()
}
fn default_chunker_profile() -> String {
    "structural-v1".to_string()
}
fn default_normaliser_profile() -> String {
    "standard-v1".to_string()
}
fn default_duplicate_policy() -> DuplicatePolicy {
    DuplicatePolicy::Skip
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            collection_id: default_collection_id(),
            chunker_profile: default_chunker_profile(),
            normaliser_profile: default_normaliser_profile(),
            duplicate_policy: default_duplicate_policy(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size in tokens (`T`).
    #[serde(default = "default_target_tokens")]
    pub target_tokens: usize,
    /// Overlap between adjacent chunks in tokens (`O`).
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
    /// Fragments smaller than this (in tokens) are merged with a
    /// neighbour (`Tmin`).
    #[serde(default = "default_min_tokens")]
    pub min_tokens: usize,
    /// Hard cap on chunk size, even for table/code-block atomic units
    /// (`Hmax`).
    #[serde(default = "default_hard_cap_tokens")]
    pub hard_cap_tokens: usize,
}

fn default_target_tokens() -> usize {
    512
}
fn default_overlap_tokens() -> usize {
    64
}
fn default_min_tokens() -> usize {
    64
}
fn default_hard_cap_tokens() -> usize {
    2048
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: default_target_tokens(),
            overlap_tokens: default_overlap_tokens(),
            min_tokens: default_min_tokens(),
            hard_cap_tokens: default_hard_cap_tokens(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default)]
    pub rerank: bool,
    #[serde(default = "default_final_limit")]
    pub default_limit: i64,
    #[serde(default = "default_over_fetch_rerank")]
    pub over_fetch_with_rerank: i64,
    #[serde(default = "default_over_fetch_plain")]
    pub over_fetch_plain: i64,
}

fn default_semantic_weight() -> f64 {
    0.5
}
fn default_keyword_weight() -> f64 {
    0.5
}
fn default_rrf_k() -> u32 {
    60
}
fn default_min_score() -> f64 {
    0.0
}
fn default_final_limit() -> i64 {
    12
}
fn default_over_fetch_rerank() -> i64 {
    5
}
fn default_over_fetch_plain() -> i64 {
    2
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_weight: default_semantic_weight(),
            keyword_weight: default_keyword_weight(),
            rrf_k: default_rrf_k(),
            min_score: default_min_score(),
            rerank: false,
            default_limit: default_final_limit(),
            over_fetch_with_rerank: default_over_fetch_rerank(),
            over_fetch_plain: default_over_fetch_plain(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_backoff_base_ms() -> u64 {
    1000
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Ingestion coordinator tuning (C10).
#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    /// Bounded worker pool size `W`. Defaults to the host's CPU count.
    #[serde(default)]
    pub worker_count: Option<usize>,
    /// Capacity of the bounded queue between discovery and the worker
    /// pool.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default = "default_exclude_globs")]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_queue_capacity() -> usize {
    256
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}
fn default_exclude_globs() -> Vec<String> {
    vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ]
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            queue_capacity: default_queue_capacity(),
            include_globs: default_include_globs(),
            exclude_globs: default_exclude_globs(),
            follow_symlinks: false,
        }
    }
}

impl IngestionConfig {
    pub fn effective_worker_count(&self) -> usize {
        self.worker_count
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4))
    }
}

/// Per-capability timeouts (§5), in milliseconds.
#[derive(Debug, Deserialize, Clone)]
pub struct TimeoutsConfig {
    #[serde(default = "default_embedder_timeout_ms")]
    pub embedder_ms: u64,
    #[serde(default = "default_language_model_timeout_ms")]
    pub language_model_ms: u64,
    #[serde(default = "default_reranker_timeout_ms")]
    pub reranker_ms: u64,
    #[serde(default = "default_store_write_timeout_ms")]
    pub store_write_ms: u64,
}

fn default_embedder_timeout_ms() -> u64 {
    30_000
}
fn default_language_model_timeout_ms() -> u64 {
    60_000
}
fn default_reranker_timeout_ms() -> u64 {
    10_000
}
fn default_store_write_timeout_ms() -> u64 {
    5_000
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            embedder_ms: default_embedder_timeout_ms(),
            language_model_ms: default_language_model_timeout_ms(),
            reranker_ms: default_reranker_timeout_ms(),
            store_write_ms: default_store_write_timeout_ms(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.target_tokens == 0 {
        anyhow::bail!("chunking.target_tokens must be > 0");
    }
    if config.chunking.hard_cap_tokens < config.chunking.target_tokens {
        anyhow::bail!("chunking.hard_cap_tokens must be >= chunking.target_tokens");
    }
    if config.chunking.overlap_tokens >= config.chunking.target_tokens {
        anyhow::bail!("chunking.overlap_tokens must be < chunking.target_tokens");
    }

    if config.retrieval.default_limit < 0 {
        anyhow::bail!("retrieval.default_limit must be >= 0");
    }
    if !(0.0..=1.0).contains(&config.retrieval.min_score) {
        anyhow::bail!("retrieval.min_score must be in [0.0, 1.0]");
    }
    if config.retrieval.rrf_k == 0 {
        anyhow::bail!("retrieval.rrf_k must be > 0");
    }

    if config.embedding.is_enabled() && (config.embedding.dims.is_none() || config.embedding.dims == Some(0)) {
        anyhow::bail!("embedding.dims must be > 0 when embedding.enabled = true");
    }

    Ok(config)
}
