//! Embedder Facade (C5).
//!
//! `Embedder` is one of the abstract capabilities this core consumes
//! (spec.md §6) rather than implements — any local or remote model
//! suffices, as long as it produces a fixed-dimension vector per input
//! text. The facade in this module batches chunks up to a configurable
//! size, retries transient failures with exponential backoff and jitter,
//! and verifies every returned vector against the collection's declared
//! dimension before it ever reaches the store.
//!
//! No concrete HTTP client lives here — the embedding model is an
//! external collaborator, reached only through the abstract `Embedder`
//! trait object, so this facade stays free of any one provider's API
//! shape.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{EngineError, EngineResult};

/// The abstract embedding capability (spec.md §6): `embed(texts) ->
/// vectors`, fixed output dimension, deterministic per input.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier stored as `Document.embedder_id` /
    /// `Embedding.embedder_id`.
    fn id(&self) -> &str;
    /// Fixed output dimension for every vector this embedder returns.
    fn dims(&self) -> usize;
    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String>;
}

/// An embedder that always fails; used when `embedding.enabled = false`.
pub struct NullEmbedder;

#[async_trait]
impl Embedder for NullEmbedder {
    fn id(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
        Err("embeddings are disabled".to_string())
    }
}

/// A deterministic test/demo embedder: hashes each text into a
/// fixed-dimension vector. Never calls out to a network or model
/// runtime, so it is suitable for integration tests that need stable
/// vectors without a real embedding model.
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn id(&self) -> &str {
        "hash-embedder-v1"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
        Ok(texts.iter().map(|t| hash_vector(t, self.dims)).collect())
    }
}

fn hash_vector(text: &str, dims: usize) -> Vec<f32> {
    use sha2::{Digest, Sha256};
    let mut vector = Vec::with_capacity(dims);
    let mut counter: u32 = 0;
    while vector.len() < dims {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(counter.to_le_bytes());
        let digest = hasher.finalize();
        for chunk in digest.chunks_exact(4) {
            if vector.len() >= dims {
                break;
            }
            let n = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            vector.push((n as f32 / u32::MAX as f32) * 2.0 - 1.0);
        }
        counter += 1;
    }
    vector
}

/// Batches `texts` through `embedder`, retrying transient failures with
/// exponential backoff plus jitter, and verifies every returned vector's
/// dimension. A persistent failure surfaces as
/// [`EngineError::EmbeddingFailed`]; a dimension mismatch is always fatal
/// ([`EngineError::DimensionMismatch`]), never retried. `timeout_ms`
/// bounds each individual batch call to the embedder (spec.md §5: 30s
/// default per batch); a batch that overruns it surfaces as
/// [`EngineError::Timeout`], which is itself retried within the same
/// bounded-attempt loop.
pub async fn embed_batched(
    embedder: &dyn Embedder,
    config: &EmbeddingConfig,
    timeout_ms: u64,
    texts: &[String],
) -> EngineResult<Vec<Vec<f32>>> {
    let mut out = Vec::with_capacity(texts.len());
    for batch in texts.chunks(config.batch_size.max(1)) {
        let vectors = embed_with_retry(embedder, config, timeout_ms, batch).await?;
        for v in &vectors {
            if v.len() != embedder.dims() {
                return Err(EngineError::DimensionMismatch {
                    expected: embedder.dims(),
                    actual: v.len(),
                });
            }
        }
        out.extend(vectors);
    }
    Ok(out)
}

/// Convenience wrapper around [`embed_batched`] for a single query text.
pub async fn embed_query(
    embedder: &dyn Embedder,
    config: &EmbeddingConfig,
    timeout_ms: u64,
    text: &str,
) -> EngineResult<Vec<f32>> {
    let vectors = embed_batched(embedder, config, timeout_ms, std::slice::from_ref(&text.to_string())).await?;
    vectors.into_iter().next().ok_or_else(|| EngineError::EmbeddingFailed {
        category: "empty_response".to_string(),
        reason: "embedder returned no vectors".to_string(),
    })
}

async fn embed_with_retry(
    embedder: &dyn Embedder,
    config: &EmbeddingConfig,
    timeout_ms: u64,
    texts: &[String],
) -> EngineResult<Vec<Vec<f32>>> {
    let mut last_err = EngineError::EmbeddingFailed {
        category: "retries_exhausted".to_string(),
        reason: "embedder never attempted".to_string(),
    };
    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let base = config.backoff_base_ms * (1u64 << (attempt - 1).min(5));
            let jitter_ms = rand::thread_rng().gen_range(0..=base / 4 + 1);
            tokio::time::sleep(Duration::from_millis(base + jitter_ms)).await;
        }
        match tokio::time::timeout(Duration::from_millis(timeout_ms), embedder.embed(texts)).await {
            Ok(Ok(vectors)) => return Ok(vectors),
            Ok(Err(reason)) => {
                last_err = EngineError::EmbeddingFailed {
                    category: "retries_exhausted".to_string(),
                    reason,
                }
            }
            Err(_) => {
                last_err = EngineError::Timeout {
                    stage: "embedder".to_string(),
                    elapsed_ms: timeout_ms,
                }
            }
        }
    }
    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> EmbeddingConfig {
        EmbeddingConfig {
            enabled: true,
            dims: Some(8),
            batch_size: 2,
            max_retries: 2,
            backoff_base_ms: 1,
        }
    }

    #[tokio::test]
    async fn hash_embedder_is_deterministic() {
        let e = HashEmbedder::new(8);
        let a = e.embed(&["hello".to_string()]).await.unwrap();
        let b = e.embed(&["hello".to_string()]).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn batches_respect_configured_size() {
        let e = HashEmbedder::new(8);
        let texts: Vec<String> = (0..5).map(|i| format!("text-{i}")).collect();
        let out = embed_batched(&e, &cfg(), 1_000, &texts).await.unwrap();
        assert_eq!(out.len(), 5);
        for v in &out {
            assert_eq!(v.len(), 8);
        }
    }

    #[tokio::test]
    async fn null_embedder_always_fails() {
        let e = NullEmbedder;
        let err = embed_query(&e, &cfg(), 1_000, "q").await.unwrap_err();
        assert!(matches!(err, EngineError::EmbeddingFailed { .. }));
    }

    #[tokio::test]
    async fn dimension_mismatch_is_fatal() {
        struct WrongDims;
        #[async_trait]
        impl Embedder for WrongDims {
            fn id(&self) -> &str {
                "wrong"
            }
            fn dims(&self) -> usize {
                8
            }
            async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
                Ok(texts.iter().map(|_| vec![0.0f32; 4]).collect())
            }
        }
        let err = embed_query(&WrongDims, &cfg(), 1_000, "q").await.unwrap_err();
        assert!(matches!(err, EngineError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn embedder_timeout_surfaces_as_timeout_error() {
        struct SlowEmbedder;
        #[async_trait]
        impl Embedder for SlowEmbedder {
            fn id(&self) -> &str {
                "slow"
            }
            fn dims(&self) -> usize {
                8
            }
            async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(texts.iter().map(|_| vec![0.0f32; 8]).collect())
            }
        }
        let mut config = cfg();
        config.max_retries = 0;
        let err = embed_query(&SlowEmbedder, &config, 5, "q").await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout { .. }));
    }
}
