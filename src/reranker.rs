//! Reranker capability: an optional second-pass scorer applied to the
//! fused retrieval result (spec.md §4.11). Unlike the Embedder and
//! Language Model capabilities, a missing or failing reranker is not an
//! error condition — the retriever silently falls back to the fused
//! ranking, since reranking is a quality refinement, not a correctness
//! requirement.

use std::time::Duration;

use async_trait::async_trait;

/// Abstract cross-encoder-style reranking capability: given a query and
/// a batch of candidate texts, returns one relevance score per text, in
/// the same order as the input.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn id(&self) -> &str;
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, String>;
}

/// No reranker configured. Callers should treat any error from this type
/// as "skip reranking", not as an ingestion/retrieval failure.
pub struct NullReranker;

#[async_trait]
impl Reranker for NullReranker {
    fn id(&self) -> &str {
        "disabled"
    }
    async fn score(&self, _query: &str, _texts: &[String]) -> Result<Vec<f32>, String> {
        Err("no reranker configured".to_string())
    }
}

/// Reranks `candidates` in place by descending score when `reranker`
/// succeeds within `timeout_ms` (spec.md §5: 10s default per batch);
/// leaves the existing order untouched on any failure or timeout.
/// `candidates` and `texts` must be the same length and in matching order.
pub async fn rerank_or_passthrough<T>(
    reranker: &dyn Reranker,
    timeout_ms: u64,
    query: &str,
    texts: &[String],
    mut candidates: Vec<T>,
) -> Vec<T> {
    let outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), reranker.score(query, texts)).await;
    match outcome {
        Ok(Ok(scores)) if scores.len() == candidates.len() => {
            let mut indexed: Vec<(f32, T)> = scores.into_iter().zip(candidates.into_iter()).collect();
            indexed.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            indexed.into_iter().map(|(_, c)| c).collect()
        }
        _ => {
            candidates.shrink_to_fit();
            candidates
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedReranker(Vec<f32>);

    #[async_trait]
    impl Reranker for FixedReranker {
        fn id(&self) -> &str {
            "fixed"
        }
        async fn score(&self, _query: &str, _texts: &[String]) -> Result<Vec<f32>, String> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn passthrough_on_unavailable_reranker() {
        let texts = vec!["a".to_string(), "b".to_string()];
        let out = rerank_or_passthrough(&NullReranker, 1_000, "q", &texts, vec!["a", "b"]).await;
        assert_eq!(out, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn reorders_by_descending_score() {
        let reranker = FixedReranker(vec![0.1, 0.9]);
        let texts = vec!["a".to_string(), "b".to_string()];
        let out = rerank_or_passthrough(&reranker, 1_000, "q", &texts, vec!["a", "b"]).await;
        assert_eq!(out, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn passthrough_on_reranker_timeout() {
        struct SlowReranker;
        #[async_trait]
        impl Reranker for SlowReranker {
            fn id(&self) -> &str {
                "slow"
            }
            async fn score(&self, _query: &str, texts: &[String]) -> Result<Vec<f32>, String> {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(vec![1.0; texts.len()])
            }
        }
        let texts = vec!["a".to_string(), "b".to_string()];
        let out = rerank_or_passthrough(&SlowReranker, 5, "q", &texts, vec!["a", "b"]).await;
        assert_eq!(out, vec!["a", "b"]);
    }
}
