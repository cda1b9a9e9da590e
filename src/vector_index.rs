//! Vector Index (C8): an in-memory, brute-force cosine-similarity index
//! over chunk embeddings.
//!
//! Not backed by its own SQL table — it is a derived cache rebuilt from
//! the Document Store's `chunk_vectors` rows on startup and after bulk
//! writes (spec.md §9 open question (a)). Metadata filters are applied as
//! a post-filter over an over-fetched candidate set, since a brute-force
//! scan has no index to push a filter into; the Keyword Index (C9)
//! pushes filters down natively instead.
//!
//! `vec_to_blob`/`blob_to_vec`/`cosine_similarity` live here rather than
//! in [`crate::embedding`] since this is their only consumer.

use crate::store::{MetadataFilter, Store};

/// How many extra candidates to fetch, as a multiplier over the caller's
/// `limit`, before post-filtering by metadata. Keeps filtered queries from
/// starving when the filter excludes a large fraction of the corpus.
const OVER_FETCH_FACTOR: usize = 4;

pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity in `[-1, 1]`. Returns `0.0` for empty or
/// mismatched-length vectors rather than erroring — callers treat this as
/// "no similarity signal", not a fatal condition.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub chunk_id: String,
    pub score: f32,
}

#[derive(Default)]
pub struct VectorIndex {
    entries: Vec<(String, Vec<f32>)>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rebuilds the index from scratch by scanning every stored vector
    /// that matches `filter`. Called on startup and after a batch
    /// ingestion run completes.
    pub async fn rebuild_from(
        store: &dyn Store,
        filter: &MetadataFilter,
    ) -> crate::error::EngineResult<Self> {
        let records = store.scan_vectors(filter).await?;
        Ok(Self {
            entries: records.into_iter().map(|r| (r.chunk_id, r.vector)).collect(),
        })
    }

    pub fn insert(&mut self, chunk_id: String, vector: Vec<f32>) {
        self.entries.retain(|(id, _)| id != &chunk_id);
        self.entries.push((chunk_id, vector));
    }

    pub fn remove(&mut self, chunk_id: &str) {
        self.entries.retain(|(id, _)| id != chunk_id);
    }

    /// Top-`limit` chunks by cosine similarity to `query_vector`.
    /// `allowed_chunk_ids`, when present, is applied as a post-filter
    /// (spec.md §9 open question (a)): the brute-force scan always
    /// over-fetches before filtering so a narrow allow-list does not
    /// starve the result set.
    pub fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        allowed_chunk_ids: Option<&std::collections::HashSet<String>>,
    ) -> Vec<VectorHit> {
        let fetch_n = limit.saturating_mul(OVER_FETCH_FACTOR).max(limit);
        let mut scored: Vec<VectorHit> = self
            .entries
            .iter()
            .map(|(chunk_id, vector)| VectorHit {
                chunk_id: chunk_id.clone(),
                score: cosine_similarity(query_vector, vector),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(fetch_n);

        if let Some(allowed) = allowed_chunk_ids {
            scored.retain(|hit| allowed.contains(&hit.chunk_id));
        }
        scored.truncate(limit);
        scored
    }
}
