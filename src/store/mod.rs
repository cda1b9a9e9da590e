//! Document Store (C7): the canonical, durable home for documents,
//! chunks, vectors, tags, checkpoints, and the audit log.
//!
//! An async-trait storage abstraction over the collection-oriented model
//! of [`crate::models`], so the ingestion worker pool and the retriever
//! can share one `Arc<dyn Store>` without depending on a concrete
//! backend. [`sqlite`] is the only implementation today, built on
//! [`crate::db`]'s WAL-mode pool and [`crate::migrate`]'s schema.

pub mod sqlite;

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::models::{Chunk, Document, DuplicateVerdict, Embedding, Tag};

/// A stored chunk together with its parent document's indexable metadata,
/// as returned by metadata-filtered scans (used by the Vector and Keyword
/// Indices to rebuild themselves, and by filter pushdown).
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub chunk: Chunk,
    pub doc_id: String,
    pub source_path: String,
    pub indexed_at: chrono::DateTime<chrono::Utc>,
}

/// A stored vector alongside its owning chunk id, for [`crate::vector_index`]
/// to rebuild its in-memory index from.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub chunk_id: String,
    pub vector: Vec<f32>,
}

/// Metadata filters pushed down into store queries (spec.md §9 open
/// question (a)): both indices accept the same filter shape, the keyword
/// index applies it natively during its scan, the vector index applies it
/// as a post-filter over an over-fetched candidate set.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    pub doc_ids: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub since: Option<chrono::DateTime<chrono::Utc>>,
}

/// Abstract storage backend. All operations are async and `Send + Sync`
/// so a single `Arc<dyn Store>` can be shared across the ingestion worker
/// pool and the retriever.
#[async_trait]
pub trait Store: Send + Sync {
    /// Look up an existing document by content hash, for duplicate
    /// detection (C1).
    async fn find_by_content_hash(&self, content_hash: &str) -> EngineResult<Option<String>>;

    /// Looks up a document previously admitted from `source_path` whose
    /// `file_hash` still matches (spec.md §4.10 step 1: the cheap
    /// unchanged-file short-circuit, checked before the content hash is
    /// even computed).
    async fn find_unchanged(&self, source_path: &str, file_hash: &str) -> EngineResult<Option<String>>;

    /// Atomically admits a document plus its chunks and (optional)
    /// embeddings. Replaces any prior chunks/vectors for the same
    /// `doc_id` (re-ingestion path). All-or-nothing: a failure partway
    /// through leaves the previous state intact.
    async fn admit(
        &self,
        document: &Document,
        chunks: &[Chunk],
        embeddings: Option<&[Embedding]>,
    ) -> EngineResult<()>;

    /// Records `source_path` against an existing document under the
    /// `link` duplicate policy, without touching its chunks.
    async fn link_path(&self, doc_id: &str, source_path: &str) -> EngineResult<()>;

    /// Removes a document and everything that cascades from it (chunks,
    /// vectors, tags, links) via `ON DELETE CASCADE`.
    async fn delete_document(&self, doc_id: &str) -> EngineResult<()>;

    async fn get_document(&self, doc_id: &str) -> EngineResult<Option<Document>>;
    async fn get_chunks(&self, doc_id: &str) -> EngineResult<Vec<Chunk>>;

    /// Looks up one chunk by id together with its parent document's
    /// `source_path`, for the Retriever (C11) to enrich a ranked hit into
    /// a citation without fetching the whole document's chunk list.
    async fn get_chunk_by_id(&self, chunk_id: &str) -> EngineResult<Option<ChunkRecord>>;

    /// Full chunk scan for index rebuilds, with optional metadata filter
    /// pushed down natively.
    async fn scan_chunks(&self, filter: &MetadataFilter) -> EngineResult<Vec<ChunkRecord>>;
    async fn scan_vectors(&self, filter: &MetadataFilter) -> EngineResult<Vec<VectorRecord>>;

    async fn upsert_tag(&self, tag: &Tag) -> EngineResult<()>;
    async fn remove_tag(&self, doc_id: &str, name: &str) -> EngineResult<()>;
    async fn list_tags(&self, doc_id: &str) -> EngineResult<Vec<Tag>>;

    async fn append_audit_log(&self, operation: &str, doc_id: Option<&str>, detail: &str) -> EngineResult<()>;
}

/// Presents `content_hash` to `store` and reports the duplicate verdict
/// under `policy`, without performing any write. Shared helper so both
/// the ingestion coordinator and tests exercise the same decision table
/// as [`crate::content_address::DuplicateRegistry`].
pub async fn classify_duplicate(
    store: &dyn Store,
    policy: crate::models::DuplicatePolicy,
    content_hash: &str,
) -> EngineResult<DuplicateVerdict> {
    use crate::models::DuplicatePolicy::*;
    let existing = store.find_by_content_hash(content_hash).await?;
    Ok(match (policy, existing) {
        (_, None) => DuplicateVerdict::New,
        (Skip, Some(doc_id)) => DuplicateVerdict::Duplicate(doc_id),
        (IndexAll, Some(_)) => DuplicateVerdict::New,
        (Link, Some(doc_id)) => DuplicateVerdict::Linked(doc_id),
    })
}
