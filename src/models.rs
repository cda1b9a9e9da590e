//! Core data model: [`Document`], [`Chunk`], [`Embedding`], [`Tag`],
//! [`Checkpoint`], and [`Collection`], plus the intermediate types that
//! flow between components during ingestion.
//!
//! All identifiers are opaque, stable strings (UUIDv4, minted with
//! [`uuid::Uuid::new_v4`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A source file admitted into the collection.
///
/// `content_hash` is unique within a collection unless the duplicate
/// policy permits repeats. Identity survives content-preserving moves:
/// re-ingesting the same bytes at a new path does not mint a new
/// `doc_id` under the `link` duplicate policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub source_path: String,
    pub content_hash: String,
    pub file_hash: String,
    pub format: String,
    pub byte_size: u64,
    pub indexed_at: DateTime<Utc>,
    pub embedder_id: Option<String>,
    pub chunker_id: String,
    pub normaliser_id: String,
    pub extractor_id: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub publication_date: Option<DateTime<Utc>>,
    pub chunk_count: usize,
}

/// A retrievable unit carved from a document's normalised text.
///
/// Invariants enforced by the chunker and the store: `char_end >
/// char_start`; `(doc_id, ordinal)` unique; `prev_chunk_id`/`next_chunk_id`
/// form a doubly linked chain whose ends match the document's first and
/// last chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub ordinal: i64,
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
    pub page_spans: Vec<u32>,
    pub section_path: Vec<String>,
    pub token_count: usize,
    pub prev_chunk_id: Option<String>,
    pub next_chunk_id: Option<String>,
    pub content_hash: String,
    /// Present only when the Contextualiser (C6) ran: the LLM-authored
    /// context prefix that was embedded alongside `text` but is not part
    /// of it, so the original wording can still be displayed verbatim.
    pub context_prefix: Option<String>,
}

/// One vector per chunk. Dimension must equal the owning collection's
/// declared `embedder_dimension`; mixing dimensions within a collection
/// is a fatal [`crate::error::EngineError::DimensionMismatch`].
#[derive(Debug, Clone)]
pub struct Embedding {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub embedder_id: String,
}

/// Source of a [`Tag`] assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TagSource {
    Manual,
    Legacy,
    AutoKeyword,
    AutoLlm,
    Imported,
}

/// A short label attached to a document, many-to-many.
///
/// `name` is normalised (lowercase, hyphen-separated, optionally
/// namespaced as `namespace/value`) before it reaches the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub doc_id: String,
    pub source: TagSource,
    /// Required (and validated to lie in `[0,1]`) whenever `source !=
    /// Manual`; `None` for manual tags.
    pub confidence: Option<f32>,
    pub created_at: DateTime<Utc>,
}

/// One entry in a [`Checkpoint`]'s `failed` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedFile {
    pub path: String,
    pub category: String,
    pub message: String,
}

/// Ingestion progress record. The coordinator keeps no in-memory state
/// that is not mirrored here plus the Document Store — a `kill -9` at any
/// point leaves a resumable world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub root_path: String,
    pub total_files: usize,
    pub completed_paths: std::collections::BTreeSet<String>,
    pub failed: Vec<FailedFile>,
    pub schema_version: u32,
}

impl Checkpoint {
    pub const SCHEMA_VERSION: u32 = 1;

    pub fn new(run_id: String, root_path: String, total_files: usize) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            root_path,
            total_files,
            completed_paths: Default::default(),
            failed: Vec::new(),
            schema_version: Self::SCHEMA_VERSION,
        }
    }
}

/// Configuration envelope for one knowledge base.
///
/// All embeddings in the collection share `embedder_dimension` and
/// `embedder_id`; a mismatch is fatal at admission, never silently
/// coerced or truncated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub collection_id: String,
    pub embedder_id: Option<String>,
    pub embedder_dimension: Option<usize>,
    pub chunker_profile: String,
    pub normaliser_profile: String,
}

/// Extraction quality, surfaced by [`crate::extract::Extractor`] impls so
/// downstream consumers can flag likely-degraded documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    NativeText,
    NeedsOcr,
    Scanned,
    Degraded,
}

/// One heading found by an extractor, used by the chunker to derive
/// `section_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heading {
    pub title: String,
    pub level: u8,
    pub char_offset: usize,
}

/// A page boundary reported by an extractor (e.g. page N starts at
/// `char_offset`), used by the chunker to compute `page_spans`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSpan {
    pub page_number: u32,
    pub char_offset: usize,
}

/// An atomic table region (do-not-split unit) reported by an extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpan {
    pub char_start: usize,
    pub char_end: usize,
}

/// Full output of running an [`crate::extract::Extractor`] over a file's
/// bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub text: String,
    pub pages: Option<Vec<PageSpan>>,
    pub headings: Vec<Heading>,
    pub tables: Vec<TableSpan>,
    pub quality: Quality,
}

/// Result of presenting a content hash to the duplicate registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateVerdict {
    /// No prior document shares this content hash.
    New,
    /// A prior document shares this content hash; under policy `skip`
    /// ingestion short-circuits and returns the existing id.
    Duplicate(String),
    /// A prior document shares this content hash and, under policy
    /// `link`, the new path is recorded against it rather than minting a
    /// fresh document.
    Linked(String),
}

/// Duplicate-content handling policy for the Content-Address Layer (C1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    Skip,
    IndexAll,
    Link,
}
