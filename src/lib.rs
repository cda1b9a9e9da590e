//! # Context Harness
//!
//! **A local-first personal knowledge engine: content-addressed ingestion,
//! a dual vector + keyword index, and hybrid retrieval with fusion and
//! optional reranking.**
//!
//! The LLM, embedding model, and any chat/ask front end are external
//! collaborators — this crate is the retrieval core they sit on top of.
//!
//! ## Data flow
//!
//! ```text
//! ┌────────────┐  C1   ┌───────────┐  C2   ┌────────────┐  C3   ┌───────────┐
//! │ discovery  │──────▶│  content_  │──────▶│  extract   │──────▶│ normalize │
//! │ (fs walk)  │       │  address   │       │  registry  │       │           │
//! └────────────┘       └───────────┘       └────────────┘       └─────┬─────┘
//!                                                                      │ C4
//!                                                                      ▼
//! ┌────────────┐  C7   ┌───────────┐  C5   ┌────────────┐       ┌───────────┐
//! │   store    │◀──────│ embedding  │◀──────│contextualiz│◀──────│   chunk   │
//! │  (SQLite)  │       │  (facade)  │  C6   │    -er     │       │           │
//! └─────┬──────┘       └───────────┘       └────────────┘       └───────────┘
//!       │
//!       ├── C8 vector_index (brute-force cosine cache)
//!       └── C9 keyword_index (hand-rolled Okapi BM25)
//!             │
//!             ▼
//!       C11 search (RRF fusion, optional rerank) ──▶ C12 ports (Search,
//!       ContextProvider, Admission)
//! ```
//!
//! [`ingest::Coordinator`] drives C1–C7 over a bounded worker pool with
//! per-file checkpointing (C10). [`search::retrieve`] is the C11
//! Retriever. [`ports::Engine`] ties both together behind the three
//! capability ports a generation layer would depend on.
//!
//! ## Modules
//!
//! | Module | Component | Purpose |
//! |--------|-----------|---------|
//! | [`content_address`] | C1 | File fingerprinting and duplicate-content policy |
//! | [`extract`] | C2 | Format-dispatch text extraction (PDF, Office, Markdown, HTML, plain text) |
//! | [`normalize`] | C3 | Pure text-cleanup pipeline with offset tracking |
//! | [`chunk`] | C4 | Structure-aware chunker (headings, tables, overlap) |
//! | [`embedding`] | C5 | Embedder facade: batching, retry/backoff, dimension checks |
//! | [`contextualizer`] | C6 | Optional LLM-authored context prefixes |
//! | [`store`] | C7 | Document store trait + SQLite implementation |
//! | [`vector_index`] | C8 | In-memory cosine-similarity cache |
//! | [`keyword_index`] | C9 | Inverted index + Okapi BM25 + boolean query grammar |
//! | [`discovery`] | — | Filesystem walk feeding C10 |
//! | [`ingest`] | C10 | Ingestion coordinator: worker pool, checkpoints, progress |
//! | [`search`] | C11 | Retriever: fan-out, RRF fusion, rerank, citations |
//! | [`ports`] | C12 | `Search` / `ContextProvider` / `Admission` capability ports |
//! | [`language_model`] | — | Abstract LLM capability used by [`contextualizer`] |
//! | [`reranker`] | — | Abstract cross-encoder capability used by [`search`] |
//! | [`config`] | — | TOML configuration parsing and validation |
//! | [`models`] | — | Core data types: `Document`, `Chunk`, `Embedding`, `Tag`, `Checkpoint` |
//! | [`error`] | — | `EngineError` tagged-union error taxonomy |
//! | [`progress`] | — | Structured ingestion progress events |
//! | [`db`] | — | SQLite connection pool (WAL mode) |
//! | [`migrate`] | — | Database schema migrations (idempotent) |
//!
//! ## Configuration
//!
//! The engine is configured via a TOML file. See [`config`] for all
//! available options and [`config::load_config`] for validation rules.

pub mod chunk;
pub mod config;
pub mod content_address;
pub mod contextualizer;
pub mod db;
pub mod discovery;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod keyword_index;
pub mod language_model;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod ports;
pub mod progress;
pub mod reranker;
pub mod search;
pub mod store;
pub mod vector_index;
