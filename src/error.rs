//! Tagged-union error taxonomy for the engine.
//!
//! Every fallible operation in the core returns `Result<T, EngineError>`.
//! Callers match on variants rather than strings — there is no
//! string-based error discrimination anywhere in the pipeline. The thin
//! CLI binary converts `EngineError` into `anyhow::Error` at its single
//! entry point, the same boundary convention the rest of this crate's
//! `anyhow` call sites already use.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The full error taxonomy. Each variant carries the context needed to act
/// on it (not just describe it) and, where applicable, a remediation hint.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("unsupported format for {path}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("extraction failed for {path}: {reason}")]
    ExtractionFailed { path: PathBuf, reason: String },

    #[error("encoding error in {path}: {reason}")]
    EncodingError { path: PathBuf, reason: String },

    #[error("size exceeded for {path}: {limit} bytes")]
    SizeExceeded { path: PathBuf, limit: u64 },

    #[error("corrupt file {path}: {reason}")]
    CorruptFile { path: PathBuf, reason: String },

    #[error("missing dependency: {what} ({install_hint})")]
    DependencyMissing { what: String, install_hint: String },

    #[error("timeout after {elapsed_ms}ms during {stage}")]
    Timeout { stage: String, elapsed_ms: u64 },

    #[error("embedding failed ({category}): {reason}")]
    EmbeddingFailed { category: String, reason: String },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("malformed query: {reason}")]
    MalformedQuery { reason: String },

    #[error("cancelled")]
    Cancelled,

    #[error("storage error: {reason}")]
    StorageError { reason: String },

    #[error("unknown error: {reason}")]
    Unknown { reason: String },
}

impl EngineError {
    /// True for errors that are retryable within the ingestion coordinator's
    /// bounded-attempt retry loop (§7 propagation policy).
    pub fn is_retryable_in_ingestion(&self) -> bool {
        matches!(
            self,
            EngineError::Timeout { .. } | EngineError::EmbeddingFailed { .. }
        )
    }

    /// A short, stable category label used in checkpoint `failed` entries
    /// and in audit log rows. Not used for control flow — matching must
    /// always go through the enum variant, never this string.
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "not_found",
            EngineError::UnsupportedFormat { .. } => "unsupported_format",
            EngineError::ExtractionFailed { .. } => "extraction_failed",
            EngineError::EncodingError { .. } => "encoding_error",
            EngineError::SizeExceeded { .. } => "size_exceeded",
            EngineError::CorruptFile { .. } => "corrupt_file",
            EngineError::DependencyMissing { .. } => "dependency_missing",
            EngineError::Timeout { .. } => "timeout",
            EngineError::EmbeddingFailed { .. } => "embedding_failed",
            EngineError::DimensionMismatch { .. } => "dimension_mismatch",
            EngineError::MalformedQuery { .. } => "malformed_query",
            EngineError::Cancelled => "cancelled",
            EngineError::StorageError { .. } => "storage_error",
            EngineError::Unknown { .. } => "unknown",
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::StorageError {
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Unknown {
            reason: err.to_string(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Runs `fut` under a `timeout_ms` deadline (spec.md §5 per-capability
/// timeouts). An overrun surfaces as [`EngineError::Timeout`] tagged
/// with `stage`, rather than the future's own error type.
pub async fn with_timeout<F, T>(timeout_ms: u64, stage: &str, fut: F) -> EngineResult<T>
where
    F: Future<Output = EngineResult<T>>,
{
    match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout {
            stage: stage.to_string(),
            elapsed_ms: timeout_ms,
        }),
    }
}
