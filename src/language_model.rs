//! Language Model capability (C6's collaborator): an abstract text
//! completion port used by the Contextualiser to generate per-chunk
//! context prefixes.
//!
//! Grounded in the same external-capability shape as [`crate::embedding`]:
//! the core never talks to a concrete LLM API directly, only through this
//! trait, so any local or remote model can be plugged in without touching
//! ingestion or retrieval code.

use async_trait::async_trait;

/// Abstract text-completion capability. A single call is expected to be
/// cheap and fast (the Contextualiser calls it once per chunk), so
/// implementations should apply their own batching/caching if the
/// underlying provider benefits from it.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Stable identifier for logging/telemetry.
    fn id(&self) -> &str;
    /// Complete `prompt`, returning the model's raw text response.
    async fn complete(&self, prompt: &str) -> Result<String, String>;
}

/// A language model that always fails; used when no LLM is configured.
/// The Contextualiser treats this as "contextualisation unavailable" and
/// falls back to leaving `context_prefix` empty rather than failing
/// ingestion (spec.md §4.6: non-fatal on LLM failure).
pub struct NullLanguageModel;

#[async_trait]
impl LanguageModel for NullLanguageModel {
    fn id(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _prompt: &str) -> Result<String, String> {
        Err("no language model configured".to_string())
    }
}

/// A deterministic test double: echoes a fixed-length excerpt of the
/// prompt back as its "summary", without calling out to a real model.
pub struct EchoLanguageModel;

#[async_trait]
impl LanguageModel for EchoLanguageModel {
    fn id(&self) -> &str {
        "echo-v1"
    }
    async fn complete(&self, prompt: &str) -> Result<String, String> {
        let excerpt: String = prompt.chars().take(120).collect();
        Ok(excerpt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_model_always_errors() {
        assert!(NullLanguageModel.complete("hi").await.is_err());
    }

    #[tokio::test]
    async fn echo_model_truncates_long_prompts() {
        let prompt = "x".repeat(500);
        let out = EchoLanguageModel.complete(&prompt).await.unwrap();
        assert_eq!(out.len(), 120);
    }
}
