//! Contextualiser (C6, optional): generates a one- or two-sentence
//! context prefix per chunk via the abstract [`LanguageModel`]
//! capability, so downstream embedding and retrieval can disambiguate a
//! chunk from its surrounding document without re-reading the whole file.
//!
//! Built against the `LanguageModel` trait object so any concrete model
//! can be swapped in at construction time. A failed or unavailable model
//! is non-fatal: ingestion proceeds with an empty `context_prefix`
//! rather than failing the whole document.

use std::time::Duration;

use crate::language_model::LanguageModel;

/// Chunk text longer than this is truncated before being interpolated
/// into the prompt, to keep prompt size bounded regardless of chunk size.
const PROMPT_CHUNK_TRUNCATE_CHARS: usize = 600;

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// Builds the fixed contextualisation prompt (spec.md §9 open question
/// (c)): `"Document: {title}. Section: {section_path}. Summarize in 1-2
/// sentences what this excerpt is about, for search context:
/// {chunk_text_truncated}"`.
pub fn build_prompt(title: &str, section_path: &[String], chunk_text: &str) -> String {
    let section = if section_path.is_empty() {
        "(none)".to_string()
    } else {
        section_path.join(" > ")
    };
    let truncated = truncate_chars(chunk_text, PROMPT_CHUNK_TRUNCATE_CHARS);
    format!(
        "Document: {title}. Section: {section}. Summarize in 1-2 sentences what this excerpt is about, for search context: {truncated}"
    )
}

/// Generates a context prefix for one chunk. Returns `None` (not an
/// error) when the language model is unavailable, fails, or overruns
/// `timeout_ms` (spec.md §5: 60s default per request) — the caller
/// should leave `Chunk.context_prefix` empty in that case, since the
/// Contextualiser is a non-fatal quality refinement, not a correctness
/// requirement.
pub async fn contextualize(
    model: &dyn LanguageModel,
    timeout_ms: u64,
    title: &str,
    section_path: &[String],
    chunk_text: &str,
) -> Option<String> {
    let prompt = build_prompt(title, section_path, chunk_text);
    match tokio::time::timeout(Duration::from_millis(timeout_ms), model.complete(&prompt)).await {
        Ok(Ok(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Ok(Err(_)) | Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language_model::{EchoLanguageModel, NullLanguageModel};

    #[test]
    fn prompt_includes_title_and_section() {
        let prompt = build_prompt("Report", &["Intro".to_string(), "Scope".to_string()], "some text");
        assert!(prompt.contains("Report"));
        assert!(prompt.contains("Intro > Scope"));
        assert!(prompt.contains("some text"));
    }

    #[test]
    fn prompt_uses_none_for_empty_section_path() {
        let prompt = build_prompt("Report", &[], "text");
        assert!(prompt.contains("Section: (none)"));
    }

    #[test]
    fn prompt_truncates_long_chunk_text() {
        let long_text = "a".repeat(1000);
        let prompt = build_prompt("T", &[], &long_text);
        assert!(prompt.len() < 1000 + 200);
        assert!(prompt.contains('…'));
    }

    #[tokio::test]
    async fn unavailable_model_yields_none() {
        let out = contextualize(&NullLanguageModel, 1_000, "T", &[], "body").await;
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn working_model_yields_some() {
        let out = contextualize(&EchoLanguageModel, 1_000, "T", &[], "body").await;
        assert!(out.is_some());
    }

    #[tokio::test]
    async fn slow_model_yields_none_on_timeout() {
        struct SlowModel;
        #[async_trait::async_trait]
        impl LanguageModel for SlowModel {
            fn id(&self) -> &str {
                "slow"
            }
            async fn complete(&self, _prompt: &str) -> Result<String, String> {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok("late summary".to_string())
            }
        }
        let out = contextualize(&SlowModel, 5, "T", &[], "body").await;
        assert!(out.is_none());
    }
}
