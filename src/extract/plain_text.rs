//! Plain-text extractor. No structural hints beyond the raw text.

use super::Extractor;
use crate::error::{EngineError, EngineResult};
use crate::models::{ExtractionResult, Quality};

pub struct PlainTextExtractor;

impl Extractor for PlainTextExtractor {
    fn id(&self) -> &'static str {
        "plain_text_v1"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["txt", "text", "log", "csv", "tsv"]
    }

    fn sniff(&self, bytes: &[u8]) -> bool {
        std::str::from_utf8(bytes).is_ok()
    }

    fn extract(&self, bytes: &[u8]) -> EngineResult<ExtractionResult> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| EngineError::EncodingError {
                path: "<plain text>".into(),
                reason: e.to_string(),
            })?
            .to_string();
        Ok(ExtractionResult {
            text,
            pages: None,
            headings: Vec::new(),
            tables: Vec::new(),
            quality: Quality::NativeText,
        })
    }
}
