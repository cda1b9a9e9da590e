//! PDF extractor built on the `pdf-extract` crate.

use super::Extractor;
use crate::error::{EngineError, EngineResult};
use crate::models::{ExtractionResult, Quality};

pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn id(&self) -> &'static str {
        "pdf_v1"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["pdf"]
    }

    fn sniff(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(b"%PDF-")
    }

    fn extract(&self, bytes: &[u8]) -> EngineResult<ExtractionResult> {
        let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| EngineError::ExtractionFailed {
            path: "<pdf>".into(),
            reason: e.to_string(),
        })?;
        let quality = if text.trim().is_empty() {
            Quality::NeedsOcr
        } else {
            Quality::NativeText
        };
        Ok(ExtractionResult {
            text,
            pages: None,
            headings: Vec::new(),
            tables: Vec::new(),
            quality,
        })
    }
}
