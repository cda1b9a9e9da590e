//! Extractor Registry (C2): dispatches a file to a format-specific text
//! extractor and returns normalised text plus structural hints.
//!
//! Extractors are a capability set (spec.md §9 "capability polymorphism"):
//! each format variant implements [`Extractor`] and is registered at
//! construction time with [`ExtractorRegistry::with_builtins`]. Dispatch is
//! by file extension first, falling back to a short byte-magic probe when
//! the extension is missing or ambiguous; on total failure the registry
//! returns [`EngineError::UnsupportedFormat`].
//!
//! Extractors must not mutate their input and must be deterministic for
//! the same bytes — callers may cache results keyed by content hash.

mod html;
mod markdown;
mod office;
mod pdf;
mod plain_text;

use std::path::Path;

use crate::error::{EngineError, EngineResult};
use crate::models::ExtractionResult;

/// A format-specific text extractor.
pub trait Extractor: Send + Sync {
    /// Stable identifier stored as `Document.extractor_id`.
    fn id(&self) -> &'static str;
    /// File extensions (lowercase, no leading dot) this extractor claims
    /// by default.
    fn extensions(&self) -> &'static [&'static str];
    /// Returns `true` if the leading bytes of the file look like this
    /// extractor's format, used when the extension is missing or unknown.
    fn sniff(&self, bytes: &[u8]) -> bool;
    /// Extract text and structural hints from `bytes`.
    fn extract(&self, bytes: &[u8]) -> EngineResult<ExtractionResult>;
}

/// Dispatches files to the registered [`Extractor`] implementations.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// A registry with every built-in extractor registered, in the order
    /// they are tried for extension-less or ambiguous files.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register(Box::new(pdf::PdfExtractor));
        reg.register(Box::new(office::DocxExtractor));
        reg.register(Box::new(office::PptxExtractor));
        reg.register(Box::new(office::XlsxExtractor));
        reg.register(Box::new(markdown::MarkdownExtractor));
        reg.register(Box::new(html::HtmlExtractor));
        reg.register(Box::new(plain_text::PlainTextExtractor));
        reg
    }

    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        self.extractors.push(extractor);
    }

    /// Select by extension, falling back to the byte-magic probe; extract
    /// on the winner. Fails with [`EngineError::UnsupportedFormat`] if no
    /// extractor claims the file either way.
    pub fn extract(&self, path: &Path, bytes: &[u8]) -> EngineResult<ExtractionResult> {
        self.extract_with_id(path, bytes).map(|(_, result)| result)
    }

    /// Same dispatch as [`Self::extract`], but also returns the winning
    /// extractor's stable id, for [`Document::extractor_id`](crate::models::Document::extractor_id)
    /// provenance.
    pub fn extract_with_id(&self, path: &Path, bytes: &[u8]) -> EngineResult<(&'static str, ExtractionResult)> {
        let extractor = self.select(path, bytes)?;
        Ok((extractor.id(), extractor.extract(bytes)?))
    }

    fn select(&self, path: &Path, bytes: &[u8]) -> EngineResult<&dyn Extractor> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        if let Some(ext) = &ext {
            if let Some(extractor) = self
                .extractors
                .iter()
                .find(|e| e.extensions().contains(&ext.as_str()))
            {
                return Ok(extractor.as_ref());
            }
        }

        if let Some(extractor) = self.extractors.iter().find(|e| e.sniff(bytes)) {
            return Ok(extractor.as_ref());
        }

        Err(EngineError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: match ext {
                Some(ext) => format!("no extractor registered for .{ext} and byte probe found no match"),
                None => "no file extension and byte probe found no match".to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_extension_and_content_is_unsupported() {
        let reg = ExtractorRegistry::with_builtins();
        let err = reg
            .extract(Path::new("mystery.bin"), &[0xDE, 0xAD, 0xBE, 0xEF])
            .unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedFormat { .. }));
    }

    #[test]
    fn plain_text_by_extension() {
        let reg = ExtractorRegistry::with_builtins();
        let result = reg.extract(Path::new("notes.txt"), b"hello world").unwrap();
        assert_eq!(result.text, "hello world");
    }

    #[test]
    fn markdown_by_sniff_without_extension() {
        let reg = ExtractorRegistry::with_builtins();
        let result = reg
            .extract(Path::new("README"), b"# Title\n\nBody text.")
            .unwrap();
        assert_eq!(result.headings[0].title, "Title");
    }
}
