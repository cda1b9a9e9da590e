//! Markdown extractor. Derives headings (`#`-prefixed lines), fenced code
//! blocks, and pipe-table spans so the chunker can treat them as atomic
//! units and build `section_path`.

use super::Extractor;
use crate::error::{EngineError, EngineResult};
use crate::models::{ExtractionResult, Heading, Quality, TableSpan};

pub struct MarkdownExtractor;

impl Extractor for MarkdownExtractor {
    fn id(&self) -> &'static str {
        "markdown_v1"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["md", "markdown", "mdx"]
    }

    fn sniff(&self, bytes: &[u8]) -> bool {
        match std::str::from_utf8(bytes) {
            Ok(s) => s.lines().take(40).any(|l| l.trim_start().starts_with('#')),
            Err(_) => false,
        }
    }

    fn extract(&self, bytes: &[u8]) -> EngineResult<ExtractionResult> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| EngineError::EncodingError {
                path: "<markdown>".into(),
                reason: e.to_string(),
            })?
            .to_string();

        let mut headings = Vec::new();
        let mut tables = Vec::new();
        let mut offset = 0usize;
        let mut in_fence = false;
        let mut table_start: Option<usize> = None;
        let mut prev_line_was_table = false;

        for line in text.split_inclusive('\n') {
            let trimmed = line.trim_end_matches('\n');
            let stripped = trimmed.trim_start();

            if stripped.starts_with("```") || stripped.starts_with("~~~") {
                in_fence = !in_fence;
            } else if !in_fence {
                if let Some(rest) = stripped.strip_prefix('#') {
                    let level = 1 + rest.chars().take_while(|c| *c == '#').count();
                    let title = rest.trim_start_matches('#').trim().to_string();
                    if !title.is_empty() && level <= 6 {
                        headings.push(Heading {
                            title,
                            level: level as u8,
                            char_offset: offset,
                        });
                    }
                }

                let looks_like_table_row = stripped.starts_with('|') && stripped.ends_with('|') && stripped.len() > 1;
                if looks_like_table_row {
                    if table_start.is_none() {
                        table_start = Some(offset);
                    }
                    prev_line_was_table = true;
                } else if prev_line_was_table {
                    if let Some(start) = table_start.take() {
                        tables.push(TableSpan {
                            char_start: start,
                            char_end: offset,
                        });
                    }
                    prev_line_was_table = false;
                }
            }

            offset += trimmed.chars().count() + 1;
        }
        if let Some(start) = table_start {
            tables.push(TableSpan {
                char_start: start,
                char_end: offset,
            });
        }

        Ok(ExtractionResult {
            text,
            pages: None,
            headings,
            tables,
            quality: Quality::NativeText,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_headings() {
        let md = "# Auth\nOAuth is a protocol.\n\n## Details\nMore text.\n";
        let result = MarkdownExtractor.extract(md.as_bytes()).unwrap();
        assert_eq!(result.headings.len(), 2);
        assert_eq!(result.headings[0].title, "Auth");
        assert_eq!(result.headings[0].level, 1);
        assert_eq!(result.headings[1].title, "Details");
        assert_eq!(result.headings[1].level, 2);
    }

    #[test]
    fn ignores_headings_inside_fences() {
        let md = "```\n# not a heading\n```\n# Real\n";
        let result = MarkdownExtractor.extract(md.as_bytes()).unwrap();
        assert_eq!(result.headings.len(), 1);
        assert_eq!(result.headings[0].title, "Real");
    }

    #[test]
    fn detects_table_span() {
        let md = "Intro\n\n| A | B |\n|---|---|\n| 1 | 2 |\n\nOutro\n";
        let result = MarkdownExtractor.extract(md.as_bytes()).unwrap();
        assert_eq!(result.tables.len(), 1);
    }
}
