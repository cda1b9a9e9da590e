//! Minimal HTML extractor: strips markup to plain text and records
//! `<h1>`–`<h6>` headings. Deliberately not a full HTML5 parser — this
//! core has no rendering or script-execution requirement, only text and
//! heading extraction, so a small hand-rolled tag scanner keeps the
//! dependency stack aligned with the rest of the crate.

use super::Extractor;
use crate::error::{EngineError, EngineResult};
use crate::models::{ExtractionResult, Heading, Quality};

pub struct HtmlExtractor;

impl Extractor for HtmlExtractor {
    fn id(&self) -> &'static str {
        "html_v1"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["html", "htm", "xhtml"]
    }

    fn sniff(&self, bytes: &[u8]) -> bool {
        match std::str::from_utf8(bytes) {
            Ok(s) => {
                let lower = s.trim_start().to_ascii_lowercase();
                lower.starts_with("<!doctype html") || lower.starts_with("<html")
            }
            Err(_) => false,
        }
    }

    fn extract(&self, bytes: &[u8]) -> EngineResult<ExtractionResult> {
        let html = std::str::from_utf8(bytes).map_err(|e| EngineError::EncodingError {
            path: "<html>".into(),
            reason: e.to_string(),
        })?;

        let mut text = String::new();
        let mut headings = Vec::new();
        let mut chars = html.char_indices().peekable();
        let mut skip_depth_for: Option<&'static str> = None;
        let mut heading_level: Option<u8> = None;
        let mut heading_start: Option<usize> = None;

        while let Some((_, c)) = chars.next() {
            if c != '<' {
                if skip_depth_for.is_none() {
                    text.push(c);
                }
                continue;
            }

            let mut tag = String::new();
            for (_, tc) in chars.by_ref() {
                if tc == '>' {
                    break;
                }
                tag.push(tc);
            }

            let is_closing = tag.starts_with('/');
            let name: String = tag
                .trim_start_matches('/')
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_ascii_lowercase();

            match (name.as_str(), is_closing) {
                ("script", false) => skip_depth_for = Some("script"),
                ("script", true) => skip_depth_for = None,
                ("style", false) => skip_depth_for = Some("style"),
                ("style", true) => skip_depth_for = None,
                ("h1", false) | ("h2", false) | ("h3", false) | ("h4", false) | ("h5", false)
                | ("h6", false) => {
                    heading_level = name[1..].parse::<u8>().ok();
                    heading_start = Some(text.chars().count());
                }
                ("h1", true) | ("h2", true) | ("h3", true) | ("h4", true) | ("h5", true)
                | ("h6", true) => {
                    if let (Some(level), Some(start)) = (heading_level.take(), heading_start.take())
                    {
                        let title: String = text.chars().skip(start).collect::<String>();
                        let title = title.trim().to_string();
                        if !title.is_empty() {
                            headings.push(Heading {
                                title,
                                level,
                                char_offset: start,
                            });
                        }
                    }
                }
                ("br", false) | ("p", true) | ("div", true) | ("li", true) => {
                    if skip_depth_for.is_none() {
                        text.push('\n');
                    }
                }
                _ => {}
            }
        }

        Ok(ExtractionResult {
            text: decode_entities(&text),
            pages: None,
            headings,
            tables: Vec::new(),
            quality: Quality::NativeText,
        })
    }
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_keeps_text() {
        let html = "<html><body><h1>Title</h1><p>Hello &amp; world.</p></body></html>";
        let result = HtmlExtractor.extract(html.as_bytes()).unwrap();
        assert!(result.text.contains("Title"));
        assert!(result.text.contains("Hello & world."));
        assert_eq!(result.headings.len(), 1);
        assert_eq!(result.headings[0].title, "Title");
    }

    #[test]
    fn drops_script_and_style_contents() {
        let html = "<html><head><style>body{color:red}</style><script>alert(1)</script></head><body>Visible</body></html>";
        let result = HtmlExtractor.extract(html.as_bytes()).unwrap();
        assert!(!result.text.contains("alert"));
        assert!(!result.text.contains("color:red"));
        assert!(result.text.contains("Visible"));
    }
}
