//! OOXML (DOCX/PPTX/XLSX) extractors: streaming `quick_xml` parses over
//! bounded ZIP entry reads, which is also the zip-bomb defence (a single
//! entry cannot balloon past `MAX_XML_ENTRY_BYTES` regardless of its
//! compressed size).

use std::io::Read;

use super::Extractor;
use crate::error::{EngineError, EngineResult};
use crate::models::{ExtractionResult, Quality};

/// Maximum sheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

fn ooxml_err(path: &'static str, e: impl std::fmt::Display) -> EngineError {
    EngineError::ExtractionFailed {
        path: path.into(),
        reason: e.to_string(),
    }
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> EngineResult<Vec<u8>> {
    let entry = archive.by_name(name).map_err(|e| ooxml_err("<office>", e))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ooxml_err("<office>", e))?;
    if out.len() as u64 >= max_bytes {
        return Err(EngineError::SizeExceeded {
            path: name.into(),
            limit: max_bytes,
        });
    }
    Ok(out)
}

fn extract_tag_text(xml: &[u8], tag: &[u8]) -> EngineResult<String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == tag {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf) {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ooxml_err("<office>", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

pub struct DocxExtractor;

impl Extractor for DocxExtractor {
    fn id(&self) -> &'static str {
        "docx_v1"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["docx"]
    }
    fn sniff(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(b"PK\x03\x04")
    }
    fn extract(&self, bytes: &[u8]) -> EngineResult<ExtractionResult> {
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ooxml_err("<docx>", e))?;
        let doc_xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
        let text = extract_tag_text(&doc_xml, b"t")?;
        Ok(ExtractionResult {
            text,
            pages: None,
            headings: Vec::new(),
            tables: Vec::new(),
            quality: Quality::NativeText,
        })
    }
}

pub struct PptxExtractor;

impl Extractor for PptxExtractor {
    fn id(&self) -> &'static str {
        "pptx_v1"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["pptx"]
    }
    fn sniff(&self, _bytes: &[u8]) -> bool {
        false
    }
    fn extract(&self, bytes: &[u8]) -> EngineResult<ExtractionResult> {
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ooxml_err("<pptx>", e))?;
        let mut slide_names: Vec<String> = archive
            .file_names()
            .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
            .map(|s| s.to_string())
            .collect();
        slide_names.sort_by_key(|name| {
            name.trim_start_matches("ppt/slides/slide")
                .trim_end_matches(".xml")
                .parse::<u32>()
                .unwrap_or(u32::MAX)
        });
        let mut out = String::new();
        for name in slide_names {
            let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
            let text = extract_tag_text(&xml, b"t")?;
            if !out.is_empty() && !text.is_empty() {
                out.push(' ');
            }
            out.push_str(&text);
        }
        Ok(ExtractionResult {
            text: out,
            pages: None,
            headings: Vec::new(),
            tables: Vec::new(),
            quality: Quality::NativeText,
        })
    }
}

pub struct XlsxExtractor;

impl Extractor for XlsxExtractor {
    fn id(&self) -> &'static str {
        "xlsx_v1"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["xlsx"]
    }
    fn sniff(&self, _bytes: &[u8]) -> bool {
        false
    }
    fn extract(&self, bytes: &[u8]) -> EngineResult<ExtractionResult> {
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ooxml_err("<xlsx>", e))?;
        let shared_strings = read_shared_strings(&mut archive)?;
        let mut sheet_names: Vec<String> = archive
            .file_names()
            .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
            .map(|s| s.to_string())
            .collect();
        sheet_names.sort_by_key(|name| {
            name.trim_start_matches("xl/worksheets/sheet")
                .trim_end_matches(".xml")
                .parse::<u32>()
                .unwrap_or(u32::MAX)
        });

        let mut out = String::new();
        let mut tables = Vec::new();
        for (idx, name) in sheet_names.into_iter().take(XLSX_MAX_SHEETS).enumerate() {
            let sheet_xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
            let start = out.chars().count();
            let cell_texts = extract_xlsx_sheet_cells(&sheet_xml, &shared_strings)?;
            if idx > 0 && !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&cell_texts);
            tables.push(crate::models::TableSpan {
                char_start: start,
                char_end: out.chars().count(),
            });
        }
        Ok(ExtractionResult {
            text: out,
            pages: None,
            headings: Vec::new(),
            tables,
            quality: Quality::NativeText,
        })
    }
}

fn read_shared_strings(archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>) -> EngineResult<Vec<String>> {
    if !archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = true;
                } else if in_si && e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf) {
                        strings.push(te.unescape().unwrap_or_default().into_owned());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ooxml_err("<xlsx>", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn extract_xlsx_sheet_cells(xml: &[u8], shared_strings: &[String]) -> EngineResult<String> {
    let mut cells: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_v = false;
    let mut cell_is_shared_str = false;
    let mut cell_count = 0usize;
    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"c" {
                    cell_is_shared_str = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                } else if e.local_name().as_ref() == b"v" {
                    in_v = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_v => {
                let v = te.unescape().unwrap_or_default();
                let s = v.trim();
                if !s.is_empty() && cell_is_shared_str {
                    if let Ok(i) = s.parse::<usize>() {
                        if i < shared_strings.len() {
                            cells.push(shared_strings[i].clone());
                            cell_count += 1;
                        }
                    }
                }
                in_v = false;
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"v" {
                    in_v = false;
                } else if e.local_name().as_ref() == b"c" {
                    cell_is_shared_str = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ooxml_err("<xlsx>", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(cells.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_zip_fails_docx_extraction() {
        let err = DocxExtractor.extract(b"not a zip").unwrap_err();
        assert!(matches!(err, EngineError::ExtractionFailed { .. }));
    }
}
