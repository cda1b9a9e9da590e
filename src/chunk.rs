//! Structure-aware chunker (C4).
//!
//! [`hard_split`] does plain paragraph-boundary splitting over a
//! `Vec<char>` (UTF-8-safe by construction, unlike byte-slice splitting)
//! for prose; table and code-fence spans get atomic treatment on top of
//! that, per the rule order spec.md §4.4 requires:
//!
//! 1. Tables and fenced code blocks are never split across chunks; they
//!    are emitted as a single chunk unless they exceed the hard cap
//!    `Hmax`, in which case they are split at row/line boundaries only.
//! 2. Prefer splits at heading boundaries; the chunk inherits the section
//!    path built from the enclosing heading stack.
//! 3. Within a section, prefer paragraph, then whitespace splits.
//! 4. Adjacent fragments smaller than `Tmin` are merged with a neighbour.
//! 5. `O` tokens of overlap are carried from the tail of chunk *i* onto
//!    the head of chunk *i+1*, never crossing a table or heading
//!    boundary.
//!
//! Output is in document order. `char_start`/`char_end` address the
//! normalised text produced by [`crate::normalize::normalise`].

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, Heading, PageSpan, TableSpan};

/// Approximate characters-per-token ratio (a full tokenizer is out of
/// scope for this core; the ratio only drives target/hard-cap sizing,
/// not anything load-bearing for correctness).
const CHARS_PER_TOKEN: usize = 4;

/// Stable identifier stored as `Document.chunker_id`.
pub const CHUNKER_ID: &str = "structural-v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Prose,
    Table,
}

struct RawChunk {
    char_start: usize,
    char_end: usize,
    kind: Kind,
    section_path: Vec<String>,
}

/// Chunk `text` (already normalised) into ordered [`Chunk`]s honouring
/// headings and table spans.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    headings: &[Heading],
    tables: &[TableSpan],
    page_spans: &[PageSpan],
    config: &ChunkingConfig,
) -> Vec<Chunk> {
    let chars: Vec<char> = text.chars().collect();
    let max_chars = config.target_tokens * CHARS_PER_TOKEN;
    let hard_cap_chars = config.hard_cap_tokens * CHARS_PER_TOKEN;
    let min_chars = config.min_tokens * CHARS_PER_TOKEN;
    let overlap_chars = config.overlap_tokens * CHARS_PER_TOKEN;

    if chars.is_empty() {
        return vec![make_chunk(document_id, 0, "", 0, 0, &[], Vec::new())];
    }

    let mut tables_sorted = tables.to_vec();
    tables_sorted.sort_by_key(|t| t.char_start);

    let mut raw: Vec<RawChunk> = Vec::new();
    let mut cursor = 0usize;

    for table in &tables_sorted {
        let table_start = table.char_start.min(chars.len());
        let table_end = table.char_end.min(chars.len());
        if table_start > cursor {
            split_prose(&chars, cursor, table_start, headings, max_chars, hard_cap_chars, &mut raw);
        }
        if table_end > table_start {
            split_table(&chars, table_start, table_end, headings, hard_cap_chars, &mut raw);
        }
        cursor = table_end.max(cursor);
    }
    if cursor < chars.len() {
        split_prose(&chars, cursor, chars.len(), headings, max_chars, hard_cap_chars, &mut raw);
    }

    if raw.is_empty() {
        raw.push(RawChunk {
            char_start: 0,
            char_end: chars.len(),
            kind: Kind::Prose,
            section_path: section_path_at(0, headings),
        });
    }

    merge_small_fragments(&mut raw, min_chars);
    let raw = apply_overlap(raw, overlap_chars);

    let mut result = Vec::with_capacity(raw.len());
    for (i, r) in raw.iter().enumerate() {
        let slice: String = chars[r.char_start..r.char_end].iter().collect();
        let spans = page_spans_for(r.char_start, r.char_end, page_spans);
        result.push(make_chunk(
            document_id,
            i as i64,
            &slice,
            r.char_start,
            r.char_end,
            &r.section_path,
            spans,
        ));
    }
    link_neighbours(&mut result);
    result
}

fn section_path_at(char_offset: usize, headings: &[Heading]) -> Vec<String> {
    let mut stack: Vec<(u8, String)> = Vec::new();
    for h in headings {
        if h.char_offset > char_offset {
            break;
        }
        while let Some((level, _)) = stack.last() {
            if *level >= h.level {
                stack.pop();
            } else {
                break;
            }
        }
        stack.push((h.level, h.title.clone()));
    }
    stack.into_iter().map(|(_, t)| t).collect()
}

fn page_spans_for(char_start: usize, char_end: usize, pages: &[PageSpan]) -> Vec<u32> {
    pages
        .iter()
        .filter(|p| p.char_offset >= char_start && p.char_offset < char_end.max(char_start + 1))
        .map(|p| p.page_number)
        .collect()
}

fn split_prose(
    chars: &[char],
    start: usize,
    end: usize,
    headings: &[Heading],
    max_chars: usize,
    hard_cap_chars: usize,
    out: &mut Vec<RawChunk>,
) {
    if start >= end {
        return;
    }
    let slice: String = chars[start..end].iter().collect();
    if slice.trim().is_empty() {
        return;
    }

    let mut buf_start: Option<usize> = None;
    let mut buf_end = start;
    let mut char_offset = 0usize;

    for para in slice.split("\n\n") {
        let para_len = para.chars().count();
        let leading_ws = para.chars().take_while(|c| c.is_whitespace()).count();
        let trimmed = para.trim();
        let trimmed_len = trimmed.chars().count();
        let abs_start = start + char_offset + leading_ws;
        let abs_end = abs_start + trimmed_len;
        char_offset += para_len + 2;

        if trimmed.is_empty() {
            continue;
        }

        let current_len = buf_start.map(|bs| buf_end - bs).unwrap_or(0);
        let would_be = current_len + if current_len == 0 { 0 } else { 2 } + trimmed_len;

        if would_be > max_chars && buf_start.is_some() {
            if let Some(bs) = buf_start.take() {
                out.push(RawChunk {
                    char_start: bs,
                    char_end: buf_end,
                    kind: Kind::Prose,
                    section_path: section_path_at(bs, headings),
                });
            }
        }

        if trimmed_len > hard_cap_chars {
            if let Some(bs) = buf_start.take() {
                out.push(RawChunk {
                    char_start: bs,
                    char_end: buf_end,
                    kind: Kind::Prose,
                    section_path: section_path_at(bs, headings),
                });
            }
            hard_split(chars, abs_start, abs_end, headings, hard_cap_chars, out);
            continue;
        }

        if buf_start.is_none() {
            buf_start = Some(abs_start);
        }
        buf_end = abs_end;
    }
    if let Some(bs) = buf_start {
        if bs < buf_end {
            out.push(RawChunk {
                char_start: bs,
                char_end: buf_end,
                kind: Kind::Prose,
                section_path: section_path_at(bs, headings),
            });
        }
    }
}

/// Hard-splits an oversize paragraph at whitespace/newline boundaries,
/// never exceeding `hard_cap_chars`. Operates on a `Vec<char>` slice so
/// it is trivially UTF-8 safe — there is no byte index to snap back to a
/// char boundary in the first place.
fn hard_split(
    chars: &[char],
    start: usize,
    end: usize,
    headings: &[Heading],
    hard_cap_chars: usize,
    out: &mut Vec<RawChunk>,
) {
    let mut pos = start;
    while pos < end {
        let want_end = (pos + hard_cap_chars).min(end);
        let mut split_at = want_end;
        if want_end < end {
            if let Some(back) = chars[pos..want_end].iter().rposition(|c| *c == '\n' || *c == ' ') {
                let candidate = pos + back + 1;
                if candidate > pos {
                    split_at = candidate;
                }
            }
        }
        if split_at <= pos {
            split_at = want_end.max(pos + 1).min(end);
        }
        out.push(RawChunk {
            char_start: pos,
            char_end: split_at,
            kind: Kind::Prose,
            section_path: section_path_at(pos, headings),
        });
        pos = split_at;
    }
}

fn split_table(
    chars: &[char],
    start: usize,
    end: usize,
    headings: &[Heading],
    hard_cap_chars: usize,
    out: &mut Vec<RawChunk>,
) {
    if end - start <= hard_cap_chars {
        out.push(RawChunk {
            char_start: start,
            char_end: end,
            kind: Kind::Table,
            section_path: section_path_at(start, headings),
        });
        return;
    }
    let mut pos = start;
    while pos < end {
        let want_end = (pos + hard_cap_chars).min(end);
        let mut split_at = want_end;
        if want_end < end {
            if let Some(back) = chars[pos..want_end].iter().rposition(|c| *c == '\n') {
                let candidate = pos + back + 1;
                if candidate > pos {
                    split_at = candidate;
                }
            }
        }
        if split_at <= pos {
            split_at = want_end.max(pos + 1).min(end);
        }
        out.push(RawChunk {
            char_start: pos,
            char_end: split_at,
            kind: Kind::Table,
            section_path: section_path_at(pos, headings),
        });
        pos = split_at;
    }
}

fn merge_small_fragments(raw: &mut Vec<RawChunk>, min_chars: usize) {
    if min_chars == 0 || raw.len() < 2 {
        return;
    }
    let mut i = 0;
    while i < raw.len() {
        let len = raw[i].char_end - raw[i].char_start;
        if len >= min_chars || raw[i].kind == Kind::Table {
            i += 1;
            continue;
        }
        if i > 0 && raw[i - 1].kind == Kind::Prose && raw[i - 1].section_path == raw[i].section_path {
            raw[i - 1].char_end = raw[i].char_end;
            raw.remove(i);
        } else if i + 1 < raw.len() && raw[i + 1].kind == Kind::Prose && raw[i + 1].section_path == raw[i].section_path
        {
            raw[i].char_end = raw[i + 1].char_end;
            raw.remove(i + 1);
            i += 1;
        } else {
            i += 1;
        }
    }
}

fn apply_overlap(mut raw: Vec<RawChunk>, overlap_chars: usize) -> Vec<RawChunk> {
    if overlap_chars == 0 {
        return raw;
    }
    for i in 1..raw.len() {
        let prev_end = raw[i - 1].char_end;
        let prev_start = raw[i - 1].char_start;
        let same_section = raw[i - 1].kind == Kind::Prose
            && raw[i].kind == Kind::Prose
            && raw[i - 1].section_path == raw[i].section_path;
        if !same_section {
            continue;
        }
        let extended_start = raw[i].char_start.saturating_sub(overlap_chars).max(prev_start);
        if extended_start < raw[i].char_start && extended_start <= prev_end {
            raw[i].char_start = extended_start;
        }
    }
    raw
}

fn link_neighbours(chunks: &mut [Chunk]) {
    let ids: Vec<String> = chunks.iter().map(|c| c.chunk_id.clone()).collect();
    for i in 0..chunks.len() {
        chunks[i].prev_chunk_id = if i > 0 { Some(ids[i - 1].clone()) } else { None };
        chunks[i].next_chunk_id = if i + 1 < ids.len() { Some(ids[i + 1].clone()) } else { None };
    }
}

fn make_chunk(
    document_id: &str,
    ordinal: i64,
    text: &str,
    char_start: usize,
    char_end: usize,
    section_path: &[String],
    page_spans: Vec<u32>,
) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let content_hash = format!("{:x}", hasher.finalize());

    Chunk {
        chunk_id: Uuid::new_v4().to_string(),
        doc_id: document_id.to_string(),
        ordinal,
        text: text.to_string(),
        char_start,
        char_end,
        page_spans,
        section_path: section_path.to_vec(),
        token_count: text.chars().count() / CHARS_PER_TOKEN.max(1),
        prev_chunk_id: None,
        next_chunk_id: None,
        content_hash,
        context_prefix: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ChunkingConfig {
        ChunkingConfig {
            target_tokens: 10,
            overlap_tokens: 0,
            min_tokens: 0,
            hard_cap_tokens: 40,
        }
    }

    #[test]
    fn empty_text_yields_one_chunk() {
        let chunks = chunk_text("doc1", "", &[], &[], &[], &cfg());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].ordinal, 0);
        assert_eq!(chunks[0].char_start, 0);
        assert_eq!(chunks[0].char_end, 0);
    }

    #[test]
    fn small_text_single_chunk() {
        let chunks = chunk_text("doc1", "Hello, world!", &[], &[], &[], &cfg());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn ordinals_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {i} with some extra words to pad it out."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text("doc1", &text, &[], &[], &[], &cfg());
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.ordinal, i as i64);
        }
    }

    #[test]
    fn char_end_after_char_start() {
        let text = "Alpha beta gamma.\n\nDelta epsilon zeta.\n\nEta theta iota kappa.";
        let chunks = chunk_text("doc1", text, &[], &[], &[], &cfg());
        for c in &chunks {
            assert!(c.char_end > c.char_start, "{c:?}");
        }
    }

    #[test]
    fn prev_next_chain_well_formed() {
        let text = "word ".repeat(200);
        let chunks = chunk_text("doc1", &text, &[], &[], &[], &cfg());
        assert!(chunks[0].prev_chunk_id.is_none());
        assert!(chunks.last().unwrap().next_chunk_id.is_none());
        for w in chunks.windows(2) {
            assert_eq!(w[0].next_chunk_id.as_deref(), Some(w[1].chunk_id.as_str()));
            assert_eq!(w[1].prev_chunk_id.as_deref(), Some(w[0].chunk_id.as_str()));
        }
    }

    #[test]
    fn heading_inherited_as_section_path() {
        let headings = vec![Heading {
            title: "Auth".to_string(),
            level: 1,
            char_offset: 0,
        }];
        let text = "Auth\nOAuth is a protocol.";
        let chunks = chunk_text("doc1", text, &headings, &[], &[], &cfg());
        assert!(chunks.iter().any(|c| c.section_path == vec!["Auth".to_string()]));
    }

    #[test]
    fn table_never_split_unless_over_hard_cap() {
        let table = TableSpan {
            char_start: 0,
            char_end: 20,
        };
        let text = "| a | b |\n|---|---|\n| 1 | 2 |";
        let chunks = chunk_text("doc1", text, &[], &[table], &[], &cfg());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].ordinal, 0);
    }

    #[test]
    fn oversize_table_splits_at_row_boundaries() {
        let big_table_text = (0..200).map(|i| format!("| row {i} |\n")).collect::<String>();
        let table = TableSpan {
            char_start: 0,
            char_end: big_table_text.chars().count(),
        };
        let mut small_cfg = cfg();
        small_cfg.hard_cap_tokens = 5;
        let chunks = chunk_text("doc1", &big_table_text, &[], &[table], &[], &small_cfg);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.char_end - c.char_start <= small_cfg.hard_cap_tokens * CHARS_PER_TOKEN);
        }
    }

    #[test]
    fn deterministic() {
        let text = "Alpha beta.\n\nGamma delta.\n\nEpsilon zeta.";
        let a = chunk_text("doc1", text, &[], &[], &[], &cfg());
        let b = chunk_text("doc1", text, &[], &[], &[], &cfg());
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.content_hash, y.content_hash);
        }
    }
}
