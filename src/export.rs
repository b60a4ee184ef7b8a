// src/export.rs
// =============================================================================
// Output files: CSV tables and Markdown corpora.
//
// CSV follows RFC 4180: a field is quoted when it contains a comma, a quote
// or a line break, and quotes inside it are doubled.
//
// A Markdown corpus is the scraped content of many pages in one file. Pages
// are separated by a horizontal rule ("---"); scraped fragments only by a
// blank line, so the extract step splits them back into records.
// =============================================================================

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub const SECTION_SEPARATOR: &str = "\n\n---\n\n";

// Writes a CSV file with a header row
pub fn write_csv<H: AsRef<str>>(path: &Path, header: &[H], rows: &[Vec<String>]) -> Result<()> {
    let mut out = String::new();
    push_row(&mut out, header.iter().map(|h| h.as_ref()));
    for row in rows {
        push_row(&mut out, row.iter().map(String::as_str));
    }
    fs::write(path, out).with_context(|| format!("Failed to write {}", path.display()))
}

fn push_row<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    let line: Vec<String> = fields.map(csv_escape).collect();
    out.push_str(&line.join(","));
    out.push('\n');
}

pub fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

// A page's section in a Markdown corpus: "# <url>" heading, then content
pub fn page_section(url: &str, markdown: &str) -> String {
    format!("# {}\n\n{}", url, markdown.trim())
}

// Joins sections with `separator` and writes them (truncating)
//
// Empty sections are skipped. Returns the number of sections written.
pub fn write_markdown_corpus<S: AsRef<str>>(path: &Path, sections: &[S], separator: &str) -> Result<usize> {
    let kept: Vec<&str> = sections
        .iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| !s.is_empty())
        .collect();

    let mut body = kept.join(separator);
    if !body.is_empty() {
        body.push('\n');
    }
    fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(kept.len())
}

// Cuts a string to at most `max` characters (not bytes), for previews
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
