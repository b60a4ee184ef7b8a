// src/links/list.rs
// =============================================================================
// Plain-text URL list files (one URL per line).
//
// These files are how the crawl and scrape steps hand work to each other:
// `crawl --urls-out filtered_urls.txt` writes them, `scrape --input ...`
// reads them. The "seen" variant is append-only, so a crawl can be re-run
// and only new URLs get added.
// =============================================================================

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use url::Url;

use super::normalize::{absolutize, normalize_url};
use crate::extract::{extract_absolute_html_links, extract_html_links, extract_markdown_links};

// Reads a URL list: trimmed, non-blank lines, in file order
pub fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read URL list {}", path.display()))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

// Writes (truncates) a URL list
pub fn write_url_list(path: &Path, urls: &[String]) -> Result<()> {
    let mut body = urls.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    fs::write(path, body).with_context(|| format!("Failed to write URL list {}", path.display()))
}

// Appends URLs that aren't in the file yet
//
// Comparison uses normalized URLs, both for what's already in the file and
// for duplicates inside `urls` itself. Existing lines are never rewritten.
//
// Returns how many lines were appended.
pub fn append_new_urls(path: &Path, urls: &[String], tracking_params: &[&str]) -> Result<usize> {
    let mut seen: HashSet<String> = if path.exists() {
        read_url_list(path)?
            .iter()
            .map(|u| normalize_url(u, tracking_params))
            .collect()
    } else {
        HashSet::new()
    };

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {} for appending", path.display()))?;

    let mut appended = 0;
    for url in urls {
        let normalized = normalize_url(url, tracking_params);
        if normalized.is_empty() || !seen.insert(normalized.clone()) {
            continue;
        }
        writeln!(file, "{}", normalized)?;
        appended += 1;
    }

    Ok(appended)
}

// Pulls every link out of a scraped document
//
// HTML documents go through the CSS-selector extractor; anything else is
// treated as Markdown. Relative links are resolved against `base` when one
// is given (Markdown relative links are dropped without a base).
pub fn collect_links(document: &str, base: Option<&Url>) -> Vec<String> {
    if looks_like_html(document) {
        return match base {
            Some(base) => extract_html_links(document, base.as_str()),
            None => extract_absolute_html_links(document),
        };
    }

    let mut links = extract_markdown_links(document);
    if let Some(base) = base {
        // Markdown can also carry relative links: [Phone](/products/p-i1.html)
        for raw in relative_markdown_links(document) {
            if let Some(url) = absolutize(base, &raw) {
                links.push(url.to_string());
            }
        }
    }
    links
}

fn looks_like_html(document: &str) -> bool {
    let head = document.trim_start().to_ascii_lowercase();
    head.starts_with("<!doctype html")
        || head.starts_with("<html")
        || head.starts_with("<div")
        || head.starts_with("<table")
        || head.starts_with("<!--")
}

// Markdown links whose destination is not already absolute
fn relative_markdown_links(markdown: &str) -> Vec<String> {
    use pulldown_cmark::{Event, Parser, Tag};

    Parser::new(markdown)
        .filter_map(|event| match event {
            Event::Start(Tag::Link(_, dest, _)) => {
                let dest = dest.to_string();
                if dest.starts_with('/') || dest.starts_with("./") || dest.starts_with("../") {
                    Some(dest)
                } else {
                    None
                }
            }
            _ => None,
        })
        .collect()
}
