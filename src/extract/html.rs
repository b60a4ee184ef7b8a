// src/extract/html.rs
// =============================================================================
// DOM queries over scraped HTML.
//
// We use the `scraper` crate which:
// - Parses HTML into a DOM (Document Object Model)
// - Supports CSS selectors for finding elements
// - Is built on html5ever (Mozilla's HTML parser)
//
// scraper's tree is read-only, so every "edit" here (dropping <script>,
// rewriting <img src>) works on the serialized HTML: we serialize the
// element, build the replacement string, and swap it into the serialized
// document. Both sides come from the same serializer, so they line up.
//
// Rust concepts:
// - Result<T, E>: For operations that can fail
// - Iterators: For processing collections
// - Closures: Anonymous functions (|x| ...)
// =============================================================================

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::warn;
use url::Url;

// Elements that never carry content we want to send to the LLM
const NOISE_TAGS: &[&str] = &["script", "style", "svg", "noscript"];

// Attributes lazy-loading scripts park the real image URL in
const LAZY_SRC_ATTRS: &[&str] = &["data-src", "data-lazy-src", "data-original"];

// Extracts all links from HTML content
//
// Parameters:
//   html: the HTML content to parse (borrowed as &str)
//   base_url: the URL of the page (for resolving relative links)
//
// Returns: Vec<String> containing all absolute http(s) URLs found, in
// document order
pub fn extract_html_links(html: &str, base_url: &str) -> Vec<String> {
    let mut links = Vec::new();

    let base = match Url::parse(base_url) {
        Ok(url) => url,
        Err(_) => {
            warn!("Invalid base URL: {}", base_url);
            return links;
        }
    };

    let document = Html::parse_document(html);

    // Selector::parse only fails on malformed selectors; this one is a
    // constant and known to be valid
    let selector = Selector::parse("a[href]").unwrap();

    for element in document.select(&selector) {
        if let Some(href) = element.value().attr("href") {
            if let Some(absolute_url) = resolve_url(&base, href) {
                if is_http_link(&absolute_url) {
                    links.push(absolute_url);
                }
            }
        }
    }

    links
}

// Same as extract_html_links, but with no page URL to resolve against:
// only hrefs that are already absolute http(s) URLs are kept
pub fn extract_absolute_html_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").unwrap();

    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| Url::parse(href.trim()).ok())
        .map(|url| url.to_string())
        .filter(|url| is_http_link(url))
        .collect()
}

// Returns the outer HTML of every element matching a CSS selector
//
// Example: select_fragments(html, "div.Ms6aG") returns each product card.
// An invalid selector is reported as an error (it usually comes from a CLI
// flag, so it's user input).
pub fn select_fragments(html: &str, css: &str) -> Result<Vec<String>> {
    let selector = parse_selector(css)?;
    let document = Html::parse_document(html);
    Ok(document.select(&selector).map(|el| el.html()).collect())
}

// The <title> text of a page, trimmed; None when absent or blank
pub fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").unwrap();
    document
        .select(&selector)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|title| !title.is_empty())
}

// Decodes HTML entities that show up when markup was stored escaped
// (e.g. `&lt;table&gt;` or `&#60;table&#62;` in a scraped markdown file)
//
// One pass over the text, so "&amp;lt;" decodes to "&lt;", not "<".
// Unknown names and invalid code points are left as written.
pub fn decode_entities(text: &str) -> String {
    let entity = Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|lt|gt|quot|apos|amp|nbsp);")
        .unwrap();

    entity
        .replace_all(text, |caps: &regex::Captures| {
            let name = &caps[1];
            let decoded = match name {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "amp" => Some('&'),
                "nbsp" => Some('\u{a0}'),
                _ => {
                    let code = match name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => name[1..].parse::<u32>().ok(),
                    };
                    code.and_then(char::from_u32)
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

// Decodes entities and removes <script>, <style>, <svg> and <noscript>
// elements (with their content)
//
// Noise nodes are detached from the tree before serializing, so noise
// nested inside other noise goes too.
pub fn clean_html(html: &str) -> String {
    let decoded = decode_entities(html);
    let mut document = Html::parse_document(&decoded);
    let selector = Selector::parse(&NOISE_TAGS.join(", ")).unwrap();

    let noise: Vec<_> = document.select(&selector).map(|el| el.id()).collect();
    for id in noise {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    document.root_element().html()
}

// Returns the outer HTML of every <table>, nested tables included
//
// A nested table appears twice: once inside its parent and once on its own.
// That matches how the table prompt asks the model to treat them.
pub fn extract_tables(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("table").unwrap();
    document.select(&selector).map(|el| el.html()).collect()
}

// Rewrites the <img> tags in a scraped fragment so the images survive
// outside the original page:
// 1. Lazy-loaded images: data-src / data-lazy-src / data-original -> src
// 2. Protocol-relative "//cdn/x.jpg" -> "https://cdn/x.jpg"
// 3. Root-relative "/x.jpg" -> resolved against the page URL
// 4. Inline "data:image/...;base64," payloads are decoded and written to
//    `image_dir`; src then points at the saved file
//
// Images that fail to decode keep their original src (and we log a warning).
pub fn fix_images(fragment: &str, base_url: &Url, image_dir: &Path) -> Result<String> {
    let parsed = Html::parse_fragment(fragment);
    let mut result = parsed.root_element().inner_html();
    let selector = Selector::parse("img").unwrap();
    let src_attr = Regex::new(r#"(\s)src="[^"]*""#).unwrap();

    for img in parsed.select(&selector) {
        let original_tag = img.html();
        let Some(new_src) = resolve_image_src(&img, base_url, image_dir) else {
            continue;
        };

        let escaped = escape_attr(&new_src);
        let new_tag = if img.value().attr("src").is_some() {
            src_attr
                .replacen(&original_tag, 1, |caps: &regex::Captures| {
                    format!(r#"{}src="{}""#, &caps[1], escaped)
                })
                .into_owned()
        } else {
            original_tag.replacen("<img", &format!(r#"<img src="{}""#, escaped), 1)
        };

        result = result.replacen(&original_tag, &new_tag, 1);
    }

    Ok(result)
}

// Works out what an <img>'s src should become; None = leave it alone
fn resolve_image_src(img: &ElementRef, base_url: &Url, image_dir: &Path) -> Option<String> {
    let element = img.value();
    let current = element.attr("src").map(str::to_string);

    let mut src = LAZY_SRC_ATTRS
        .iter()
        .find_map(|attr| element.attr(attr).filter(|v| !v.is_empty()))
        .map(str::to_string)
        .or_else(|| current.clone());

    if let Some(value) = src.clone() {
        if value.starts_with("//") {
            src = Some(format!("https:{}", value));
        } else if value.starts_with('/') {
            src = base_url.join(&value).ok().map(|u| u.to_string()).or(src);
        }
    }

    if let Some(value) = src.clone() {
        if value.starts_with("data:image") {
            match save_inline_image(&value, image_dir) {
                Ok(path) => src = Some(path),
                Err(e) => {
                    warn!("Failed to process base64 image: {:#}", e);
                    src = current.clone();
                }
            }
        }
    }

    src.filter(|s| Some(s) != current.as_ref())
}

// Decodes a data:image URI and writes it to `<image_dir>/<sha256-prefix>.png`
//
// The file name is derived from the payload, so the same image scraped
// twice lands in the same file.
fn save_inline_image(data_uri: &str, image_dir: &Path) -> Result<String> {
    let (_, encoded) = data_uri
        .split_once(',')
        .ok_or_else(|| anyhow!("data URI has no payload"))?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .context("invalid base64 payload")?;

    let digest = Sha256::digest(encoded.as_bytes());
    let name: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();

    fs::create_dir_all(image_dir)
        .with_context(|| format!("Failed to create {}", image_dir.display()))?;
    let path = image_dir.join(format!("{}.png", name));
    fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(path.to_string_lossy().replace('\\', "/"))
}

pub(crate) fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid CSS selector '{}': {:?}", css, e))
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

// Resolves a possibly-relative URL to an absolute URL
//
// Examples:
//   base = "https://example.com/page"
//   href = "/docs" -> Some("https://example.com/docs")
//   href = "https://other.com" -> Some("https://other.com/")
fn resolve_url(base: &Url, href: &str) -> Option<String> {
    match Url::parse(href) {
        Ok(url) => Some(url.to_string()),
        Err(_) => base.join(href).ok().map(|url| url.to_string()),
    }
}

// We skip mailto:, tel:, javascript:, data: and file: links
fn is_http_link(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
