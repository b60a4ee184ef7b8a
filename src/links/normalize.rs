// src/links/normalize.rs
// =============================================================================
// URL normalization and de-duplication.
//
// Marketplace sites stamp every link with tracking parameters (Daraz uses
// `spm=a2a0e.searchlist...`), so the same product page shows up under many
// different URLs. Before we compare URLs we:
// - drop the tracking query parameters (default: `spm`)
// - drop the #fragment
// - keep every other query parameter, in its original order
//
// Normalizing an already-normalized URL returns it unchanged.
// =============================================================================

use regex::Regex;
use std::collections::HashSet;
use url::Url;

// Query parameters removed when no explicit list is given
pub const DEFAULT_TRACKING_PARAMS: &[&str] = &["spm"];

// Normalizes a URL for comparison
//
// Input that doesn't parse as an absolute URL is returned trimmed but
// otherwise untouched, so callers never lose data.
//
// Example:
//   "https://www.daraz.com.np/catalog/?spm=a2a0e.x&q=phones#top"
//   -> "https://www.daraz.com.np/catalog/?q=phones"
pub fn normalize_url(raw: &str, tracking_params: &[&str]) -> String {
    let trimmed = raw.trim();
    let mut url = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(_) => return trimmed.to_string(),
    };

    url.set_fragment(None);

    // Segments are kept byte-for-byte, so surviving parameters keep their
    // original percent-encoding (and bare `flag` keys stay bare)
    let stripped = url.query().and_then(|query| {
        let segments: Vec<&str> = query.split('&').collect();
        let kept: Vec<&str> = segments
            .iter()
            .copied()
            .filter(|segment| !is_tracking_segment(segment, tracking_params))
            .collect();
        (kept.len() != segments.len()).then(|| kept.join("&"))
    });

    match stripped.as_deref() {
        Some("") => url.set_query(None),
        Some(rebuilt) => url.set_query(Some(rebuilt)),
        None => {}
    }

    url.to_string()
}

// A query segment ("key=value" or a bare "key") whose decoded key is listed
fn is_tracking_segment(segment: &str, tracking_params: &[&str]) -> bool {
    url::form_urlencoded::parse(segment.as_bytes())
        .next()
        .is_some_and(|(key, _)| tracking_params.iter().any(|p| key == *p))
}

// Removes duplicate URLs, keeping the first occurrence of each
//
// URLs are compared (and returned) in normalized form, so two links that
// differ only by a tracking parameter collapse into one.
pub fn dedupe<I, S>(urls: I, tracking_params: &[&str]) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut unique = Vec::new();

    for url in urls {
        let normalized = normalize_url(url.as_ref(), tracking_params);
        if normalized.is_empty() {
            continue;
        }
        if seen.insert(normalized.clone()) {
            unique.push(normalized);
        }
    }

    unique
}

// Keeps only the URLs the regex matches anywhere in the string
pub fn filter_matching(urls: &[String], pattern: &Regex) -> Vec<String> {
    urls.iter()
        .filter(|url| pattern.is_match(url))
        .cloned()
        .collect()
}

// Turns an href into an absolute URL
//
// Handles all three shapes we meet on product listings:
//   "/products/x-i123.html"        -> joined with the base
//   "//www.daraz.com.np/products"  -> protocol-relative, gets the base scheme
//   "https://other.com/x"          -> already absolute
//
// Returns None for non-HTTP schemes (mailto:, javascript:, ...) and garbage.
pub fn absolutize(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let joined = base.join(href).ok()?;
    match joined.scheme() {
        "http" | "https" => Some(joined),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPM: &[&str] = DEFAULT_TRACKING_PARAMS;

    #[test]
    fn test_strips_tracking_param_and_keeps_others_in_order() {
        let url = "https://www.daraz.com.np/catalog/?spm=a2a0e.searchlist.cate_6.5&q=Smartphones&from=hp_categories&src=all_channel";
        assert_eq!(
            normalize_url(url, SPM),
            "https://www.daraz.com.np/catalog/?q=Smartphones&from=hp_categories&src=all_channel"
        );
    }

    #[test]
    fn test_drops_empty_query_and_fragment() {
        let url = "https://www.daraz.com.np/products/phone-i123.html?spm=abc#reviews";
        assert_eq!(
            normalize_url(url, SPM),
            "https://www.daraz.com.np/products/phone-i123.html"
        );
    }

    #[test]
    fn test_kept_params_keep_their_encoding() {
        assert_eq!(
            normalize_url("https://shop.com/catalog/?q=smart%20phone&spm=a2a0e.1", SPM),
            "https://shop.com/catalog/?q=smart%20phone"
        );
        assert_eq!(normalize_url("https://shop.com/?flag&spm=1", SPM), "https://shop.com/?flag");
        assert_eq!(
            dedupe(
                [
                    "https://shop.com/catalog/?q=smart%20phone",
                    "https://shop.com/catalog/?q=smart%20phone&spm=a2a0e.1",
                ],
                SPM
            ),
            vec!["https://shop.com/catalog/?q=smart%20phone"]
        );
    }

    #[test]
    fn test_encoded_tracking_key_is_stripped() {
        assert_eq!(
            normalize_url("https://shop.com/?%73pm=1&page=2", SPM),
            "https://shop.com/?page=2"
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "https://example.com/a?spm=1&b=2 3&c=%2F",
            "https://example.com/?spm=x",
            "https://example.com/path#frag",
            "not a url",
            "  https://example.com/x?q=1  ",
        ];
        for input in inputs {
            let once = normalize_url(input, SPM);
            let twice = normalize_url(&once, SPM);
            assert_eq!(once, twice, "not idempotent for {input}");
        }
    }

    #[test]
    fn test_unparseable_input_is_returned_trimmed() {
        assert_eq!(normalize_url("  /relative/path ", SPM), "/relative/path");
    }

    #[test]
    fn test_dedupe_keeps_first_seen_order() {
        let urls = vec![
            "https://example.com/b?spm=1",
            "https://example.com/a",
            "https://example.com/b?spm=2",
            "https://example.com/a#top",
            "https://example.com/c",
        ];
        assert_eq!(
            dedupe(urls, SPM),
            vec![
                "https://example.com/b",
                "https://example.com/a",
                "https://example.com/c",
            ]
        );
    }

    #[test]
    fn test_dedupe_skips_blank_lines() {
        let urls = vec!["", "   ", "https://example.com/"];
        assert_eq!(dedupe(urls, SPM), vec!["https://example.com/"]);
    }

    #[test]
    fn test_filter_matching() {
        let pattern = Regex::new(r"/products/.*-i\d+.*\.html").unwrap();
        let urls = vec![
            "https://www.daraz.com.np/products/phone-i123-s456.html".to_string(),
            "https://www.daraz.com.np/catalog/?q=phones".to_string(),
        ];
        assert_eq!(
            filter_matching(&urls, &pattern),
            vec!["https://www.daraz.com.np/products/phone-i123-s456.html"]
        );
    }

    #[test]
    fn test_absolutize_shapes() {
        let base = Url::parse("https://www.daraz.com.np/catalog/?q=x").unwrap();
        assert_eq!(
            absolutize(&base, "/products/a-i1.html").unwrap().as_str(),
            "https://www.daraz.com.np/products/a-i1.html"
        );
        assert_eq!(
            absolutize(&base, "//img.example.com/p.jpg").unwrap().as_str(),
            "https://img.example.com/p.jpg"
        );
        assert_eq!(
            absolutize(&base, "https://other.com/x").unwrap().as_str(),
            "https://other.com/x"
        );
        assert!(absolutize(&base, "mailto:shop@example.com").is_none());
        assert!(absolutize(&base, "#reviews").is_none());
    }
}
