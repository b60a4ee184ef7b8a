// src/crawl/filter.rs
// =============================================================================
// URL filters for the deep crawler.
//
// A filter decides whether a discovered URL is worth fetching. Filters are
// combined in a FilterChain where every filter must agree. The start URL
// is never filtered: the user asked for it explicitly.
//
// ContentTypeFilter gets two chances to reject: before the fetch (guessing
// the type from the URL's extension) and after it (from the response's
// Content-Type header).
// =============================================================================

use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;
use url::Url;

pub trait UrlFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn allows(&self, url: &Url) -> bool;

    // Checked once the page is fetched; most filters don't care
    fn allows_response(&self, _content_type: Option<&str>) -> bool {
        true
    }
}

// Restricts the crawl to (or away from) a set of domains
//
// "python.org" matches "python.org" and "docs.python.org" but not
// "notpython.org". An empty allowed list allows any host.
#[derive(Debug, Clone, Default)]
pub struct DomainFilter {
    allowed: Vec<String>,
    blocked: Vec<String>,
}

impl DomainFilter {
    pub fn new<S: AsRef<str>>(allowed: &[S], blocked: &[S]) -> Self {
        Self {
            allowed: allowed.iter().map(|d| normalize_domain(d.as_ref())).collect(),
            blocked: blocked.iter().map(|d| normalize_domain(d.as_ref())).collect(),
        }
    }
}

fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_matches('.').to_lowercase()
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

impl UrlFilter for DomainFilter {
    fn name(&self) -> &'static str {
        "domain"
    }

    fn allows(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_lowercase();

        if self.blocked.iter().any(|d| host_matches(&host, d)) {
            return false;
        }
        self.allowed.is_empty() || self.allowed.iter().any(|d| host_matches(&host, d))
    }
}

// Wildcard patterns over the full URL, e.g. "*tutorial*"
//
// `*` matches any run of characters; everything else is literal. A URL
// passes when any pattern matches.
#[derive(Debug, Clone)]
pub struct UrlPatternFilter {
    patterns: Vec<Regex>,
}

impl UrlPatternFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| wildcard_to_regex(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }
}

fn wildcard_to_regex(pattern: &str) -> Result<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{}$", body))
        .with_context(|| format!("Invalid URL pattern '{}'", pattern))
}

impl UrlFilter for UrlPatternFilter {
    fn name(&self) -> &'static str {
        "url-pattern"
    }

    fn allows(&self, url: &Url) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|re| re.is_match(url.as_str()))
    }
}

// Only follow URLs of the given MIME types (e.g. "text/html")
//
// An allowed entry ending in "/*" matches the whole family ("image/*").
#[derive(Debug, Clone)]
pub struct ContentTypeFilter {
    allowed_types: Vec<String>,
}

impl ContentTypeFilter {
    pub fn new<S: AsRef<str>>(allowed_types: &[S]) -> Self {
        Self {
            allowed_types: allowed_types
                .iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .collect(),
        }
    }

    fn type_allowed(&self, mime: &str) -> bool {
        self.allowed_types.iter().any(|allowed| match allowed.strip_suffix("/*") {
            Some(family) => mime.split('/').next() == Some(family),
            None => allowed == mime,
        })
    }
}

impl UrlFilter for ContentTypeFilter {
    fn name(&self) -> &'static str {
        "content-type"
    }

    fn allows(&self, url: &Url) -> bool {
        self.allowed_types.is_empty() || self.type_allowed(guess_mime(url))
    }

    fn allows_response(&self, content_type: Option<&str>) -> bool {
        let Some(content_type) = content_type else {
            return true;
        };
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        self.allowed_types.is_empty() || mime.is_empty() || self.type_allowed(&mime)
    }
}

// MIME type implied by the extension of the URL's last path segment
//
// No extension means a regular page: text/html.
pub fn guess_mime(url: &Url) -> &'static str {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();

    let Some((_, ext)) = last.rsplit_once('.') else {
        return "text/html";
    };

    match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" | "xhtml" | "php" | "asp" | "aspx" | "jsp" | "shtml" => "text/html",
        "txt" => "text/plain",
        "css" => "text/css",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "js" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" | "tgz" => "application/gzip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

// All filters must pass; an empty chain passes everything
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn UrlFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F: UrlFilter + 'static>(mut self, filter: F) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn allows(&self, url: &Url) -> bool {
        match self.filters.iter().find(|f| !f.allows(url)) {
            Some(filter) => {
                debug!(filter = filter.name(), "Filtered out {}", url);
                false
            }
            None => true,
        }
    }

    pub fn allows_response(&self, url: &str, content_type: Option<&str>) -> bool {
        match self.filters.iter().find(|f| !f.allows_response(content_type)) {
            Some(filter) => {
                debug!(filter = filter.name(), "Filtered out {} after fetch", url);
                false
            }
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_domain_filter_matches_subdomains() {
        let filter = DomainFilter::new(&["python.org"], &["bugs.python.org"]);
        assert!(filter.allows(&url("https://python.org/")));
        assert!(filter.allows(&url("https://docs.python.org/3/")));
        assert!(!filter.allows(&url("https://notpython.org/")));
        assert!(!filter.allows(&url("https://bugs.python.org/issue1")));
    }

    #[test]
    fn test_domain_filter_empty_allowed_means_any() {
        let filter = DomainFilter::new(&[], &["ads.example"]);
        assert!(filter.allows(&url("https://anything.test/")));
        assert!(!filter.allows(&url("https://ads.example/x")));
    }

    #[test]
    fn test_url_pattern_filter() {
        let filter = UrlPatternFilter::new(&["*tutorial*", "*guide*"]).unwrap();
        assert!(filter.allows(&url("https://docs.python.org/3/tutorial/index.html")));
        assert!(filter.allows(&url("https://example.com/user-guide")));
        assert!(!filter.allows(&url("https://docs.python.org/3/library/")));
    }

    #[test]
    fn test_pattern_is_literal_apart_from_star() {
        let filter = UrlPatternFilter::new(&["https://a.com/docs?v=1*"]).unwrap();
        assert!(filter.allows(&url("https://a.com/docs?v=12")));
        assert!(!filter.allows(&url("https://a.com/docsXv=1")));
    }

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime(&url("https://a.com/")), "text/html");
        assert_eq!(guess_mime(&url("https://a.com/docs/intro")), "text/html");
        assert_eq!(guess_mime(&url("https://a.com/page.HTML")), "text/html");
        assert_eq!(guess_mime(&url("https://a.com/manual.pdf")), "application/pdf");
        assert_eq!(guess_mime(&url("https://a.com/logo.png")), "image/png");
    }

    #[test]
    fn test_content_type_filter_before_and_after_fetch() {
        let filter = ContentTypeFilter::new(&["text/html"]);
        assert!(filter.allows(&url("https://a.com/guide")));
        assert!(!filter.allows(&url("https://a.com/guide.pdf")));
        assert!(filter.allows_response(Some("text/html; charset=utf-8")));
        assert!(!filter.allows_response(Some("application/pdf")));
        assert!(filter.allows_response(None));

        let images = ContentTypeFilter::new(&["image/*"]);
        assert!(images.allows(&url("https://a.com/x.jpg")));
    }

    #[test]
    fn test_filter_chain_requires_all() {
        let chain = FilterChain::new()
            .with(DomainFilter::new(&["docs.python.org"], &[]))
            .with(UrlPatternFilter::new(&["*tutorial*"]).unwrap());

        assert_eq!(chain.len(), 2);
        assert!(chain.allows(&url("https://docs.python.org/3/tutorial/")));
        assert!(!chain.allows(&url("https://docs.python.org/3/library/")));
        assert!(!chain.allows(&url("https://example.com/tutorial/")));
        assert!(FilterChain::new().allows(&url("https://anything.test/")));
    }
}
