// src/crawl/fetch.rs
// =============================================================================
// Fetching pages over plain HTTP.
//
// Every fetch produces a CrawlResult, whether it worked or not: failures are
// categorized into `error_message` with `success = false`, so a crawl of a
// thousand pages never stops because one of them timed out.
//
// There is no JavaScript execution here. What we get is what the server
// sends, which covers documentation sites and server-rendered catalogues.
//
// Concurrency:
// - fetch_many bounds in-flight requests with a tokio Semaphore
// - each fetch waits `mean_delay + uniform(0, max_range)` before sending
// - results come back in input order
// =============================================================================

use anyhow::{bail, Context, Result};
use futures::future::join_all;
use reqwest::{header::CONTENT_TYPE, redirect, Client};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;
use url::Url;

use crate::config::Settings;
use crate::extract::{extract_html_links, html_to_markdown, page_title};

// Per-page crawl information filled in by the deep crawler
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CrawlMetadata {
    pub depth: usize,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

// The outcome of fetching one URL
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CrawlResult {
    pub url: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing)]
    pub html: String,
    pub markdown: String,
    pub links: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub metadata: CrawlMetadata,
}

impl CrawlResult {
    fn failed(url: &str, status_code: Option<u16>, message: String) -> Self {
        Self {
            url: url.to_string(),
            success: false,
            status_code,
            error_message: Some(message),
            ..Default::default()
        }
    }
}

// Delay issued before each request, in seconds
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Politeness {
    pub mean_delay: f64,
    pub max_range: f64,
}

impl Politeness {
    // Negative delays clamp to zero; NaN and infinite ones are rejected
    pub fn new(mean_delay: f64, max_range: f64) -> Result<Self> {
        if !mean_delay.is_finite() || !max_range.is_finite() {
            bail!(
                "Delays must be finite numbers of seconds (got mean {}, range {})",
                mean_delay,
                max_range
            );
        }
        Ok(Self {
            mean_delay: mean_delay.max(0.0),
            max_range: max_range.max(0.0),
        })
    }

    // mean_delay + uniform(0, max_range); zero when both are zero or the
    // fields hold something that isn't a valid duration
    pub fn next_delay(&self) -> Duration {
        let jitter = if self.max_range > 0.0 {
            fastrand::f64() * self.max_range
        } else {
            0.0
        };
        Duration::try_from_secs_f64(self.mean_delay + jitter).unwrap_or_default()
    }

    async fn wait(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[derive(Clone)]
pub struct PageFetcher {
    client: Client,
}

impl PageFetcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .user_agent(settings.user_agent.clone())
            .redirect(redirect::Policy::limited(10))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    // Fetches one page; never fails, see CrawlResult::success
    pub async fn fetch(&self, url: &str) -> CrawlResult {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => return CrawlResult::failed(url, None, format!("Invalid URL: {}", e)),
        };

        debug!("Fetching {}", parsed);

        let response = match self.client.get(parsed.clone()).send().await {
            Ok(response) => response,
            Err(e) => return CrawlResult::failed(url, None, categorize_error(&e)),
        };

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !status.is_success() {
            let mut result = CrawlResult::failed(url, Some(status.as_u16()), format!("HTTP {}", status.as_u16()));
            result.content_type = content_type;
            return result;
        }

        // After redirects, links resolve against where we ended up
        let final_url = response.url().to_string();

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return CrawlResult::failed(url, Some(status.as_u16()), categorize_error(&e));
            }
        };

        let mut result = CrawlResult {
            url: url.to_string(),
            success: true,
            status_code: Some(status.as_u16()),
            content_type: content_type.clone(),
            ..Default::default()
        };

        if is_html(content_type.as_deref()) {
            result.markdown = html_to_markdown(&body);
            result.links = extract_html_links(&body, &final_url);
            result.metadata.title = page_title(&body);
        }
        result.html = body;
        result
    }

    // Fetches every URL with at most `concurrency` requests in flight
    pub async fn fetch_many(
        &self,
        urls: &[String],
        concurrency: usize,
        politeness: Politeness,
    ) -> Vec<CrawlResult> {
        let semaphore = Semaphore::new(concurrency.max(1));

        let tasks = urls.iter().map(|url| {
            let semaphore = &semaphore;
            async move {
                // The semaphore is never closed, so acquire can't fail
                let _permit = semaphore.acquire().await.ok();
                politeness.wait().await;
                self.fetch(url).await
            }
        });

        join_all(tasks).await
    }
}

// A missing Content-Type is treated as HTML
fn is_html(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.contains("html") || ct.starts_with("text/plain")
        }
    }
}

// Turns a reqwest error into a short, human-readable reason
fn categorize_error(error: &reqwest::Error) -> String {
    let error_string = format!("{:?}", error).to_lowercase();

    if error.is_timeout() {
        "Request timed out".to_string()
    } else if error.is_redirect() {
        "Too many redirects".to_string()
    } else if error.is_connect() {
        if error_string.contains("dns") {
            "Could not resolve hostname".to_string()
        } else if error_string.contains("certificate") || error_string.contains("tls") {
            "TLS certificate error".to_string()
        } else {
            "Connection failed".to_string()
        }
    } else if error.is_body() || error.is_decode() {
        format!("Failed to read response body: {}", error)
    } else {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use std::time::Instant;

    fn fetcher() -> PageFetcher {
        PageFetcher::new(&Settings::default()).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success_fills_payloads() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/docs")
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body(
                r#"<html><head><title> Docs </title></head>
                <body><h1>Guide</h1><a href="/next">next</a><a href="mailto:x@y.z">mail</a></body></html>"#,
            )
            .create_async()
            .await;

        let url = format!("{}/docs", server.url());
        let result = fetcher().fetch(&url).await;

        assert!(result.success);
        assert_eq!(result.status_code, Some(200));
        assert_eq!(result.metadata.title.as_deref(), Some("Docs"));
        assert!(result.markdown.contains("Guide"));
        assert_eq!(result.links, vec![format!("{}/next", server.url())]);
        assert!(result.error_message.is_none());
    }

    #[tokio::test]
    async fn test_fetch_http_error_is_a_failed_result() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let result = fetcher().fetch(&format!("{}/missing", server.url())).await;

        assert!(!result.success);
        assert_eq!(result.status_code, Some(404));
        assert_eq!(result.error_message.as_deref(), Some("HTTP 404"));
    }

    #[tokio::test]
    async fn test_fetch_invalid_url() {
        let result = fetcher().fetch("not a url").await;
        assert!(!result.success);
        assert!(result.error_message.unwrap().starts_with("Invalid URL"));
    }

    #[tokio::test]
    async fn test_fetch_many_keeps_input_order() {
        let mut server = Server::new_async().await;
        let mut mocks = Vec::new();
        for page in ["a", "b", "c"] {
            let mock = server
                .mock("GET", format!("/{}", page).as_str())
                .with_status(200)
                .with_header("content-type", "text/html")
                .with_body(format!("<p>page {}</p>", page))
                .create_async()
                .await;
            mocks.push(mock);
        }

        let urls: Vec<String> = ["a", "b", "c"]
            .iter()
            .map(|p| format!("{}/{}", server.url(), p))
            .collect();
        let results = fetcher().fetch_many(&urls, 2, Politeness::default()).await;

        let got: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(got, urls.iter().map(String::as_str).collect::<Vec<_>>());
        assert!(results.iter().all(|r| r.success));
        assert!(results[1].markdown.contains("page b"));
    }

    #[tokio::test]
    async fn test_politeness_delays_requests() {
        let started = Instant::now();
        let results = fetcher()
            .fetch_many(&["bad url".to_string()], 1, Politeness::new(0.05, 0.0).unwrap())
            .await;
        assert_eq!(results.len(), 1);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_politeness_jitter_stays_in_range() {
        let politeness = Politeness::new(0.5, 0.25).unwrap();
        for _ in 0..100 {
            let delay = politeness.next_delay().as_secs_f64();
            assert!((0.5..0.75).contains(&delay));
        }
        assert!(Politeness::default().next_delay().is_zero());
    }

    #[test]
    fn test_politeness_rejects_non_finite_delays() {
        assert!(Politeness::new(f64::INFINITY, 0.0).is_err());
        assert!(Politeness::new(1.0, f64::NAN).is_err());
        let clamped = Politeness::new(-3.0, -1.0).unwrap();
        assert!(clamped.next_delay().is_zero());

        // Built directly, an unusable delay still doesn't panic
        let unusable = Politeness {
            mean_delay: f64::INFINITY,
            max_range: 0.0,
        };
        assert!(unusable.next_delay().is_zero());
    }
}
