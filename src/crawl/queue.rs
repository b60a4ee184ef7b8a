// src/crawl/queue.rs
// =============================================================================
// Deep crawling: link-graph traversal from a start URL.
//
// How it works:
// 1. Start with the start URL in the frontier (depth 0)
// 2. Take up to `concurrency` URLs from the frontier and fetch them
// 3. Extract links from each page and add new ones to the frontier
//    (if not visited, allowed by the filters and within the depth limit)
// 4. Repeat until the frontier is empty or max_pages results were sent
//
// Strategies:
// - Bfs: the frontier is a FIFO queue, so pages come level by level
// - BestFirst: the frontier is a max-heap on the URL's score, so the most
//   relevant page is always fetched next (ties: discovery order)
//
// Results are sent over a channel as soon as each batch is fetched, so a
// caller can save progress while the crawl is still running.
// =============================================================================

use anyhow::{anyhow, Result};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet, VecDeque};
use tokio::sync::mpsc;
use tracing::{debug, info};
use url::Url;

use super::fetch::{CrawlResult, PageFetcher, Politeness};
use super::filter::FilterChain;
use super::scorer::KeywordRelevanceScorer;
use crate::links::{normalize_url, DEFAULT_TRACKING_PARAMS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Strategy {
    Bfs,
    BestFirst,
}

pub struct DeepCrawlConfig {
    pub strategy: Strategy,
    // Links are followed from pages with depth < max_depth
    pub max_depth: usize,
    // Maximum number of results sent; None = unbounded
    pub max_pages: Option<usize>,
    pub include_external: bool,
    pub filter_chain: FilterChain,
    pub scorer: Option<KeywordRelevanceScorer>,
    // Discovered URLs scoring below this are dropped
    pub score_threshold: Option<f64>,
    pub concurrency: usize,
    pub politeness: Politeness,
    // Normalized URLs already crawled in an earlier run: fetched to find
    // their links, but not sent again
    pub already_crawled: HashSet<String>,
}

impl Default for DeepCrawlConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Bfs,
            max_depth: 2,
            max_pages: None,
            include_external: false,
            filter_chain: FilterChain::default(),
            scorer: None,
            score_threshold: None,
            concurrency: 5,
            politeness: Politeness::default(),
            already_crawled: HashSet::new(),
        }
    }
}

// A URL waiting in the frontier
#[derive(Debug, Clone)]
struct Pending {
    url: Url,
    depth: usize,
    score: f64,
    // Discovery order, for stable tie-breaking
    seq: usize,
}

// Higher score first, then earlier discovery first
impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

enum Frontier {
    Fifo(VecDeque<Pending>),
    Ranked(BinaryHeap<Pending>),
}

impl Frontier {
    fn new(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Bfs => Frontier::Fifo(VecDeque::new()),
            Strategy::BestFirst => Frontier::Ranked(BinaryHeap::new()),
        }
    }

    fn push(&mut self, item: Pending) {
        match self {
            Frontier::Fifo(queue) => queue.push_back(item),
            Frontier::Ranked(heap) => heap.push(item),
        }
    }

    fn pop(&mut self) -> Option<Pending> {
        match self {
            Frontier::Fifo(queue) => queue.pop_front(),
            Frontier::Ranked(heap) => heap.pop(),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Frontier::Fifo(queue) => queue.is_empty(),
            Frontier::Ranked(heap) => heap.is_empty(),
        }
    }
}

pub struct DeepCrawler {
    fetcher: PageFetcher,
    config: DeepCrawlConfig,
}

impl DeepCrawler {
    pub fn new(fetcher: PageFetcher, config: DeepCrawlConfig) -> Self {
        Self { fetcher, config }
    }

    // Starts the crawl in the background; results arrive as they're fetched
    //
    // Dropping the receiver stops the crawl after the current batch.
    pub fn stream(self, start_url: &str) -> Result<mpsc::Receiver<CrawlResult>> {
        let start = Url::parse(start_url)
            .map_err(|e| anyhow!("Invalid URL '{}': {}", start_url, e))?;
        if start.host_str().is_none() {
            return Err(anyhow!("URL has no host: {}", start_url));
        }

        let (tx, rx) = mpsc::channel(self.config.concurrency.max(1) * 2);
        tokio::spawn(self.run(start, tx));
        Ok(rx)
    }

    // Runs the whole crawl and collects every result
    pub async fn crawl(self, start_url: &str) -> Result<Vec<CrawlResult>> {
        let mut rx = self.stream(start_url)?;
        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        Ok(results)
    }

    async fn run(self, start: Url, tx: mpsc::Sender<CrawlResult>) {
        let config = &self.config;
        let start_host = start.host_str().map(str::to_lowercase);

        let mut frontier = Frontier::new(config.strategy);
        let mut visited = HashSet::new();
        let mut seq = 0;
        let mut sent = 0;

        let start_key = normalize_url(start.as_str(), DEFAULT_TRACKING_PARAMS);
        visited.insert(start_key);
        frontier.push(Pending {
            score: self.score(&start),
            url: start,
            depth: 0,
            seq,
        });

        while !frontier.is_empty() {
            let mut batch = Vec::new();
            while batch.len() < config.concurrency.max(1) {
                match frontier.pop() {
                    Some(item) => batch.push(item),
                    None => break,
                }
            }

            let urls: Vec<String> = batch.iter().map(|p| p.url.to_string()).collect();
            let results = self
                .fetcher
                .fetch_many(&urls, config.concurrency, config.politeness)
                .await;

            for (pending, mut result) in batch.into_iter().zip(results) {
                result.metadata.depth = pending.depth;
                result.metadata.score = pending.score;

                if result.success
                    && pending.depth > 0
                    && !config
                        .filter_chain
                        .allows_response(&result.url, result.content_type.as_deref())
                {
                    continue;
                }

                if result.success && pending.depth < config.max_depth {
                    for link in &result.links {
                        let Some(next) = self.admit(link, start_host.as_deref(), &mut visited) else {
                            continue;
                        };
                        seq += 1;
                        frontier.push(Pending {
                            score: self.score(&next),
                            url: next,
                            depth: pending.depth + 1,
                            seq,
                        });
                    }
                }

                let key = normalize_url(&result.url, DEFAULT_TRACKING_PARAMS);
                if config.already_crawled.contains(&key) {
                    debug!("Already crawled, not sent again: {}", result.url);
                    continue;
                }

                if tx.send(result).await.is_err() {
                    debug!("Result receiver dropped; stopping crawl");
                    return;
                }
                sent += 1;

                if config.max_pages.is_some_and(|max| sent >= max) {
                    info!("Reached max_pages ({}); stopping crawl", sent);
                    return;
                }
            }
        }

        info!("Crawl finished: {} pages", sent);
    }

    fn score(&self, url: &Url) -> f64 {
        self.config.scorer.as_ref().map_or(0.0, |s| s.score(url))
    }

    // Decides whether a discovered link enters the frontier
    //
    // The normalized URL is marked visited on first sight, so a link
    // rejected once is never reconsidered.
    fn admit(&self, link: &str, start_host: Option<&str>, visited: &mut HashSet<String>) -> Option<Url> {
        let key = normalize_url(link, DEFAULT_TRACKING_PARAMS);
        if !visited.insert(key.clone()) {
            return None;
        }

        let url = Url::parse(&key).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }

        if !self.config.include_external {
            let host = url.host_str().map(str::to_lowercase);
            if host.as_deref() != start_host {
                debug!("Skipping external link {}", url);
                return None;
            }
        }

        if !self.config.filter_chain.allows(&url) {
            return None;
        }

        if let Some(threshold) = self.config.score_threshold {
            if self.score(&url) < threshold {
                debug!("Score below threshold: {}", url);
                return None;
            }
        }

        Some(url)
    }
}
