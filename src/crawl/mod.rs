// src/crawl/mod.rs
// =============================================================================
// Fetching and crawling web pages.
//
// - fetch: single and bounded-concurrency page fetches (CrawlResult)
// - filter: which discovered URLs are worth following
// - scorer: keyword relevance ranking for best-first crawls
// - queue: the deep crawler (BFS or best-first), streamed or collected
// - checkpoint: save/resume of crawl results
// =============================================================================

mod checkpoint;
mod fetch;
mod filter;
mod queue;
mod scorer;

pub use checkpoint::{Checkpoint, CheckpointRecord};
pub use fetch::{CrawlResult, PageFetcher, Politeness};
pub use filter::{ContentTypeFilter, DomainFilter, FilterChain, UrlPatternFilter};
pub use queue::{DeepCrawlConfig, DeepCrawler, Strategy};
pub use scorer::KeywordRelevanceScorer;
