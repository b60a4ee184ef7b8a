// src/links/mod.rs
// =============================================================================
// URL bookkeeping shared by the crawl, scrape and catalog commands.
//
// Submodules:
// - normalize: tracking-parameter stripping, de-duplication, regex filters
// - list: reading/writing/appending plain-text URL list files
// =============================================================================

mod list;
mod normalize;

pub use list::{append_new_urls, collect_links, read_url_list, write_url_list};
pub use normalize::{dedupe, filter_matching, normalize_url, DEFAULT_TRACKING_PARAMS};
