// src/extract/mod.rs
// =============================================================================
// Everything between "we have scraped HTML/Markdown" and "we have JSON".
//
// Submodules:
// - html: DOM queries (CSS selection, cleaning, tables, image fixing)
// - markdown: HTML -> Markdown, record splitting, Markdown links
// - batch: fixed-size and token-budget batching
// - product: product records and the selector pre-parse
// - prompt: the extraction prompt strings
// - llm: the Gemini client
// - sink: JSONL/CSV output with raw-text fallback
// - pipeline: the extraction runs that tie the above together
// - schema: selector-schema extraction (no LLM)
// =============================================================================

mod batch;
mod html;
mod llm;
mod markdown;
mod pipeline;
mod product;
mod prompt;
mod schema;
mod sink;

pub use html::{
    extract_absolute_html_links, extract_html_links, fix_images, page_title, select_fragments,
};
pub(crate) use html::parse_selector;
pub use llm::GeminiClient;
pub use markdown::{extract_markdown_links, html_to_markdown};
pub use pipeline::{
    extract_products, extract_products_hinted, extract_table_data, ProductOptions, TableOptions,
};
pub use schema::{extract_with_schema, CssSchema};
pub use sink::JsonlSink;
