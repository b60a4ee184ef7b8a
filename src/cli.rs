// src/cli.rs
// =============================================================================
// Command-line interface, defined with clap's derive API.
//
// Each subcommand is one workflow: fetch, crawl, scrape, extract, or a
// file utility. Per-run literals (URLs, batch sizes, delays) are flags;
// credentials come from the environment (see config.rs).
// =============================================================================

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::crawl::Strategy;

#[derive(Parser, Debug)]
#[command(
    name = "crawl-extract",
    version,
    about = "Crawl web pages and extract structured data from them with an LLM",
    long_about = "crawl-extract fetches and deep-crawls websites, post-processes the HTML/Markdown \
                  with CSS selectors, and sends batches of scraped text to Gemini for JSON extraction."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch a single page and print what was found
    ///
    /// Example: crawl-extract page https://example.com
    Page {
        url: String,

        /// Print the full crawl result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Deep-crawl a website (BFS or best-first)
    ///
    /// Example: crawl-extract crawl https://docs.python.org/3/ --strategy best-first --keyword async
    Crawl(CrawlArgs),

    /// Fetch every URL in a list and keep the CSS-selected fragments
    ///
    /// Example: crawl-extract scrape --input filtered_urls.txt --selector div.Ms6aG
    Scrape(ScrapeArgs),

    /// Scrape the product pages linked from a catalogue page
    Catalog(CatalogArgs),

    /// URL list utilities
    Links {
        #[command(subcommand)]
        command: LinksCommand,
    },

    /// Structured extraction with the LLM
    Extract {
        #[command(subcommand)]
        command: ExtractCommand,
    },

    /// Keep the response events of a browser network capture
    ///
    /// Example: crawl-extract network network_capture.json filtered_responses.json
    Network { input: PathBuf, output: PathBuf },
}

#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// Start URL (depth 0)
    pub url: String,

    #[arg(long, value_enum, default_value_t = Strategy::Bfs)]
    pub strategy: Strategy,

    /// Links are followed from pages shallower than this
    #[arg(long, default_value_t = 2)]
    pub max_depth: usize,

    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Follow links to other hosts
    #[arg(long)]
    pub include_external: bool,

    /// Only crawl these domains (and their subdomains); repeatable
    #[arg(long = "allow-domain")]
    pub allow_domains: Vec<String>,

    #[arg(long = "block-domain")]
    pub block_domains: Vec<String>,

    /// Wildcard URL pattern, e.g. "*tutorial*"; repeatable, any may match
    #[arg(long = "pattern")]
    pub patterns: Vec<String>,

    /// Allowed MIME type, e.g. text/html; repeatable
    #[arg(long = "content-type")]
    pub content_types: Vec<String>,

    /// Keyword for relevance scoring; repeatable
    #[arg(long = "keyword")]
    pub keywords: Vec<String>,

    #[arg(long, default_value_t = 0.7)]
    pub weight: f64,

    /// Drop discovered URLs scoring below this
    #[arg(long)]
    pub score_threshold: Option<f64>,

    #[arg(long, default_value_t = 5)]
    pub concurrency: usize,

    /// Seconds to wait before each request
    #[arg(long, default_value_t = 0.0)]
    pub mean_delay: f64,

    /// Extra random delay, up to this many seconds
    #[arg(long, default_value_t = 0.0)]
    pub max_range: f64,

    /// Keep only the fragments matching this CSS selector
    #[arg(long)]
    pub selector: Option<String>,

    /// Append newly seen page URLs to this file
    #[arg(long)]
    pub urls_out: Option<PathBuf>,

    /// Only list URLs matching this regex in --urls-out
    #[arg(long)]
    pub url_match: Option<String>,

    #[arg(long)]
    pub markdown_out: Option<PathBuf>,

    #[arg(long)]
    pub csv_out: Option<PathBuf>,

    /// Save progress here and resume from it on the next run
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    #[arg(long, default_value_t = 5)]
    pub save_every: usize,
}

#[derive(Args, Debug)]
pub struct ScrapeArgs {
    /// File with one URL per line
    #[arg(long, short)]
    pub input: PathBuf,

    #[arg(long, default_value = "div.Ms6aG")]
    pub selector: String,

    #[arg(long, short, default_value = "scraped_output.md")]
    pub output: PathBuf,

    #[arg(long, default_value_t = 5)]
    pub concurrency: usize,

    #[arg(long, default_value_t = 0.0)]
    pub mean_delay: f64,

    #[arg(long, default_value_t = 0.0)]
    pub max_range: f64,

    /// Where inline (base64) images are saved
    #[arg(long, default_value = "images")]
    pub image_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct CatalogArgs {
    /// Catalogue/category page
    pub url: String,

    /// Regex a product link must match
    #[arg(long, default_value = r"/products/.*-i\d+.*\.html")]
    pub product_pattern: String,

    #[arg(long, default_value_t = 5)]
    pub max_products: usize,

    #[arg(long, default_value_t = 5)]
    pub concurrency: usize,

    #[arg(long, short, default_value = "scraped_products.md")]
    pub output: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum LinksCommand {
    /// Drop duplicate URLs (after stripping tracking parameters)
    Dedupe {
        input: PathBuf,

        /// Write here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Query parameter to strip before comparing; repeatable
        #[arg(long = "strip-param", default_values_t = vec!["spm".to_string()])]
        strip_params: Vec<String>,
    },

    /// Collect links from an HTML or Markdown file
    Collect {
        input: PathBuf,

        /// Resolve relative links against this URL
        #[arg(long)]
        base: Option<String>,

        /// Only keep links matching this regex
        #[arg(long)]
        pattern: Option<String>,

        /// Append-only list of seen URLs; only new ones are added
        #[arg(long, short, default_value = "filtered_urls.txt")]
        output: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct LlmArgs {
    /// Overrides GEMINI_MODEL
    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub temperature: Option<f32>,

    /// Batches sent to the model at the same time
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,
}

#[derive(Subcommand, Debug)]
pub enum ExtractCommand {
    /// Extract product records from a scraped corpus
    Products {
        #[arg(long, short, default_value = "scraped_output.md")]
        input: PathBuf,

        /// JSONL (or a JSON array with --hinted)
        #[arg(long, short, default_value = "products.jsonl")]
        output: PathBuf,

        #[arg(long, default_value_t = 1000)]
        batch_size: usize,

        /// One call per record, with selector-parsed fields as hints
        #[arg(long)]
        hinted: bool,

        #[command(flatten)]
        llm: LlmArgs,
    },

    /// Extract tables from scraped HTML
    Tables {
        #[arg(long, short, default_value = "scraped_output.md")]
        input: PathBuf,

        #[arg(long, short, default_value = "tables.jsonl")]
        output: PathBuf,

        #[arg(long, default_value_t = 100_000)]
        max_tokens: usize,

        /// Also write each parsed table as CSV into this directory
        #[arg(long)]
        csv_dir: Option<PathBuf>,

        #[command(flatten)]
        llm: LlmArgs,
    },

    /// Extract records with a CSS selector schema (no model calls)
    ///
    /// Example: crawl-extract extract css --schema articles.json -i page.html
    Css {
        /// JSON schema: {"baseSelector": ..., "fields": [...]}
        #[arg(long)]
        schema: PathBuf,

        /// HTML (or scraped corpus) to read
        #[arg(long, short, default_value = "scraped_output.md")]
        input: PathBuf,

        /// JSON array, one object per base element
        #[arg(long, short, default_value = "extracted.json")]
        output: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_crawl_flags() {
        let cli = Cli::parse_from([
            "crawl-extract", "crawl", "https://docs.python.org/3/",
            "--strategy", "best-first",
            "--pattern", "*tutorial*", "--pattern", "*guide*",
            "--keyword", "async",
            "--max-depth", "3",
        ]);
        let Commands::Crawl(args) = cli.command else {
            panic!("expected crawl");
        };
        assert_eq!(args.strategy, Strategy::BestFirst);
        assert_eq!(args.patterns, vec!["*tutorial*", "*guide*"]);
        assert_eq!(args.max_depth, 3);
        assert_eq!(args.weight, 0.7);
    }

    #[test]
    fn test_extract_defaults() {
        let cli = Cli::parse_from(["crawl-extract", "extract", "products"]);
        let Commands::Extract { command: ExtractCommand::Products { batch_size, hinted, llm, .. } } = cli.command else {
            panic!("expected extract products");
        };
        assert_eq!(batch_size, 1000);
        assert!(!hinted);
        assert_eq!(llm.concurrency, 1);
    }

    #[test]
    fn test_dedupe_strips_spm_by_default() {
        let cli = Cli::parse_from(["crawl-extract", "links", "dedupe", "urls.txt"]);
        let Commands::Links { command: LinksCommand::Dedupe { strip_params, .. } } = cli.command else {
            panic!("expected links dedupe");
        };
        assert_eq!(strip_params, vec!["spm"]);
    }

    #[test]
    fn test_extract_css_needs_schema() {
        assert!(Cli::try_parse_from(["crawl-extract", "extract", "css"]).is_err());

        let cli = Cli::parse_from(["crawl-extract", "extract", "css", "--schema", "s.json"]);
        let Commands::Extract { command: ExtractCommand::Css { schema, input, output } } = cli.command else {
            panic!("expected extract css");
        };
        assert_eq!(schema, PathBuf::from("s.json"));
        assert_eq!(input, PathBuf::from("scraped_output.md"));
        assert_eq!(output, PathBuf::from("extracted.json"));
    }
}
