// src/main.rs
// =============================================================================
// Entry point of the crawl-extract CLI.
//
// What happens here:
// 1. Set up logging (tracing, to stderr) and load settings from the environment
// 2. Parse command-line arguments using clap
// 3. Dispatch to the subcommand handler
// 4. Exit with proper code (0 = success, 1 = some pages/batches failed,
//    2 = fatal error)
// =============================================================================

mod cli;
mod config;
mod crawl;
mod export;
mod extract;
mod links;
mod network;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use regex::Regex;
use std::fs;
use std::path::Path;
use tracing::{info, warn};
use url::Url;

use cli::{CatalogArgs, Cli, Commands, CrawlArgs, ExtractCommand, LinksCommand, LlmArgs, ScrapeArgs};
use config::Settings;
use crawl::{
    Checkpoint, CheckpointRecord, ContentTypeFilter, CrawlResult, DeepCrawlConfig, DeepCrawler,
    DomainFilter, FilterChain, KeywordRelevanceScorer, PageFetcher, Politeness, UrlPatternFilter,
};
use extract::{GeminiClient, JsonlSink, ProductOptions, TableOptions};
use links::DEFAULT_TRACKING_PARAMS;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    let settings = Settings::from_env();

    match cli.command {
        Commands::Page { url, json } => handle_page(&settings, &url, json).await,
        Commands::Crawl(args) => handle_crawl(&settings, args).await,
        Commands::Scrape(args) => handle_scrape(&settings, args).await,
        Commands::Catalog(args) => handle_catalog(&settings, args).await,
        Commands::Links { command } => handle_links(command),
        Commands::Extract { command } => handle_extract(&settings, command).await,
        Commands::Network { input, output } => handle_network(&input, &output),
    }
}

// Handles the 'page' subcommand: one fetch, printed
async fn handle_page(settings: &Settings, url: &str, json: bool) -> Result<i32> {
    let fetcher = PageFetcher::new(settings)?;
    let result = fetcher.fetch(url).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(if result.success { 0 } else { 1 });
    }

    if !result.success {
        println!(
            "❌ Crawl error: {}",
            result.error_message.as_deref().unwrap_or("unknown error")
        );
        return Ok(1);
    }

    let host = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string));
    let internal = result
        .links
        .iter()
        .filter(|link| Url::parse(link).ok().and_then(|u| u.host_str().map(str::to_string)) == host)
        .count();

    println!("Crawled URL: {}", result.url);
    if let Some(status) = result.status_code {
        println!("Status code: {}", status);
    }
    if let Some(title) = &result.metadata.title {
        println!("Title: {}", title);
    }
    println!("HTML size: {}", result.html.len());
    println!("Markdown size: {}", result.markdown.len());
    println!("Markdown preview: {}", export::truncate_chars(&result.markdown, 300));
    println!("Internal link count: {}", internal);
    println!("External link count: {}", result.links.len() - internal);

    Ok(0)
}

// Handles the 'crawl' subcommand
//
// Results are consumed as they stream in, so progress is checkpointed while
// the crawl runs. Ctrl-C stops the crawl and still saves/exports what was
// collected.
async fn handle_crawl(settings: &Settings, args: CrawlArgs) -> Result<i32> {
    let url_match = args
        .url_match
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("Invalid --url-match regex")?;
    if let Some(selector) = args.selector.as_deref() {
        extract::parse_selector(selector)?;
    }

    let mut checkpoint = args
        .state_file
        .as_deref()
        .map(|path| Checkpoint::load(path, args.save_every))
        .transpose()?;
    if let Some(checkpoint) = checkpoint.as_ref().filter(|c| !c.is_empty()) {
        println!("♻️  Resuming: {} page(s) already crawled", checkpoint.len());
    }

    let config = DeepCrawlConfig {
        strategy: args.strategy,
        max_depth: args.max_depth,
        max_pages: args.max_pages,
        include_external: args.include_external,
        filter_chain: build_filter_chain(&args)?,
        scorer: (!args.keywords.is_empty())
            .then(|| KeywordRelevanceScorer::new(&args.keywords, args.weight)),
        score_threshold: args.score_threshold,
        concurrency: args.concurrency,
        politeness: Politeness::new(args.mean_delay, args.max_range)?,
        already_crawled: checkpoint
            .as_ref()
            .map(Checkpoint::crawled_urls)
            .unwrap_or_default(),
    };

    println!("🚀 Crawling {} ({:?}, max depth {})", args.url, args.strategy, args.max_depth);
    if !config.filter_chain.is_empty() {
        info!("{} URL filter(s) active", config.filter_chain.len());
    }

    let crawler = DeepCrawler::new(PageFetcher::new(settings)?, config);
    let mut stream = crawler.stream(&args.url)?;

    let mut records: Vec<CheckpointRecord> = checkpoint
        .as_ref()
        .map(|c| c.records().to_vec())
        .unwrap_or_default();
    let mut failures = 0;

    loop {
        let result = tokio::select! {
            next = stream.recv() => match next {
                Some(result) => result,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted; saving progress before exiting");
                failures += 1;
                break;
            }
        };

        println!(
            "Depth: {} | Score: {:.2} | {}",
            result.metadata.depth, result.metadata.score, result.url
        );

        if !result.success {
            warn!(
                "Failed to crawl {}: {}",
                result.url,
                result.error_message.as_deref().unwrap_or("unknown error")
            );
            failures += 1;
            continue;
        }

        let record = page_record(&result, args.selector.as_deref())?;
        if let Some(checkpoint) = checkpoint.as_mut() {
            if let Err(e) = checkpoint.push(record.clone()) {
                warn!("Failed to save progress: {:#}", e);
            }
        }
        records.push(record);
    }

    if let Some(checkpoint) = &checkpoint {
        checkpoint.save()?;
        println!("Final results saved: {} pages", checkpoint.len());
    }

    println!("📄 Crawled {} page(s), {} failed", records.len(), failures);
    write_crawl_outputs(&args, &records, url_match.as_ref())?;

    Ok(if failures > 0 { 1 } else { 0 })
}

fn build_filter_chain(args: &CrawlArgs) -> Result<FilterChain> {
    let mut chain = FilterChain::new();
    if !args.allow_domains.is_empty() || !args.block_domains.is_empty() {
        chain = chain.with(DomainFilter::new(&args.allow_domains, &args.block_domains));
    }
    if !args.patterns.is_empty() {
        chain = chain.with(UrlPatternFilter::new(&args.patterns)?);
    }
    if !args.content_types.is_empty() {
        chain = chain.with(ContentTypeFilter::new(&args.content_types));
    }
    Ok(chain)
}

// The saved form of a crawled page; with a selector, only the matching
// fragments are kept (as Markdown)
fn page_record(result: &CrawlResult, selector: Option<&str>) -> Result<CheckpointRecord> {
    let mut record = CheckpointRecord::from(result);
    if let Some(selector) = selector {
        let fragments = extract::select_fragments(&result.html, selector)?;
        if fragments.is_empty() {
            warn!("No '{}' found in {}", selector, result.url);
        }
        record.markdown = fragments
            .iter()
            .map(|f| extract::html_to_markdown(f))
            .collect::<Vec<_>>()
            .join("\n\n");
    }
    Ok(record)
}

fn write_crawl_outputs(args: &CrawlArgs, records: &[CheckpointRecord], url_match: Option<&Regex>) -> Result<()> {
    if let Some(path) = &args.urls_out {
        let urls: Vec<String> = records.iter().map(|r| r.url.clone()).collect();
        let urls = match url_match {
            Some(re) => links::filter_matching(&urls, re),
            None => urls,
        };
        let urls = links::dedupe(&urls, DEFAULT_TRACKING_PARAMS);
        let added = links::append_new_urls(path, &urls, DEFAULT_TRACKING_PARAMS)?;
        println!("✅ Saved {} new URL(s) to {}", added, path.display());
    }

    if let Some(path) = &args.markdown_out {
        let sections: Vec<String> = records
            .iter()
            .filter(|r| !r.markdown.trim().is_empty())
            .map(|r| export::page_section(&r.url, &r.markdown))
            .collect();
        let written = export::write_markdown_corpus(path, &sections, export::SECTION_SEPARATOR)?;
        println!("✅ Wrote {} page(s) to {}", written, path.display());
    }

    if let Some(path) = &args.csv_out {
        let rows: Vec<Vec<String>> = records
            .iter()
            .map(|r| vec![r.url.clone(), format!("{:.2}", r.score), r.depth.to_string()])
            .collect();
        export::write_csv(path, &["URL", "Score", "Depth"], &rows)?;
        println!("✅ Wrote {} row(s) to {}", rows.len(), path.display());
    }

    Ok(())
}

// Handles the 'scrape' subcommand: fetch a URL list, keep selected fragments
//
// Each fragment becomes one record of the output corpus (blank lines inside
// a fragment are dropped so the extract step splits records correctly).
async fn handle_scrape(settings: &Settings, args: ScrapeArgs) -> Result<i32> {
    let urls = links::read_url_list(&args.input)?;
    if urls.is_empty() {
        return Err(anyhow!("No URLs found in {}", args.input.display()));
    }
    extract::parse_selector(&args.selector)?;

    println!(
        "🚀 Scraping {} URL(s) with concurrency limit {}",
        urls.len(),
        args.concurrency
    );

    let fetcher = PageFetcher::new(settings)?;
    let politeness = Politeness::new(args.mean_delay, args.max_range)?;
    let results = fetcher.fetch_many(&urls, args.concurrency, politeness).await;

    let mut records = Vec::new();
    let mut failures = 0;

    for result in &results {
        if !result.success {
            warn!(
                "Failed to scrape {}: {}",
                result.url,
                result.error_message.as_deref().unwrap_or("unknown error")
            );
            failures += 1;
            continue;
        }

        let fragments = extract::select_fragments(&result.html, &args.selector)?;
        if fragments.is_empty() {
            warn!("No '{}' found in {}", args.selector, result.url);
            continue;
        }

        let base = Url::parse(&result.url)?;
        for fragment in fragments {
            let fixed = match extract::fix_images(&fragment, &base, &args.image_dir) {
                Ok(fixed) => fixed,
                Err(e) => {
                    warn!("Failed to process images in {}: {:#}", result.url, e);
                    fragment
                }
            };
            records.push(without_blank_lines(&fixed));
        }
    }

    let written = export::write_markdown_corpus(&args.output, &records, "\n\n")?;
    println!(
        "✅ Scraping complete: {} fragment(s) saved to {}",
        written,
        args.output.display()
    );

    Ok(if failures > 0 { 1 } else { 0 })
}

fn without_blank_lines(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// Handles the 'catalog' subcommand
async fn handle_catalog(settings: &Settings, args: CatalogArgs) -> Result<i32> {
    let pattern = Regex::new(&args.product_pattern).context("Invalid --product-pattern regex")?;
    let fetcher = PageFetcher::new(settings)?;

    println!("🔍 Starting crawl on catalogue page: {}", args.url);
    let catalogue = fetcher.fetch(&args.url).await;
    if !catalogue.success {
        println!(
            "❌ Failed to crawl catalogue page: {}",
            catalogue.error_message.as_deref().unwrap_or("unknown error")
        );
        return Ok(1);
    }

    let mut product_links = links::dedupe(
        &links::filter_matching(&catalogue.links, &pattern),
        DEFAULT_TRACKING_PARAMS,
    );
    if product_links.is_empty() {
        println!("❌ No product links found on the catalogue page.");
        return Ok(1);
    }
    product_links.truncate(args.max_products);
    println!(
        "✅ Found {} unique product link(s). Starting individual scrapes...",
        product_links.len()
    );

    let results = fetcher
        .fetch_many(&product_links, args.concurrency, Politeness::default())
        .await;

    let mut pages = Vec::new();
    for result in &results {
        if result.success && !result.markdown.trim().is_empty() {
            println!("  ✅ Success: {}", result.url);
            pages.push(result.markdown.clone());
        } else {
            println!(
                "  ❌ Failed: {} | Reason: {}",
                result.url,
                result.error_message.as_deref().unwrap_or("no content")
            );
        }
    }

    if pages.is_empty() {
        println!("❌ All product scrapes failed. No output file will be created.");
        return Ok(1);
    }

    let written = export::write_markdown_corpus(&args.output, &pages, export::SECTION_SEPARATOR)?;
    println!(
        "🎉 Successfully scraped {} product(s) and saved content to {}",
        written,
        args.output.display()
    );

    Ok(if written < results.len() { 1 } else { 0 })
}

// Handles the 'links' subcommands
fn handle_links(command: LinksCommand) -> Result<i32> {
    match command {
        LinksCommand::Dedupe {
            input,
            output,
            strip_params,
        } => {
            let urls = links::read_url_list(&input)?;
            let params: Vec<&str> = strip_params.iter().map(String::as_str).collect();
            let unique = links::dedupe(&urls, &params);

            match output {
                Some(path) => {
                    links::write_url_list(&path, &unique)?;
                    println!(
                        "✅ {} unique URL(s) ({} duplicate(s) removed) saved to {}",
                        unique.len(),
                        urls.len() - unique.len(),
                        path.display()
                    );
                }
                None => unique.iter().for_each(|url| println!("{}", url)),
            }
            Ok(0)
        }
        LinksCommand::Collect {
            input,
            base,
            pattern,
            output,
        } => {
            let document = fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let base = base
                .as_deref()
                .map(Url::parse)
                .transpose()
                .context("Invalid --base URL")?;

            let mut found = links::collect_links(&document, base.as_ref());
            if let Some(pattern) = pattern {
                let re = Regex::new(&pattern).context("Invalid --pattern regex")?;
                found = links::filter_matching(&found, &re);
            }
            let found = links::dedupe(&found, DEFAULT_TRACKING_PARAMS);

            let added = links::append_new_urls(&output, &found, DEFAULT_TRACKING_PARAMS)?;
            println!(
                "✅ Found {} link(s); {} new, appended to {}",
                found.len(),
                added,
                output.display()
            );
            Ok(0)
        }
    }
}

fn gemini_client(settings: &Settings, llm: &LlmArgs) -> Result<GeminiClient> {
    let mut client = GeminiClient::new(settings)?;
    if let Some(model) = &llm.model {
        client = client.with_model(model.clone());
    }
    if let Some(temperature) = llm.temperature {
        client = client.with_temperature(temperature);
    }
    info!("Using model {}", client.model());
    Ok(client)
}

fn read_corpus(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

// Selector-schema extraction; writes a JSON array, one object per base
// element. No matches is a warning, not a failure.
fn handle_extract_css(schema_path: &Path, input: &Path, output: &Path) -> Result<i32> {
    let schema = extract::CssSchema::from_json(&read_corpus(schema_path)?)
        .with_context(|| format!("Failed to load schema {}", schema_path.display()))?;
    let html = read_corpus(input)?;

    let items = extract::extract_with_schema(&html, &schema)?;
    if items.is_empty() {
        warn!("No '{}' found in {}", schema.base_selector, input.display());
    }

    let body = serde_json::to_string_pretty(&items)?;
    fs::write(output, body).with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "✅ Extracted {} item(s) with schema '{}' to {}",
        items.len(),
        schema.name,
        output.display()
    );

    Ok(0)
}

// Handles the 'extract' subcommands
async fn handle_extract(settings: &Settings, command: ExtractCommand) -> Result<i32> {
    let stats = match command {
        ExtractCommand::Css {
            schema,
            input,
            output,
        } => return handle_extract_css(&schema, &input, &output),
        ExtractCommand::Products {
            input,
            output,
            batch_size,
            hinted,
            llm,
        } => {
            let corpus = read_corpus(&input)?;
            let client = gemini_client(settings, &llm)?;

            if hinted {
                extract::extract_products_hinted(&client, &corpus, &output, llm.concurrency).await?
            } else {
                let mut sink = JsonlSink::append_to(&output)?;
                let options = ProductOptions {
                    batch_size,
                    concurrency: llm.concurrency,
                };
                extract::extract_products(&client, &corpus, &mut sink, &options).await?
            }
        }
        ExtractCommand::Tables {
            input,
            output,
            max_tokens,
            csv_dir,
            llm,
        } => {
            let corpus = read_corpus(&input)?;
            let client = gemini_client(settings, &llm)?;
            let mut sink = JsonlSink::append_to(&output)?;
            let options = TableOptions {
                max_tokens,
                concurrency: llm.concurrency,
                csv_dir,
            };
            extract::extract_table_data(&client, &corpus, &mut sink, &options).await?
        }
    };

    println!("📊 Summary:");
    println!("   📦 Batches: {}", stats.batches);
    println!("   ✅ Records: {}", stats.records);
    println!("   ⚠️  Raw fallbacks: {}", stats.raw_fallbacks);
    println!("   ❌ Failed: {}", stats.failed);
    if stats.skipped > 0 {
        println!("   ⏭️  Skipped: {}", stats.skipped);
    }

    Ok(if stats.had_failures() { 1 } else { 0 })
}

// Handles the 'network' subcommand
fn handle_network(input: &Path, output: &Path) -> Result<i32> {
    println!("Loading data from {}...", input.display());
    let text = read_corpus(input)?;
    let capture: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Error decoding JSON from {}", input.display()))?;

    let events = network::load_events(&capture);
    println!("Total candidate network events found: {}", events.len());

    let summary = network::summarize(&events);
    println!(
        "Requests: {}, Responses: {}, Failed: {}",
        summary.requests, summary.responses, summary.failed
    );
    if !summary.api_calls.is_empty() {
        println!("Detected {} API call(s):", summary.api_calls.len());
        for call in summary.api_calls.iter().take(3) {
            println!("  - {}", call);
        }
    }

    let responses = network::filter_responses(&events);
    println!("✅ Found {} valid response events", responses.len());

    let body = serde_json::to_string_pretty(&responses)?;
    fs::write(output, body).with_context(|| format!("Failed to write {}", output.display()))?;
    println!("🎯 Saved filtered responses to {}", output.display());

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn crawl_args(extra: &[&str], url: &str) -> CrawlArgs {
        let mut argv = vec!["crawl-extract", "crawl", url];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Crawl(args) => args,
            _ => panic!("expected crawl"),
        }
    }

    #[tokio::test]
    async fn test_bad_selector_fails_before_any_fetch() {
        let mut server = Server::new_async().await;
        let page = server
            .mock("GET", "/")
            .with_header("content-type", "text/html")
            .with_body("<p>never fetched</p>")
            .expect(0)
            .create_async()
            .await;

        let args = crawl_args(&["--selector", "div[["], &server.url());
        let err = handle_crawl(&Settings::default(), args).await.unwrap_err();

        assert!(err.to_string().contains("Invalid CSS selector"));
        page.assert_async().await;
    }

    #[test]
    fn test_extract_css_writes_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let schema = dir.path().join("schema.json");
        let input = dir.path().join("page.html");
        let output = dir.path().join("out.json");
        fs::write(
            &schema,
            r#"{"name": "Articles", "baseSelector": "article.post", "fields": [
                {"name": "title", "selector": "h2 a", "type": "text"},
                {"name": "link", "selector": "h2 a", "type": "attribute", "attribute": "href"}
            ]}"#,
        )
        .unwrap();
        fs::write(
            &input,
            r#"<article class="post"><h2><a href="/a">A</a></h2></article>
               <article class="post"><h2><a href="/b">B</a></h2></article>"#,
        )
        .unwrap();

        assert_eq!(handle_extract_css(&schema, &input, &output).unwrap(), 0);

        let items: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(
            items,
            serde_json::json!([{"title": "A", "link": "/a"}, {"title": "B", "link": "/b"}])
        );
    }

    #[tokio::test]
    async fn test_infinite_delay_is_an_error() {
        let args = crawl_args(&["--mean-delay", "inf"], "https://example.com/");
        let err = handle_crawl(&Settings::default(), args).await.unwrap_err();
        assert!(err.to_string().contains("finite"));
    }
}
