// src/extract/markdown.rs
// =============================================================================
// Markdown side of the pipeline.
//
// - html_to_markdown: page/fragment HTML -> Markdown (via `htmd`)
// - split_records: a scraped corpus -> blank-line separated records
// - extract_markdown_links: links in Markdown text (via `pulldown-cmark`)
//
// pulldown-cmark parses Markdown into a stream of events (heading,
// paragraph, link, ...). It follows CommonMark and never allocates a full
// tree, which matters for the multi-megabyte corpora a deep crawl writes.
// =============================================================================

use pulldown_cmark::{Event, Parser, Tag};
use scraper::Html;

use super::html::collapse_whitespace;

// Converts HTML to Markdown
//
// htmd only fails on input it can't walk at all; in that case we fall back
// to the plain text content so the record is never lost.
pub fn html_to_markdown(html: &str) -> String {
    match htmd::convert(html) {
        Ok(markdown) => markdown.trim().to_string(),
        Err(_) => {
            let document = Html::parse_fragment(html);
            collapse_whitespace(&document.root_element().text().collect::<String>())
        }
    }
}

// Splits a scraped corpus into records
//
// Records are separated by one or more blank lines. Each record is trimmed
// and empty records are dropped. Lines made only of whitespace count as
// blank.
//
// Example:
//   "a\nb\n\n\n  c  \n\n" -> ["a\nb", "c"]
pub fn split_records(corpus: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in corpus.lines() {
        if line.trim().is_empty() {
            flush_record(&mut current, &mut records);
        } else {
            current.push(line);
        }
    }
    flush_record(&mut current, &mut records);

    records
}

fn flush_record(current: &mut Vec<&str>, records: &mut Vec<String>) {
    if current.is_empty() {
        return;
    }
    let record = current.join("\n").trim().to_string();
    if !record.is_empty() {
        records.push(record);
    }
    current.clear();
}

// Extracts all HTTP/HTTPS links from Markdown text
//
// Example input:
//   "Check out [Rust](https://www.rust-lang.org)!"
//
// Example output:
//   vec!["https://www.rust-lang.org"]
pub fn extract_markdown_links(markdown: &str) -> Vec<String> {
    let mut links = Vec::new();
    let parser = Parser::new(markdown);

    // Markdown parsing produces multiple events per link:
    // Start(Link) -> Text -> End(Link)
    let mut current_link: Option<String> = None;

    for event in parser {
        match event {
            // In pulldown-cmark 0.9, Link is Tag::Link(link_type, dest_url, title)
            Event::Start(Tag::Link(_link_type, dest_url, _title)) => {
                let url = dest_url.to_string();
                if is_http_link(&url) {
                    current_link = Some(url);
                }
            }
            Event::End(Tag::Link(..)) => {
                if let Some(url) = current_link.take() {
                    links.push(url);
                }
            }
            _ => {}
        }
    }

    links
}

// Skips mailto:, tel:, javascript:, and relative links
fn is_http_link(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_markdown_heading_and_link() {
        let md = html_to_markdown(r#"<h1>Phone</h1><p>Buy <a href="https://shop.com/p">here</a></p>"#);
        assert!(md.contains("Phone"));
        assert!(md.contains("[here](https://shop.com/p)"));
    }

    #[test]
    fn test_split_records() {
        let corpus = "a\nb\n\n\n  c  \n\n";
        assert_eq!(split_records(corpus), vec!["a\nb", "c"]);
    }

    #[test]
    fn test_split_records_whitespace_lines_are_blank() {
        let corpus = "first\n   \t\nsecond";
        assert_eq!(split_records(corpus), vec!["first", "second"]);
    }

    #[test]
    fn test_split_records_empty_corpus() {
        assert!(split_records("\n\n  \n").is_empty());
    }

    #[test]
    fn test_extract_simple_link() {
        let markdown = "Check out [Rust](https://www.rust-lang.org)!";
        let links = extract_markdown_links(markdown);
        assert_eq!(links, vec!["https://www.rust-lang.org"]);
    }

    #[test]
    fn test_extract_multiple_links() {
        let markdown = r#"
# Results

- [Phone A](https://www.daraz.com.np/products/a-i1.html)
- [Phone B](https://www.daraz.com.np/products/b-i2.html)
- [Catalog](https://www.daraz.com.np/catalog/)
        "#;
        let links = extract_markdown_links(markdown);
        assert_eq!(links.len(), 3);
        assert!(links.contains(&"https://www.daraz.com.np/catalog/".to_string()));
    }

    #[test]
    fn test_skip_mailto_and_relative_links() {
        let markdown = "Mail [us](mailto:test@example.com) or see [docs](./docs/README.md)";
        assert!(extract_markdown_links(markdown).is_empty());
    }
}
