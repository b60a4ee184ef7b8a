// src/extract/pipeline.rs
// =============================================================================
// The three extraction runs behind `extract products|tables`.
//
// All of them follow the same shape:
// 1. Split the scraped corpus into records (product cards or tables)
// 2. Group records into batches and build one prompt per batch
// 3. Send prompts to the model, at most `concurrency` at a time
// 4. Write each answer as it comes back, IN BATCH ORDER, from this task
//
// Step 3 uses `buffered` (not `buffer_unordered`): calls overlap, but the
// answers are handed back in the order the batches were created, so the
// output file reads the same no matter how fast each call returned.
//
// A failed call is logged and counted; the run keeps going.
// =============================================================================

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

use super::batch::{chunk, TokenBudget};
use super::html::{clean_html, extract_tables};
use super::llm::LanguageModel;
use super::markdown::{html_to_markdown, split_records};
use super::product::{merge_with_prefill, prefill_product};
use super::prompt::{
    hinted_product_prompt, product_batch_prompt, table_batch_prompt, PRODUCT_DELIMITER,
    TABLE_DELIMITER,
};
use super::sink::{strip_code_fence, write_table_csv, BatchOutcome, Fallback, JsonlSink};

// Counters reported at the end of a run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractStats {
    // Batches sent to the model
    pub batches: usize,
    // Records written as parsed JSON
    pub records: usize,
    // Batches whose answer didn't parse (written raw)
    pub raw_fallbacks: usize,
    // Batches whose call failed outright
    pub failed: usize,
    // Inputs never sent (too large for the token budget)
    pub skipped: usize,
}

impl ExtractStats {
    pub fn had_failures(&self) -> bool {
        self.failed > 0 || self.raw_fallbacks > 0 || self.skipped > 0
    }
}

#[derive(Debug, Clone)]
pub struct ProductOptions {
    pub batch_size: usize,
    pub concurrency: usize,
}

impl Default for ProductOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            concurrency: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableOptions {
    pub max_tokens: usize,
    pub concurrency: usize,
    // Where table_<n>.csv files go; None = no CSV output
    pub csv_dir: Option<PathBuf>,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            max_tokens: 100_000,
            concurrency: 1,
            csv_dir: None,
        }
    }
}

// Batch extraction of product records into a JSONL file
//
// Records are the blank-line separated blocks of the corpus, each converted
// from HTML to Markdown, `batch_size` per prompt.
pub async fn extract_products<M: LanguageModel>(
    model: &M,
    corpus: &str,
    sink: &mut JsonlSink,
    options: &ProductOptions,
) -> Result<ExtractStats> {
    let records: Vec<String> = split_records(corpus)
        .iter()
        .map(|r| html_to_markdown(r))
        .collect();

    let mut stats = ExtractStats::default();
    if records.is_empty() {
        warn!("No product records found in corpus");
        return Ok(stats);
    }

    let batches = chunk(&records, options.batch_size)?;
    info!(
        records = records.len(),
        batches = batches.len(),
        "Starting product extraction into {}",
        sink.path().display()
    );

    let prompts: Vec<(usize, usize, String)> = batches
        .iter()
        .enumerate()
        .map(|(i, batch)| (i + 1, batch.len(), product_batch_prompt(&batch.join(PRODUCT_DELIMITER))))
        .collect();

    let mut answers = stream::iter(prompts)
        .map(|(number, size, prompt)| async move {
            (number, size, model.generate_json(&prompt).await)
        })
        .buffered(options.concurrency.max(1));

    while let Some((number, size, answer)) = answers.next().await {
        stats.batches += 1;
        match answer {
            Ok(raw) => match sink.append_response(&raw, Fallback::RawText)? {
                BatchOutcome::Parsed(values) => {
                    stats.records += values.len();
                    println!(
                        "✅ Batch {} complete ({} records in, {} products out)",
                        number,
                        size,
                        values.len()
                    );
                }
                BatchOutcome::Raw => {
                    stats.raw_fallbacks += 1;
                    warn!("Batch {}: failed to parse JSON, wrote raw text instead", number);
                }
            },
            Err(e) => {
                stats.failed += 1;
                warn!("Batch {} failed: {:#}", number, e);
            }
        }
    }

    Ok(stats)
}

// One call per product card, with selector-prefilled fields
//
// Output is a single JSON array (pretty-printed) at `output`. A card whose
// call fails, or whose answer doesn't parse, is written with just the
// prefilled fields.
pub async fn extract_products_hinted<M: LanguageModel>(
    model: &M,
    corpus: &str,
    output: &std::path::Path,
    concurrency: usize,
) -> Result<ExtractStats> {
    let records = split_records(corpus);
    let mut stats = ExtractStats::default();

    let jobs: Vec<_> = records
        .iter()
        .map(|record| {
            let prefill = prefill_product(record);
            let prompt = hinted_product_prompt(record, &prefill);
            (prefill, prompt)
        })
        .collect();

    let mut answers = stream::iter(jobs)
        .map(|(prefill, prompt)| async move {
            let answer = model.generate_json(&prompt).await;
            (prefill, answer)
        })
        .buffered(concurrency.max(1));

    let mut products = Vec::with_capacity(records.len());
    while let Some((prefill, answer)) = answers.next().await {
        stats.batches += 1;
        let parsed = answer.and_then(|raw| {
            serde_json::from_str::<Value>(strip_code_fence(raw.trim()))
                .context("answer is not valid JSON")
        });

        let answer_object = match parsed {
            // Some models wrap the single object in an array
            Ok(Value::Array(items)) => items.into_iter().next().unwrap_or(Value::Null),
            Ok(value) => value,
            Err(e) => {
                stats.failed += 1;
                warn!("Failed to process product: {:#}", e);
                Value::Null
            }
        };

        if !answer_object.is_null() {
            stats.records += 1;
        }
        products.push(Value::Object(merge_with_prefill(&prefill, &answer_object)));
    }

    let body = serde_json::to_string_pretty(&products)?;
    fs::write(output, body).with_context(|| format!("Failed to write {}", output.display()))?;

    Ok(stats)
}

// Table extraction: every <table> in the corpus, packed by token budget
//
// Answers go to the JSONL sink; unparseable answers are wrapped as
// {"batch": n, "raw": ...}. Each parsed table with rows also gets a CSV
// when `csv_dir` is set.
pub async fn extract_table_data<M: LanguageModel>(
    model: &M,
    corpus: &str,
    sink: &mut JsonlSink,
    options: &TableOptions,
) -> Result<ExtractStats> {
    let cleaned = clean_html(corpus);
    let tables = extract_tables(&cleaned);
    println!("🔍 Found {} tables (including nested).", tables.len());

    let mut stats = ExtractStats::default();
    if tables.is_empty() {
        return Ok(stats);
    }

    let packed = TokenBudget::new(options.max_tokens).pack(tables);
    for (index, tokens) in &packed.skipped {
        warn!("Table {} too large ({} tokens), skipping", index, tokens);
    }
    stats.skipped = packed.skipped.len();

    let prompts: Vec<_> = packed
        .batches
        .into_iter()
        .enumerate()
        .map(|(i, batch)| {
            let prompt = table_batch_prompt(&batch.items.join(TABLE_DELIMITER));
            (i + 1, batch.first_index, batch.items.len(), prompt)
        })
        .collect();

    let mut answers = stream::iter(prompts)
        .map(|(number, first_index, size, prompt)| async move {
            println!("🚀 Sending batch {} with {} tables", number, size);
            (number, first_index, model.generate_json(&prompt).await)
        })
        .buffered(options.concurrency.max(1));

    while let Some((number, first_index, answer)) = answers.next().await {
        stats.batches += 1;
        let raw = match answer {
            Ok(raw) => raw,
            Err(e) => {
                stats.failed += 1;
                warn!("Model call failed for batch {}: {:#}", number, e);
                continue;
            }
        };

        match sink.append_response(&raw, Fallback::Wrapped { batch: number })? {
            BatchOutcome::Parsed(tables) => {
                stats.records += tables.len();
                if let Some(dir) = &options.csv_dir {
                    for (offset, table) in tables.iter().enumerate() {
                        if let Some((path, rows)) = write_table_csv(dir, table, first_index + offset)? {
                            println!("✅ Saved {} ({} rows)", path.display(), rows);
                        }
                    }
                }
            }
            BatchOutcome::Raw => {
                stats.raw_fallbacks += 1;
                warn!("Batch {}: JSON parse failed, wrote raw answer", number);
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Mutex;
    use tempfile::tempdir;

    // Answers prompts from a script, in call order, and records the prompts
    struct ScriptedModel {
        answers: Mutex<Vec<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(answers: Vec<Result<String>>) -> Self {
            let mut answers = answers;
            answers.reverse();
            Self {
                answers: Mutex::new(answers),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    impl LanguageModel for ScriptedModel {
        async fn generate_json(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.answers
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(anyhow!("no scripted answer left")))
        }
    }

    #[tokio::test]
    async fn test_products_batches_and_fallback() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("products.jsonl");
        let mut sink = JsonlSink::append_to(&path).unwrap();

        let corpus = "<p>Phone A</p>\n\n<p>Phone B</p>\n\n<p>Phone C</p>\n";
        let model = ScriptedModel::new(vec![
            Ok(r#"[{"title":"Phone A"},{"title":"Phone B"}]"#.to_string()),
            Ok("not json at all".to_string()),
        ]);
        let options = ProductOptions {
            batch_size: 2,
            concurrency: 1,
        };

        let stats = extract_products(&model, corpus, &mut sink, &options)
            .await
            .unwrap();

        assert_eq!(
            stats,
            ExtractStats {
                batches: 2,
                records: 2,
                raw_fallbacks: 1,
                failed: 0,
                skipped: 0
            }
        );
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "{\"title\":\"Phone A\"}\n{\"title\":\"Phone B\"}\nnot json at all\n"
        );

        let prompts = model.prompts();
        assert!(prompts[0].contains("Phone A\n\n---PRODUCT-SEPARATOR---\n\nPhone B"));
        assert!(prompts[1].contains("Phone C"));
        assert!(!prompts[1].contains("Phone A"));
    }

    #[tokio::test]
    async fn test_products_failed_call_is_counted_not_fatal() {
        let dir = tempdir().unwrap();
        let mut sink = JsonlSink::append_to(&dir.path().join("p.jsonl")).unwrap();
        let model = ScriptedModel::new(vec![Err(anyhow!("network down"))]);

        let stats = extract_products(&model, "only record", &mut sink, &ProductOptions::default())
            .await
            .unwrap();

        assert_eq!(stats.failed, 1);
        assert!(stats.had_failures());
    }

    #[tokio::test]
    async fn test_products_empty_corpus_makes_no_calls() {
        let dir = tempdir().unwrap();
        let mut sink = JsonlSink::append_to(&dir.path().join("p.jsonl")).unwrap();
        let model = ScriptedModel::new(vec![]);

        let stats = extract_products(&model, "\n\n", &mut sink, &ProductOptions::default())
            .await
            .unwrap();

        assert_eq!(stats, ExtractStats::default());
        assert!(model.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_hinted_products_merge_and_fallback() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("products.json");
        let corpus = concat!(
            r#"<div><a href="//shop.com/p1" title="Phone One">x</a><span class="ooOxS">Rs. 10</span></div>"#,
            "\n\n",
            r#"<div><a href="https://shop.com/p2" title="Phone Two">y</a></div>"#,
        );
        let model = ScriptedModel::new(vec![
            Ok(r#"{"rating": 4.2, "price": null}"#.to_string()),
            Err(anyhow!("timeout")),
        ]);

        let stats = extract_products_hinted(&model, corpus, &output, 1)
            .await
            .unwrap();

        assert_eq!(stats.batches, 2);
        assert_eq!(stats.records, 1);
        assert_eq!(stats.failed, 1);

        let products: Vec<Value> =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0]["url"], "https://shop.com/p1");
        assert_eq!(products[0]["price"], "Rs. 10");
        assert_eq!(products[0]["rating"], 4.2);
        assert_eq!(products[1]["title"], "Phone Two");
        assert!(products[1]["rating"].is_null());
    }

    #[tokio::test]
    async fn test_hinted_fenced_answer_is_a_record() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("products.json");
        let model = ScriptedModel::new(vec![Ok(
            "```json\n{\"rating\": 3.5}\n```".to_string(),
        )]);

        let stats = extract_products_hinted(&model, "<div>Phone</div>", &output, 1)
            .await
            .unwrap();

        assert_eq!(stats.records, 1);
        assert_eq!(stats.failed, 0);
        let products: Vec<Value> =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(products[0]["rating"], 3.5);
    }

    #[tokio::test]
    async fn test_tables_write_jsonl_and_csv() {
        let dir = tempdir().unwrap();
        let jsonl = dir.path().join("tables.jsonl");
        let csv_dir = dir.path().join("csv");
        let mut sink = JsonlSink::append_to(&jsonl).unwrap();

        let corpus = "<!-- Tables from: https://misumi.example/p -->\n\
                      <table><tr><th>Part</th></tr><tr><td>SFJ3</td></tr></table>\n\n\
                      <script>var x = '<table></table>';</script>";
        let model = ScriptedModel::new(vec![Ok(
            r#"[{"table_index": 1, "headers": ["Part"], "rows": [{"Part": "SFJ3"}]}]"#.to_string(),
        )]);
        let options = TableOptions {
            csv_dir: Some(csv_dir.clone()),
            ..TableOptions::default()
        };

        let stats = extract_table_data(&model, corpus, &mut sink, &options)
            .await
            .unwrap();

        assert_eq!(stats.batches, 1);
        assert_eq!(stats.records, 1);
        assert_eq!(model.prompts().len(), 1);
        assert_eq!(
            fs::read_to_string(csv_dir.join("table_1.csv")).unwrap(),
            "Part\nSFJ3\n"
        );
        assert_eq!(fs::read_to_string(&jsonl).unwrap().lines().count(), 1);
    }

    #[tokio::test]
    async fn test_tables_unparseable_answer_is_wrapped() {
        let dir = tempdir().unwrap();
        let jsonl = dir.path().join("tables.jsonl");
        let mut sink = JsonlSink::append_to(&jsonl).unwrap();
        let model = ScriptedModel::new(vec![Ok("oops".to_string())]);

        let stats = extract_table_data(
            &model,
            "<table><tr><td>1</td></tr></table>",
            &mut sink,
            &TableOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(stats.raw_fallbacks, 1);
        let line: Value = serde_json::from_str(fs::read_to_string(&jsonl).unwrap().trim()).unwrap();
        assert_eq!(line["batch"], 1);
        assert_eq!(line["raw"], "oops");
    }
}
