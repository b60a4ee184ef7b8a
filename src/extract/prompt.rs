// src/extract/prompt.rs
// =============================================================================
// Extraction prompts.
//
// The output shape lives entirely in these strings: the model is asked for
// a JSON array and the endpoint is told to answer with application/json,
// but nothing enforces a schema on what comes back. The sink copes with
// whatever arrives.
// =============================================================================

use super::product::{ProductRecord, PRODUCT_FIELDS};

pub const PRODUCT_DELIMITER: &str = "\n\n---PRODUCT-SEPARATOR---\n\n";
pub const TABLE_DELIMITER: &str = "\n\n---TABLE-SEPARATOR---\n\n";

// Prompt for a batch of product records joined with PRODUCT_DELIMITER
pub fn product_batch_prompt(records: &str) -> String {
    format!(
        r#"You are an expert product data extraction system.
Each product record is separated by the text '---PRODUCT-SEPARATOR---'.

For EACH record, extract the following fields if available:
- url: URL of the product page
- photo: URL of the main product photo
- title: name or title of the product
- price: product price including currency (as string)
- units_sold: number of units sold (integer, if found)
- rating: average customer rating (float, if found)
- location: seller or shipping location

Return ONLY a single valid JSON array of objects, like:
[
  {{
    "url": "...",
    "photo": "...",
    "title": "...",
    "price": "...",
    "units_sold": 100,
    "rating": 4.5,
    "location": "Kathmandu"
  }}
]

If a field is not found, set it to null.
Do not include any explanations, markdown, or extra text.

Raw Product Records:
{records}
"#
    )
}

// Prompt for a single product card, with the fields we already know
pub fn hinted_product_prompt(record: &str, known: &ProductRecord) -> String {
    let known_json = serde_json::to_string_pretty(known).unwrap_or_else(|_| "{}".to_string());
    let fields: String = PRODUCT_FIELDS
        .iter()
        .map(|f| format!("- {}\n", f))
        .collect();

    format!(
        r#"Extract the following fields from the content and return JSON only:
{fields}
Some fields may already be known:
{known_json}

If a field is not found, set it to null. Do not add extra text.

Content:
```html
{record}
```
"#
    )
}

// Prompt for a batch of <table> elements joined with TABLE_DELIMITER
pub fn table_batch_prompt(tables: &str) -> String {
    format!(
        r#"You are a professional HTML table parser.
Below are multiple HTML <table> elements separated by '---TABLE-SEPARATOR---'.

Instructions:
- Parse each table accurately into structured JSON.
- Resolve rowspan and colspan by repeating merged values.
- Handle nested tables (expand inline logically).
- Replace missing or blank cells with null.
- Include header names if possible.
- Output a JSON array of tables, each with:
  {{
    "table_index": <integer>,
    "headers": ["Header1", "Header2", ...],
    "rows": [{{"Header1": "Value1", "Header2": "Value2"}}, ...]
  }}

Do not include any text or explanation outside the JSON.

Tables:
{tables}
"#
    )
}
