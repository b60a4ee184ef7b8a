// src/extract/product.rs
// =============================================================================
// Product records and the selector-based pre-parse.
//
// Before asking the LLM about a product card we pull out whatever plain
// CSS selectors can find (link, photo, title, price, location). The model
// is told about these values and only has to fill the gaps; when it
// returns null for a field we already know, our value wins.
// =============================================================================

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::html::collapse_whitespace;

// Field names, in the order the prompts list them
pub const PRODUCT_FIELDS: &[&str] = &[
    "url",
    "photo",
    "title",
    "price",
    "units_sold",
    "rating",
    "location",
];

// Class names the Daraz listing uses for price and seller location
const PRICE_SELECTOR: &str = "span.ooOxS";
const LOCATION_SELECTOR: &str = "span.oa6ri";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub url: Option<String>,
    pub photo: Option<String>,
    pub title: Option<String>,
    pub price: Option<String>,
    pub units_sold: Option<i64>,
    pub rating: Option<f64>,
    pub location: Option<String>,
}

// Fills what it can from a product card's HTML
//
// - url: first <a href>, protocol-relative links get "https:"
// - photo: first <img src>
// - title: first <a title="...">
// - price / location: text of the listing's price and location spans
//
// Units sold and rating are rarely explicit in the markup; they're left
// for the model.
pub fn prefill_product(fragment: &str) -> ProductRecord {
    let document = Html::parse_fragment(fragment);

    let url = first_attr(&document, "a[href]", "href").map(|href| {
        if href.starts_with("//") {
            format!("https:{}", href)
        } else {
            href
        }
    });

    ProductRecord {
        url,
        photo: first_attr(&document, "img[src]", "src"),
        title: first_attr(&document, "a[title]", "title"),
        price: first_text(&document, PRICE_SELECTOR),
        units_sold: None,
        rating: None,
        location: first_text(&document, LOCATION_SELECTOR),
    }
}

// Merges the model's answer over the pre-parsed record
//
// For every product field: the model's value if present and not null,
// otherwise the pre-parsed one. Keys the model invents are dropped.
pub fn merge_with_prefill(prefill: &ProductRecord, answer: &Value) -> Map<String, Value> {
    let known = match serde_json::to_value(prefill) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };

    let mut merged = Map::new();
    for field in PRODUCT_FIELDS {
        let from_model = answer.get(*field).filter(|v| !is_blank(v)).cloned();
        let value = from_model
            .or_else(|| known.get(*field).cloned())
            .unwrap_or(Value::Null);
        merged.insert(field.to_string(), value);
    }
    merged
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn first_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .find_map(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CARD: &str = r#"
        <div class="Ms6aG">
          <a href="//www.daraz.com.np/products/redmi-i1.html" title="Redmi Note 13">
            <img src="https://static.daraz.com/redmi.jpg">
          </a>
          <span class="ooOxS">Rs. 25,999</span>
          <span class="oa6ri"> Bagmati </span>
        </div>"#;

    #[test]
    fn test_prefill_from_card() {
        let record = prefill_product(CARD);
        assert_eq!(
            record.url.as_deref(),
            Some("https://www.daraz.com.np/products/redmi-i1.html")
        );
        assert_eq!(record.photo.as_deref(), Some("https://static.daraz.com/redmi.jpg"));
        assert_eq!(record.title.as_deref(), Some("Redmi Note 13"));
        assert_eq!(record.price.as_deref(), Some("Rs. 25,999"));
        assert_eq!(record.location.as_deref(), Some("Bagmati"));
        assert_eq!(record.rating, None);
    }

    #[test]
    fn test_prefill_on_plain_text_is_empty() {
        assert_eq!(prefill_product("just some words"), ProductRecord::default());
    }

    #[test]
    fn test_merge_prefers_model_but_keeps_known_values() {
        let prefill = prefill_product(CARD);
        let answer = json!({
            "title": "Redmi Note 13 (8GB)",
            "price": null,
            "rating": 4.5,
            "units_sold": 120,
            "location": "",
            "made_up": "dropped"
        });

        let merged = merge_with_prefill(&prefill, &answer);

        assert_eq!(merged["title"], json!("Redmi Note 13 (8GB)"));
        assert_eq!(merged["price"], json!("Rs. 25,999"));
        assert_eq!(merged["location"], json!("Bagmati"));
        assert_eq!(merged["rating"], json!(4.5));
        assert_eq!(merged["units_sold"], json!(120));
        assert!(!merged.contains_key("made_up"));
        assert_eq!(merged.len(), PRODUCT_FIELDS.len());
    }
}
