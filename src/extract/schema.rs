// src/extract/schema.rs
// =============================================================================
// Selector-schema extraction: structured data without the LLM.
//
// A schema names a base selector (one JSON object per match) and the fields
// to read inside each match:
//
//   {
//     "name": "Articles",
//     "baseSelector": "article.post",
//     "fields": [
//       {"name": "title", "selector": "h2.post-title a", "type": "text"},
//       {"name": "link", "selector": "h2.post-title a", "type": "attribute", "attribute": "href"}
//     ]
//   }
//
// A field's selector is matched inside the base element (first match wins);
// without a selector the field reads the base element itself. Fields that
// match nothing are null, or the field's "default" when one is given.
// =============================================================================

use anyhow::{bail, Context, Result};
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::html::{collapse_whitespace, parse_selector};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CssSchema {
    #[serde(default)]
    pub name: String,
    pub base_selector: String,
    pub fields: Vec<CssField>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CssField {
    pub name: String,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub attribute: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    // Whitespace-collapsed text content
    Text,
    // The value of `attribute`
    Attribute,
    // Inner HTML
    Html,
}

impl CssSchema {
    pub fn from_json(text: &str) -> Result<Self> {
        let schema: CssSchema = serde_json::from_str(text).context("Invalid extraction schema")?;
        for field in &schema.fields {
            if field.kind == FieldKind::Attribute && field.attribute.is_none() {
                bail!("Field '{}' has type attribute but no \"attribute\"", field.name);
            }
        }
        Ok(schema)
    }
}

// Selectors parsed once per run
struct CompiledField<'a> {
    field: &'a CssField,
    selector: Option<Selector>,
}

// Applies a schema to a document; one object per base element, in
// document order. Invalid selectors are errors.
pub fn extract_with_schema(html: &str, schema: &CssSchema) -> Result<Vec<Map<String, Value>>> {
    let base = parse_selector(&schema.base_selector)?;
    let fields = schema
        .fields
        .iter()
        .map(|field| {
            let selector = field.selector.as_deref().map(parse_selector).transpose()?;
            Ok(CompiledField { field, selector })
        })
        .collect::<Result<Vec<_>>>()?;

    let document = Html::parse_document(html);
    let items: Vec<Map<String, Value>> = document
        .select(&base)
        .map(|element| {
            fields
                .iter()
                .map(|compiled| (compiled.field.name.clone(), read_field(element, compiled)))
                .collect()
        })
        .collect();

    Ok(items)
}

fn read_field(base: ElementRef, compiled: &CompiledField) -> Value {
    let target = match &compiled.selector {
        Some(selector) => base.select(selector).next(),
        None => Some(base),
    };

    let field = compiled.field;
    let value = target.and_then(|element| match field.kind {
        FieldKind::Text => {
            let text = collapse_whitespace(&element.text().collect::<String>());
            (!text.is_empty()).then_some(text)
        }
        FieldKind::Attribute => field
            .attribute
            .as_deref()
            .and_then(|name| element.value().attr(name))
            .map(str::to_string),
        FieldKind::Html => Some(element.inner_html()),
    });

    match value {
        Some(value) => Value::String(value),
        None => field.default.clone().unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ARTICLES: &str = r#"{
        "name": "Articles",
        "baseSelector": "article.post",
        "fields": [
            {"name": "title", "selector": "h2.post-title a", "type": "text"},
            {"name": "link", "selector": "h2.post-title a", "type": "attribute", "attribute": "href"},
            {"name": "author", "selector": ".author", "type": "text", "default": "unknown"}
        ]
    }"#;

    const PAGE: &str = r#"<html><body>
        <article class="post"><h2 class="post-title"><a href="/one">  First
            post </a></h2><span class="author">Ann</span></article>
        <article class="post"><h2 class="post-title"><a href="/two">Second</a></h2></article>
        <article class="draft"><h2 class="post-title"><a href="/x">Hidden</a></h2></article>
    </body></html>"#;

    #[test]
    fn test_one_object_per_base_element() {
        let schema = CssSchema::from_json(ARTICLES).unwrap();
        let items = extract_with_schema(PAGE, &schema).unwrap();

        assert_eq!(schema.name, "Articles");
        assert_eq!(items.len(), 2);
        assert_eq!(
            Value::Object(items[0].clone()),
            json!({"title": "First post", "link": "/one", "author": "Ann"})
        );
        assert_eq!(items[1]["author"], "unknown");
    }

    #[test]
    fn test_field_without_selector_reads_base_element() {
        let schema = CssSchema::from_json(
            r#"{"baseSelector": "a", "fields": [
                {"name": "href", "type": "attribute", "attribute": "href"},
                {"name": "inner", "type": "html"},
                {"name": "missing", "selector": "img", "type": "attribute", "attribute": "src"}
            ]}"#,
        )
        .unwrap();
        let items = extract_with_schema(r#"<a href="/p"><b>Bold</b></a>"#, &schema).unwrap();

        assert_eq!(items[0]["href"], "/p");
        assert_eq!(items[0]["inner"], "<b>Bold</b>");
        assert_eq!(items[0]["missing"], Value::Null);
    }

    #[test]
    fn test_attribute_field_needs_attribute_name() {
        let err = CssSchema::from_json(
            r#"{"baseSelector": "a", "fields": [{"name": "x", "type": "attribute"}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("no \"attribute\""));
    }

    #[test]
    fn test_invalid_selector_is_an_error() {
        let schema = CssSchema::from_json(
            r#"{"baseSelector": "div[[", "fields": []}"#,
        )
        .unwrap();
        assert!(extract_with_schema("<div></div>", &schema).is_err());
    }
}
