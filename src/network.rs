// src/network.rs
// =============================================================================
// Filtering browser network captures.
//
// A capture file is what a rendering crawler exports when it records network
// traffic: either a list of page captures or a single one, each with a
// `network_requests` array of events:
//
//   {"url": "...", "network_requests": [
//       {"event_type": "request", "url": "...", "method": "GET"},
//       {"event_type": "response", "url": "...", "timestamp": 1.5,
//        "headers": {"content-type": "application/json"}, "body": {...}},
//       {"event_type": "request_failed", "url": "..."}
//   ]}
//
// We don't capture traffic ourselves. This module reads an existing capture
// and keeps the response events that carry data.
// =============================================================================

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

// A response event trimmed to the fields worth keeping
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(rename = "content-type", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureSummary {
    pub requests: usize,
    pub responses: usize,
    pub failed: usize,
    // URLs of requests that look like API calls ("api" in the URL)
    pub api_calls: Vec<String>,
}

// Pulls the network events out of a parsed capture file
//
// Accepts a list of captures (events concatenated in order) or a single
// capture object. Any other shape yields no events.
pub fn load_events(capture: &Value) -> Vec<Value> {
    match capture {
        Value::Array(entries) => entries
            .iter()
            .filter_map(network_requests)
            .flat_map(|events| events.iter().cloned())
            .collect(),
        Value::Object(_) => match network_requests(capture) {
            Some(events) => events.clone(),
            None => {
                warn!("Capture object has no network_requests array");
                Vec::new()
            }
        },
        _ => {
            warn!("Unexpected capture structure: expected a list of objects or an object with network_requests");
            Vec::new()
        }
    }
}

fn network_requests(entry: &Value) -> Option<&Vec<Value>> {
    entry.get("network_requests").and_then(Value::as_array)
}

// Keeps response events that have a body or a content-type
pub fn filter_responses(events: &[Value]) -> Vec<FilteredResponse> {
    events.iter().filter_map(filter_response).collect()
}

fn filter_response(event: &Value) -> Option<FilteredResponse> {
    if event_type(event) != Some("response") {
        return None;
    }

    let content_type = event
        .get("headers")
        .and_then(Value::as_object)
        .and_then(|headers| {
            headers
                .get("content-type")
                .or_else(|| headers.get("Content-Type"))
        })
        .filter(|v| !v.is_null())
        .cloned();

    let body = present(event, "body");
    if body.is_none() && content_type.is_none() {
        return None;
    }

    Some(FilteredResponse {
        url: present(event, "url"),
        timestamp: present(event, "timestamp"),
        body,
        content_type,
    })
}

// Counts events by type and lists the API-looking request URLs
pub fn summarize(events: &[Value]) -> CaptureSummary {
    let mut summary = CaptureSummary::default();

    for event in events {
        match event_type(event) {
            Some("request") => {
                summary.requests += 1;
                if let Some(url) = event.get("url").and_then(Value::as_str) {
                    if url.contains("api") {
                        summary.api_calls.push(url.to_string());
                    }
                }
            }
            Some("response") => summary.responses += 1,
            Some("request_failed") => summary.failed += 1,
            _ => {}
        }
    }

    summary
}

fn event_type(event: &Value) -> Option<&str> {
    event.get("event_type").and_then(Value::as_str)
}

fn present(event: &Value, key: &str) -> Option<Value> {
    event.get(key).filter(|v| !v.is_null()).cloned()
}
