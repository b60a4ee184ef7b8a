// src/extract/sink.rs
// =============================================================================
// Writing model answers to disk.
//
// Answers are appended to a JSONL file, one record per line. When an answer
// isn't valid JSON the batch is NOT dropped: the raw text is written
// instead (either verbatim or wrapped in {"batch": n, "raw": ...}), so a
// bad batch can be fixed by hand later.
//
// The sink is the only writer of its file. Pipelines feed it batches in
// order from a single task.
// =============================================================================

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::export::write_csv;

// What to write when an answer doesn't parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    // The trimmed raw text, followed by a newline
    RawText,
    // {"batch": <n>, "raw": "<raw text>"} on one line
    Wrapped { batch: usize },
}

// What happened to one batch's answer
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    // Parsed; the values written (array elements, or the single value)
    Parsed(Vec<Value>),
    // Didn't parse; raw text written per the fallback
    Raw,
}

pub struct JsonlSink {
    path: PathBuf,
    file: File,
}

impl JsonlSink {
    // Opens `path` for appending (creating it if needed)
    pub fn append_to(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {} for appending", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Writes one model answer
    //
    // - JSON array: one line per element
    // - any other JSON value: one line
    // - not JSON: the fallback
    pub fn append_response(&mut self, raw: &str, fallback: Fallback) -> Result<BatchOutcome> {
        let trimmed = strip_code_fence(raw.trim());

        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Array(items)) => {
                for item in &items {
                    self.write_line(&item.to_string())?;
                }
                Ok(BatchOutcome::Parsed(items))
            }
            Ok(value) => {
                self.write_line(&value.to_string())?;
                Ok(BatchOutcome::Parsed(vec![value]))
            }
            Err(_) => {
                match fallback {
                    Fallback::RawText => self.write_line(raw.trim())?,
                    Fallback::Wrapped { batch } => {
                        let wrapped = json!({ "batch": batch, "raw": raw.trim() });
                        self.write_line(&wrapped.to_string())?;
                    }
                }
                Ok(BatchOutcome::Raw)
            }
        }
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.file, "{}", line)
            .with_context(|| format!("Failed to write to {}", self.path.display()))
    }
}

// Models sometimes wrap JSON in ```json fences despite the mime type
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

// Writes a parsed table's rows to `<dir>/table_<index>.csv`
//
// `table` is one element of the table prompt's answer:
//   {"table_index": 3, "headers": [...], "rows": [{...}, ...]}
// Columns are the declared headers followed by any extra keys found in the
// rows (in first-seen order). Returns the file written, or None when the
// table has no rows.
pub fn write_table_csv(dir: &Path, table: &Value, fallback_index: usize) -> Result<Option<(PathBuf, usize)>> {
    let rows = match table.get("rows").and_then(Value::as_array) {
        Some(rows) if !rows.is_empty() => rows,
        _ => return Ok(None),
    };

    let index = table
        .get("table_index")
        .and_then(Value::as_u64)
        .map(|i| i as usize)
        .unwrap_or(fallback_index);

    let mut columns: Vec<String> = table
        .get("headers")
        .and_then(Value::as_array)
        .map(|headers| headers.iter().map(cell_text).collect())
        .unwrap_or_default();

    for row in rows {
        if let Some(object) = row.as_object() {
            for key in object.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
    }

    let records: Vec<Vec<String>> = rows
        .iter()
        .map(|row| match row {
            Value::Object(object) => columns
                .iter()
                .map(|c| object.get(c).map(cell_text).unwrap_or_default())
                .collect(),
            // A row given as a plain array is written positionally
            Value::Array(cells) => cells.iter().map(cell_text).collect(),
            other => vec![cell_text(other)],
        })
        .collect();

    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(format!("table_{}.csv", index));
    write_csv(&path, &columns, &records)?;

    Ok(Some((path, records.len())))
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
