// src/crawl/checkpoint.rs
// =============================================================================
// Saving crawl progress so an interrupted crawl can be resumed.
//
// The state file is a JSON array of records, rewritten as a whole on every
// save (via a temporary file and a rename, so a crash mid-write leaves the
// previous state intact). Saves happen every `every` records, when the
// crawl fails and when it ends.
// =============================================================================

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::fetch::CrawlResult;
use crate::links::{normalize_url, DEFAULT_TRACKING_PARAMS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub url: String,
    pub depth: usize,
    pub score: f64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub markdown: String,
}

impl From<&CrawlResult> for CheckpointRecord {
    fn from(result: &CrawlResult) -> Self {
        Self {
            url: result.url.clone(),
            depth: result.metadata.depth,
            score: result.metadata.score,
            title: result.metadata.title.clone(),
            markdown: result.markdown.clone(),
        }
    }
}

pub struct Checkpoint {
    path: PathBuf,
    records: Vec<CheckpointRecord>,
    every: usize,
}

impl Checkpoint {
    // Loads saved records; a missing file is a fresh start
    pub fn load(path: &Path, every: usize) -> Result<Self> {
        let records = if path.exists() {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read crawl state {}", path.display()))?;
            let records: Vec<CheckpointRecord> = serde_json::from_str(&text)
                .with_context(|| format!("Crawl state {} is corrupt", path.display()))?;
            info!("Loaded {} previously saved results", records.len());
            records
        } else {
            info!("No previous crawl state found. Starting fresh.");
            Vec::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            records,
            every,
        })
    }

    pub fn records(&self) -> &[CheckpointRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // Normalized URLs of every saved record, for resuming
    pub fn crawled_urls(&self) -> HashSet<String> {
        self.records
            .iter()
            .map(|r| normalize_url(&r.url, DEFAULT_TRACKING_PARAMS))
            .collect()
    }

    // Adds a record; saves when the count reaches a multiple of `every`
    //
    // Returns whether a save happened.
    pub fn push(&mut self, record: CheckpointRecord) -> Result<bool> {
        self.records.push(record);
        if self.every > 0 && self.records.len() % self.every == 0 {
            self.save()?;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.records)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        info!("Saved {} results to {}", self.records.len(), self.path.display());
        Ok(())
    }
}
