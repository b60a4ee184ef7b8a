// src/config.rs
// =============================================================================
// Runtime settings read from the process environment.
//
// Everything that is a secret or differs between machines lives here:
// - GEMINI_API_TOKEN: API key for the Gemini endpoint (only the extract
//   commands need it)
// - GEMINI_MODEL / GEMINI_BASE_URL: which model to call and where
// - CRAWL_USER_AGENT / CRAWL_TIMEOUT_SECS: HTTP client knobs
//
// A `.env` file in the working directory is loaded first (via dotenvy), so
// the token can be kept out of shell history.
//
// Per-run values (target URLs, batch sizes, delays) are CLI flags instead.
// =============================================================================

use anyhow::{anyhow, Result};
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_token: Option<String>,
    pub model: String,
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_token: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: default_user_agent(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    // Loads `.env` (if present) and then reads the environment.
    // Never fails: a missing token only matters to commands that call the LLM.
    pub fn from_env() -> Self {
        // A missing .env file is the normal case
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    // Builds settings from any key lookup. Split out so tests don't have to
    // mutate the real process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let timeout = non_empty("CRAWL_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        Self {
            api_token: non_empty("GEMINI_API_TOKEN"),
            model: non_empty("GEMINI_MODEL").unwrap_or(defaults.model),
            base_url: non_empty("GEMINI_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            user_agent: non_empty("CRAWL_USER_AGENT").unwrap_or(defaults.user_agent),
            timeout,
        }
    }

    // The extract commands call this before doing any work
    pub fn require_api_token(&self) -> Result<&str> {
        self.api_token
            .as_deref()
            .ok_or_else(|| anyhow!("GEMINI_API_TOKEN environment variable not set (add it to .env)"))
    }
}

fn default_user_agent() -> String {
    format!("crawl-extract/{}", env!("CARGO_PKG_VERSION"))
}
