// src/extract/llm.rs
// =============================================================================
// Client for the hosted LLM (Google Gemini, generateContent endpoint).
//
// One request per batch, no retries: if a call fails the pipeline records
// the batch as failed and moves on. The endpoint is asked to answer with
// `application/json`, which makes the model return bare JSON instead of a
// fenced code block most of the time. The caller still has to parse it.
// =============================================================================

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Settings;

// Anything that turns a prompt into (hopefully) JSON text
//
// The pipelines are generic over this so tests can script the answers.
pub trait LanguageModel {
    async fn generate_json(&self, prompt: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: Option<f32>,
}

impl GeminiClient {
    // Builds a client from settings; fails when GEMINI_API_TOKEN is missing
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_api_token()?.to_string();

        // LLM calls over large batches take far longer than page fetches
        let client = Client::builder()
            .timeout(settings.timeout.max(std::time::Duration::from_secs(120)))
            .build()
            .context("Failed to create HTTP client for Gemini")?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            api_key,
            temperature: None,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

impl LanguageModel for GeminiClient {
    async fn generate_json(&self, prompt: &str) -> Result<String> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature: self.temperature,
            },
        };

        debug!(model = %self.model, prompt_chars = prompt.len(), "Calling generateContent");

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .context("Failed to call Gemini generateContent")?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("Gemini returned {}: {}", status, text);
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .context("Failed to parse Gemini response")?;

        let text = parsed.text();
        if text.trim().is_empty() {
            if let Some(feedback) = &parsed.prompt_feedback {
                warn!("Prompt feedback: {}", feedback);
            }
            bail!("Gemini returned no text");
        }

        Ok(text)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    // Concatenated text parts of the first candidate
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}
