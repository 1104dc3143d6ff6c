// Gemini `generateContent` client.
//
// Sends one prompt per call and extracts the concatenated text parts of the
// first candidate. `TextGenerator` wraps the client so that a missing API key
// short-circuits straight to each task's fallback string.

use anyhow::Context;
use serde_json::Value;
use tracing::{debug, warn};

use pitchside_core::config::Config;

use crate::prompt::CopyTask;

// ---------------------------------------------------------------------------
// GeminiClient
// ---------------------------------------------------------------------------

/// Low-level generative text client.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Generate a completion for `prompt`.
    ///
    /// Returns `Ok(None)` when the response carries no text.
    pub async fn generate(&self, prompt: &str) -> anyhow::Result<Option<String>> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("generateContent request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("generateContent returned status {status}");
        }

        let value: Value = response
            .json()
            .await
            .context("generateContent response was not JSON")?;
        Ok(parse_generated_text(&value))
    }
}

// ---------------------------------------------------------------------------
// TextGenerator wrapper
// ---------------------------------------------------------------------------

/// Either a configured client or a disabled stand-in.
pub enum TextGenerator {
    Active(GeminiClient),
    /// No API key configured; every task returns its `unavailable` string.
    Disabled,
}

impl TextGenerator {
    /// `Active` if a non-empty Gemini key is configured, otherwise `Disabled`.
    pub fn from_config(config: &Config) -> Self {
        match &config.credentials.gemini_api_key {
            Some(key) if !key.is_empty() => TextGenerator::Active(GeminiClient::new(
                key.clone(),
                config.llm.model.clone(),
                config.llm.base_url.clone(),
            )),
            _ => TextGenerator::Disabled,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TextGenerator::Active(_))
    }

    /// Run a copy task. Never fails; errors resolve to the task's fallbacks.
    pub async fn complete(&self, task: CopyTask) -> String {
        let client = match self {
            TextGenerator::Active(client) => client,
            TextGenerator::Disabled => return task.unavailable,
        };

        match client.generate(&task.prompt).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!("generateContent returned no text, using fallback");
                task.empty
            }
            Err(e) => {
                warn!("Text generation failed: {e:#}");
                task.failed
            }
        }
    }

    pub async fn stream_title(&self, topic: &str) -> String {
        self.complete(crate::prompt::stream_title(topic)).await
    }

    pub async fn match_prediction(&self, match_label: &str) -> String {
        self.complete(crate::prompt::match_prediction(match_label)).await
    }

    pub async fn tactical_insight(&self, stream_title: &str, tags: &[String]) -> String {
        self.complete(crate::prompt::tactical_insight(stream_title, tags))
            .await
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Extract the trimmed text of the first candidate.
///
/// Expected shape: `{ "candidates": [ { "content": { "parts": [ { "text": "..." } ] } } ] }`
pub(crate) fn parse_generated_text(v: &Value) -> Option<String> {
    let parts = v
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
