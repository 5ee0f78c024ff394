//! Gemini adapter for scene generation, alignment and repair.
//!
//! Uses the `generateContent` REST endpoint directly.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cleaner::{clean_scene_code, split_response};
use super::prompts::{alignment_prompt, generation_prompt, repair_prompt};
use super::{Generated, Generator};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini REST client
pub struct GeminiClient {
    /// API key
    api_key: String,
    /// Model name, e.g. `gemini-1.5-flash`
    model: String,
    /// Endpoint root (overridable for tests and proxies)
    base_url: String,
    /// HTTP client
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
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

impl GenerateResponse {
    /// Concatenated text of the first candidate
    fn text(self) -> Result<String> {
        let candidate = match self.candidates.into_iter().next() {
            Some(c) => c,
            None => anyhow::bail!(
                "Gemini returned no candidates (prompt feedback: {})",
                self.prompt_feedback
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| "none".to_string())
            ),
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            anyhow::bail!(
                "Gemini returned an empty response (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            );
        }

        Ok(text)
    }
}

impl GeminiClient {
    /// Create a new client
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: API_BASE.to_string(),
            client,
        })
    }

    /// Point the client at a different endpoint root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Model in use
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    /// Send one prompt and return the response text
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        debug!(model = %self.model, prompt_bytes = prompt.len(), "Calling Gemini");

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .context("Failed to reach Gemini")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error {}: {}", status, body.trim());
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse Gemini response")?;

        parsed.text()
    }

    /// List models to verify the key works
    pub async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url.trim_end_matches('/')))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .context("Failed to reach Gemini")?;

        if !response.status().is_success() {
            anyhow::bail!("Gemini health check failed: {}", response.status());
        }
        Ok(())
    }
}

#[async_trait]
impl Generator for GeminiClient {
    async fn generate(&self, topic: &str) -> Result<Generated> {
        let response = self.complete(&generation_prompt(topic)).await?;
        let (code, narration) = split_response(&response);

        Ok(Generated {
            artifact: clean_scene_code(&code),
            narration,
        })
    }

    async fn align(&self, artifact: &str) -> Result<String> {
        let response = self.complete(&alignment_prompt(artifact)).await?;
        Ok(clean_scene_code(&response))
    }

    async fn repair(&self, artifact: &str, error: &str, topic: &str) -> Result<String> {
        let response = self.complete(&repair_prompt(artifact, error, topic)).await?;
        Ok(clean_scene_code(&response))
    }
}
