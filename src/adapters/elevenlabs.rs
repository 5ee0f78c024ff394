//! ElevenLabs text-to-speech adapter.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::SpeechSynthesizer;
use crate::storage::{unique_path, write_atomic};

const API_BASE: &str = "https://api.elevenlabs.io/v1";

/// ElevenLabs REST client writing mp3 files into `audio_dir`
pub struct ElevenLabsClient {
    api_key: String,
    voice_id: String,
    model_id: String,
    audio_dir: PathBuf,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

impl ElevenLabsClient {
    pub fn new(
        api_key: impl Into<String>,
        voice_id: impl Into<String>,
        model_id: impl Into<String>,
        audio_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            api_key: api_key.into(),
            voice_id: voice_id.into(),
            model_id: model_id.into(),
            audio_dir: audio_dir.into(),
            base_url: API_BASE.to_string(),
            client,
        })
    }

    /// Point the client at a different endpoint root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Directory receiving synthesized audio
    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/text-to-speech/{}",
            self.base_url.trim_end_matches('/'),
            self.voice_id
        )
    }

    /// Fetch the account's voices to verify the key works
    pub async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/voices", self.base_url.trim_end_matches('/')))
            .header("xi-api-key", &self.api_key)
            .send()
            .await
            .context("Failed to reach ElevenLabs")?;

        if !response.status().is_success() {
            anyhow::bail!("ElevenLabs health check failed: {}", response.status());
        }
        Ok(())
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize(&self, text: &str) -> Result<PathBuf> {
        if text.trim().is_empty() {
            anyhow::bail!("Nothing to synthesize: narration is empty");
        }

        debug!(voice = %self.voice_id, chars = text.len(), "Calling ElevenLabs");

        let response = self
            .client
            .post(self.endpoint())
            .header("xi-api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&SpeechRequest {
                text,
                model_id: &self.model_id,
            })
            .send()
            .await
            .context("Failed to reach ElevenLabs")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("ElevenLabs API error {}: {}", status, body.trim());
        }

        let audio = response
            .bytes()
            .await
            .context("Failed to read ElevenLabs audio")?;
        if audio.is_empty() {
            anyhow::bail!("ElevenLabs returned no audio");
        }

        let path = unique_path(&self.audio_dir, "audio", "mp3");
        write_atomic(&path, &audio).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ElevenLabsClient {
        ElevenLabsClient::new(
            "key",
            "21m00Tcm4TlvDq8ikWAM",
            "eleven_multilingual_v2",
            "/tmp/audio",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(
            client().endpoint(),
            "https://api.elevenlabs.io/v1/text-to-speech/21m00Tcm4TlvDq8ikWAM"
        );
    }

    #[tokio::test]
    async fn test_empty_text_rejected_without_network() {
        let client = client().with_base_url("http://127.0.0.1:9");
        let err = client.synthesize("   ").await.unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
