//! Narration audio via an OpenAI-style `/v1/audio/speech` endpoint.

use std::path::Path;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::collab::SpeechSynthesizer;
use crate::error::CollabError;

pub struct HttpSpeechSynthesizer {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    voice: String,
}

impl HttpSpeechSynthesizer {
    /// `endpoint` is the service base URL, e.g. `http://localhost:8880`.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            voice: voice.into(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, narration: &str, out_path: &Path) -> Result<(), CollabError> {
        if narration.trim().is_empty() {
            return Err(CollabError::Malformed("empty narration text".to_owned()));
        }

        let url = format!("{}/v1/audio/speech", self.endpoint.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .json(&json!({
                "model": self.model,
                "voice": self.voice,
                "input": narration,
                "response_format": "mp3",
            }))
            .send()
            .await
            .map_err(CollabError::service)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CollabError::Malformed(format!(
                "speech service returned {status}: {body}"
            )));
        }

        let audio = response.bytes().await.map_err(CollabError::service)?;
        if audio.is_empty() {
            return Err(CollabError::EmptyOutput);
        }

        tokio::fs::write(out_path, &audio)
            .await
            .map_err(CollabError::service)?;

        debug!(path = %out_path.display(), bytes = audio.len(), "narration audio written");
        Ok(())
    }
}
