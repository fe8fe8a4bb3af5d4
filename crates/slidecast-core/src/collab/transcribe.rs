//! Timing-cue extraction via an OpenAI-style `/v1/audio/transcriptions`
//! endpoint running a fast (tiny) model variant.

use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use tracing::debug;

use crate::collab::{TimedSegment, Transcriber};
use crate::error::CollabError;

/// Wire shape of a `verbose_json` transcription reply.
#[derive(Debug, Deserialize)]
struct TranscriptionReply {
    #[serde(default)]
    segments: Vec<WireSegment>,
}

#[derive(Debug, Deserialize)]
struct WireSegment {
    start: f64,
    end: f64,
    #[serde(default)]
    text: String,
}

pub struct HttpTranscriber {
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

impl HttpTranscriber {
    /// `model` should name a fast variant, e.g. `tiny`; timing accuracy is
    /// what matters here, not transcript fidelity.
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn align(&self, audio_path: &Path) -> Result<Vec<TimedSegment>, CollabError> {
        let audio = tokio::fs::read(audio_path)
            .await
            .map_err(CollabError::service)?;
        if audio.is_empty() {
            return Err(CollabError::Malformed(format!(
                "audio file is empty: {}",
                audio_path.display()
            )));
        }

        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "narration.mp3".to_owned());

        let form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .part(
                "file",
                multipart::Part::bytes(audio)
                    .file_name(file_name)
                    .mime_str("audio/mpeg")
                    .map_err(CollabError::service)?,
            );

        let url = format!(
            "{}/v1/audio/transcriptions",
            self.endpoint.trim_end_matches('/')
        );
        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(CollabError::service)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CollabError::Malformed(format!(
                "transcription service returned {status}: {body}"
            )));
        }

        let reply: TranscriptionReply = response.json().await.map_err(CollabError::service)?;
        if reply.segments.is_empty() {
            return Err(CollabError::EmptyOutput);
        }

        debug!(
            path = %audio_path.display(),
            segments = reply.segments.len(),
            "transcription segments received"
        );

        Ok(reply
            .segments
            .into_iter()
            .map(|s| TimedSegment {
                start_secs: s.start,
                end_secs: s.end,
                text: s.text.trim().to_owned(),
            })
            .collect())
    }
}
