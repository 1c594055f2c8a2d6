//! Forwarding of recorded audio to an OpenAI-compatible Whisper service.

use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ServerError;

/// Extensions accepted by `/files/transcribe`.
pub const AUDIO_EXTENSIONS: &[&str] = &[".wav", ".mp3", ".m4a", ".ogg", ".webm", ".flac"];

const WHISPER_MODEL: &str = "whisper-1";

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WhisperClient {
    http: Client,
    base_url: Option<String>,
    timeout: Duration,
}

impl WhisperClient {
    pub fn new(base_url: Option<String>, timeout: Duration) -> Result<Self, ServerError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ServerError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.map(|u| u.trim_end_matches('/').to_owned()),
            timeout,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    /// Send the audio file at `path` and return the recognized text.
    pub async fn transcribe_file(
        &self,
        path: &Path,
        file_name: &str,
        language: Option<&str>,
    ) -> Result<String, ServerError> {
        let Some(base_url) = &self.base_url else {
            return Err(ServerError::ServiceUnavailable(
                "Transcription service is not configured (set WHISPER_URL)".into(),
            ));
        };
        let bytes = tokio::fs::read(path).await?;
        debug!(file = %file_name, size = bytes.len(), "forwarding audio to whisper");

        let mut form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name.to_owned()))
            .text("model", WHISPER_MODEL);
        if let Some(lang) = language.map(str::trim).filter(|l| !l.is_empty()) {
            form = form.text("language", lang.to_owned());
        }

        let resp = self
            .http
            .post(format!("{base_url}/v1/audio/transcriptions"))
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "whisper request failed");
                if e.is_timeout() {
                    ServerError::GatewayTimeout("Transcription service timed out".into())
                } else {
                    ServerError::ServiceUnavailable("Transcription service is unreachable".into())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "whisper returned an error");
            return Err(ServerError::Upstream(format!("Transcription failed with HTTP {}", status.as_u16())));
        }
        let parsed: TranscriptionResponse = resp
            .json()
            .await
            .map_err(|e| ServerError::Upstream(format!("Invalid transcription response: {e}")))?;
        parsed
            .text
            .map(|t| t.trim().to_owned())
            .ok_or_else(|| ServerError::Upstream("Transcription response has no text".into()))
    }
}

pub fn is_audio_extension(ext: &str) -> bool {
    AUDIO_EXTENSIONS.contains(&ext)
}
