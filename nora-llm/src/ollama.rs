//! Ollama REST client (`/api/chat`, `/api/tags`, `/api/pull`).

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::LlmError;
use crate::provider::{DeltaStream, LlmProvider};
use crate::stream::{deltas, Frame, StreamEnd};
use crate::types::{ChatMessage, ChatRequest, ProviderKind};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const PULL_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<Value>,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

impl OllamaClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            model: model.into(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn body<'a>(&'a self, req: &'a ChatRequest, stream: bool) -> ChatBody<'a> {
        ChatBody {
            model: self.model_for(req),
            messages: &req.messages,
            stream,
            options: req.temperature.map(|t| serde_json::json!({ "temperature": t })),
        }
    }

    async fn post_chat(&self, req: &ChatRequest, stream: bool) -> Result<reqwest::Response, LlmError> {
        let mut builder = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&self.body(req, stream));
        if !stream {
            builder = builder.timeout(self.timeout);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| LlmError::from_transport(ProviderKind::Ollama, e))?;
        check_status(resp).await
    }

    /// Names of the models installed on the Ollama server.
    pub async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let resp = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(ProviderKind::Ollama, e))?;
        let tags: TagsResponse = check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| decode_err(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Download `model` on the Ollama server; blocks until the pull finishes.
    pub async fn pull_model(&self, model: &str) -> Result<(), LlmError> {
        info!(model, "pulling ollama model");
        let resp = self
            .http
            .post(format!("{}/api/pull", self.base_url))
            .timeout(PULL_TIMEOUT)
            .json(&serde_json::json!({ "name": model, "stream": false }))
            .send()
            .await
            .map_err(|e| LlmError::from_transport(ProviderKind::Ollama, e))?;
        let body: Value = check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::from_transport(ProviderKind::Ollama, e))?;
        if let Some(err) = body.get("error").and_then(Value::as_str) {
            return Err(LlmError::Status {
                provider: ProviderKind::Ollama,
                status: 500,
                body: err.to_owned(),
            });
        }
        debug!(model, status = ?body.get("status"), "ollama pull finished");
        Ok(())
    }
}

#[async_trait]
impl LlmProvider for OllamaClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, req: &ChatRequest) -> Result<String, LlmError> {
        debug!(model = %self.model_for(req), messages = req.messages.len(), "ollama chat");
        let chunk: ChatChunk = self
            .post_chat(req, false)
            .await?
            .json()
            .await
            .map_err(|e| decode_err(e.to_string()))?;
        if let Some(err) = chunk.error {
            return Err(LlmError::Status { provider: ProviderKind::Ollama, status: 500, body: err });
        }
        let text = chunk.message.map(|m| m.content).unwrap_or_default();
        let text = text.trim();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse(ProviderKind::Ollama));
        }
        Ok(text.to_owned())
    }

    async fn chat_stream(&self, req: &ChatRequest) -> Result<DeltaStream, LlmError> {
        debug!(model = %self.model_for(req), "ollama chat stream");
        let resp = self.post_chat(req, true).await?;
        Ok(deltas(ProviderKind::Ollama, resp.bytes_stream().boxed(), StreamEnd::DoneFrame, parse_ndjson_line))
    }

    async fn is_available(&self) -> bool {
        match self.list_models().await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, url = %self.base_url, "ollama reachability check failed");
                false
            }
        }
    }
}

fn parse_ndjson_line(line: &str) -> Result<Frame, LlmError> {
    let chunk: ChatChunk = serde_json::from_str(line).map_err(|e| {
        warn!(error = %e, "ollama stream line is not JSON");
        decode_err(e.to_string())
    })?;
    if let Some(err) = chunk.error {
        return Err(LlmError::Status { provider: ProviderKind::Ollama, status: 500, body: err });
    }
    let text = chunk.message.map(|m| m.content).unwrap_or_default();
    if !text.is_empty() {
        // A final chunk may carry both text and `done`; forward the text and
        // let the empty body that follows end the stream.
        return Ok(Frame::Text(text));
    }
    if chunk.done { Ok(Frame::Done) } else { Ok(Frame::Skip) }
}

fn decode_err(message: String) -> LlmError {
    LlmError::Decode { provider: ProviderKind::Ollama, message }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let body = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or(body);
    Err(LlmError::Status { provider: ProviderKind::Ollama, status: status.as_u16(), body })
}
