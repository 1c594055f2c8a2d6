//! Google Gemini REST client (`generateContent` / `streamGenerateContent`).

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::provider::{DeltaStream, LlmProvider};
use crate::stream::{deltas, Frame, StreamEnd};
use crate::types::{ChatRequest, ProviderKind, Role};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<Value>,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl GenerateResponse {
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<String>())
            .unwrap_or_default()
    }
}

impl GeminiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        Self::with_base_url(DEFAULT_GEMINI_BASE_URL, api_key, model, timeout)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::NotConfigured {
                provider: ProviderKind::Gemini,
                message: "GEMINI_API_KEY is not set".into(),
            });
        }
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.trim().to_owned(),
            model: model.into(),
            timeout,
        })
    }

    fn body(req: &ChatRequest) -> GenerateBody {
        let system: Vec<&str> = req
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let system_instruction = (!system.is_empty()).then(|| Content {
            role: None,
            parts: vec![Part { text: Some(system.join("\n\n")) }],
        });
        let contents = req
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| Content {
                role: Some(if m.role == Role::User { "user" } else { "model" }.to_owned()),
                parts: vec![Part { text: Some(m.content.clone()) }],
            })
            .collect();
        GenerateBody {
            system_instruction,
            contents,
            generation_config: req.temperature.map(|t| serde_json::json!({ "temperature": t })),
        }
    }

    async fn send(&self, req: &ChatRequest, url: String, stream: bool) -> Result<reqwest::Response, LlmError> {
        let mut builder = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&Self::body(req));
        if !stream {
            builder = builder.timeout(self.timeout);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| LlmError::from_transport(ProviderKind::Gemini, e))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let body = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_owned))
            .unwrap_or(body);
        Err(LlmError::Status { provider: ProviderKind::Gemini, status: status.as_u16(), body })
    }
}

#[async_trait]
impl LlmProvider for GeminiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, req: &ChatRequest) -> Result<String, LlmError> {
        let model = checked_model(self.model_for(req))?;
        debug!(%model, messages = req.messages.len(), "gemini chat");
        let url = format!("{}/v1beta/models/{model}:generateContent", self.base_url);
        let parsed: GenerateResponse = self
            .send(req, url, false)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::Decode { provider: ProviderKind::Gemini, message: e.to_string() })?;
        let text = parsed.text();
        let text = text.trim();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse(ProviderKind::Gemini));
        }
        Ok(text.to_owned())
    }

    async fn chat_stream(&self, req: &ChatRequest) -> Result<DeltaStream, LlmError> {
        let model = checked_model(self.model_for(req))?;
        debug!(%model, "gemini chat stream");
        let url = format!("{}/v1beta/models/{model}:streamGenerateContent?alt=sse", self.base_url);
        let resp = self.send(req, url, true).await?;
        Ok(deltas(ProviderKind::Gemini, resp.bytes_stream().boxed(), StreamEnd::Eof, parse_sse_line))
    }

    /// Gemini has no free health endpoint; a configured key counts as available.
    async fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Model names are part of the request path; anything outside
/// `[A-Za-z0-9._-]` is refused before a request is built.
fn checked_model(model: &str) -> Result<&str, LlmError> {
    let valid = !model.is_empty() && model.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(model)
    } else {
        Err(LlmError::InvalidModel { provider: ProviderKind::Gemini, model: model.to_owned() })
    }
}

fn parse_sse_line(line: &str) -> Result<Frame, LlmError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(Frame::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(Frame::Done);
    }
    match serde_json::from_str::<GenerateResponse>(data) {
        Ok(chunk) => {
            let text = chunk.text();
            if text.is_empty() { Ok(Frame::Skip) } else { Ok(Frame::Text(text)) }
        }
        Err(e) => {
            warn!(error = %e, "gemini stream event is not JSON");
            Err(LlmError::Decode { provider: ProviderKind::Gemini, message: e.to_string() })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::ChatMessage;
    use mockito::{Matcher, Server};

    fn client(url: &str) -> GeminiClient {
        GeminiClient::with_base_url(url, "test-key", "gemini-1.5-flash", Duration::from_secs(5)).unwrap()
    }

    fn request() -> ChatRequest {
        ChatRequest::new(vec![
            ChatMessage::system("You are Nora."),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
            ChatMessage::user("how are you?"),
        ])
    }

    #[test]
    fn missing_key_is_not_configured() {
        let err = GeminiClient::new("  ", "gemini-pro", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured { provider: ProviderKind::Gemini, .. }));
    }

    #[test]
    fn body_maps_roles_and_system_instruction() {
        let body = serde_json::to_value(GeminiClient::body(&request())).unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "You are Nora.");
        let roles: Vec<&str> = body["contents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "model", "user"]);
        assert!(body.get("generationConfig").is_none());
    }

    #[tokio::test]
    async fn chat_joins_candidate_parts() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/gemini-1.5-flash:generateContent")
            .match_header(API_KEY_HEADER, "test-key")
            .with_status(200)
            .with_body(
                r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"I am "},{"text":"fine."}]}}]}"#,
            )
            .create_async()
            .await;

        let text = client(&server.url()).chat(&request()).await.unwrap();
        assert_eq!(text, "I am fine.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn blocked_prompt_is_empty_response() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", Matcher::Regex(r"generateContent$".into()))
            .with_status(200)
            .with_body(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#)
            .create_async()
            .await;

        let err = client(&server.url()).chat(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse(ProviderKind::Gemini)));
    }

    #[tokio::test]
    async fn api_error_message_is_extracted() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", Matcher::Regex(r"generateContent$".into()))
            .with_status(400)
            .with_body(r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#)
            .create_async()
            .await;

        match client(&server.url()).chat(&request()).await.unwrap_err() {
            LlmError::Status { status, body, .. } => {
                assert_eq!(status, 400);
                assert_eq!(body, "API key not valid.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_reads_sse_events() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/gemini-1.5-flash:streamGenerateContent")
            .match_query(Matcher::UrlEncoded("alt".into(), "sse".into()))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(concat!(
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Good\"}]}}]}\n\n",
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" day\"}]}}]}\n\n",
            ))
            .create_async()
            .await;

        let parts: Vec<String> = client(&server.url())
            .chat_stream(&request())
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(parts, vec!["Good", " day"]);
    }

    #[test]
    fn sse_comments_are_skipped() {
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), Frame::Skip);
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), Frame::Done);
    }

    #[tokio::test]
    async fn model_names_cannot_escape_the_path() {
        let mut server = Server::new_async().await;
        let untouched = server.mock("POST", Matcher::Any).expect(0).create_async().await;

        let req = request().with_model(Some("../../files?key=x".into()));
        let err = client(&server.url()).chat(&req).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidModel { provider: ProviderKind::Gemini, .. }));
        assert!(client(&server.url()).chat_stream(&req).await.is_err());
        untouched.assert_async().await;

        assert_eq!(checked_model("gemini-1.5-flash").unwrap(), "gemini-1.5-flash");
    }
}
