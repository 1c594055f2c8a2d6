use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::entities::{Conversation, SavedChat, StoredMessage};
use crate::services::transcript::{ExportFormat, TranscriptMessage};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ChatRequest {
    /// The user message; must not be blank.
    pub message: String,
    /// `ollama`, `gemini` or `auto` (default).
    pub provider: Option<String>,
    /// Overrides the provider's configured model.
    pub model: Option<String>,
    /// Reply language code, e.g. `de`.
    pub language: Option<String>,
    /// Conversation to continue; a new one is created when absent.
    pub session_id: Option<String>,
    /// Try the other provider once when the requested one fails.
    #[serde(default = "default_true")]
    pub use_fallback: bool,
    #[validate(range(min = 0.0, max = 2.0, message = "temperature must be between 0.0 and 2.0"))]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    pub response: String,
    pub success: bool,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub language: String,
    pub session_id: Option<String>,
    /// The reply came from the fallback provider.
    pub fell_back: bool,
    pub timestamp: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SaveChatRequest {
    #[validate(length(min = 1, message = "No messages to save"))]
    pub messages: Vec<TranscriptMessage>,
    #[serde(default)]
    pub format: ExportFormat,
    #[validate(length(max = 200))]
    pub title: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SaveChatResponse {
    pub success: bool,
    pub filename: String,
    pub download_url: String,
    pub format: ExportFormat,
    pub message_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SavedChatResponse {
    pub id: String,
    pub filename: String,
    pub format: String,
    pub title: Option<String>,
    pub message_count: i64,
    pub created_at: String,
    pub download_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SavedChatList {
    pub chats: Vec<SavedChatResponse>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub session_id: String,
    pub title: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionList {
    pub sessions: Vec<SessionResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageList {
    pub session_id: String,
    pub messages: Vec<MessageResponse>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct MessagesQuery {
    /// Return only the last `limit` messages.
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct SessionsQuery {
    pub limit: Option<i64>,
}

pub fn download_url(filename: &str) -> String {
    format!("/files/download/exports/{filename}")
}

impl Conversation {
    pub fn to_response(&self) -> SessionResponse {
        SessionResponse {
            session_id: self.id.clone(),
            title: self.title.clone(),
            created_at: self.created_at.to_rfc3339(),
            updated_at: self.updated_at.to_rfc3339(),
        }
    }
}

impl StoredMessage {
    pub fn to_response(&self) -> MessageResponse {
        MessageResponse {
            id: self.id.clone(),
            role: self.role.clone(),
            content: self.content.clone(),
            created_at: self.created_at.to_rfc3339(),
        }
    }
}

impl SavedChat {
    pub fn to_response(&self) -> SavedChatResponse {
        SavedChatResponse {
            id: self.id.clone(),
            filename: self.filename.clone(),
            format: self.format.clone(),
            title: self.title.clone(),
            message_count: self.message_count,
            created_at: self.created_at.to_rfc3339(),
            download_url: download_url(&self.filename),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn use_fallback_defaults_to_true() {
        let req: ChatRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert!(req.use_fallback);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn temperature_is_range_checked() {
        let req: ChatRequest = serde_json::from_str(r#"{"message":"hi","temperature":3.5}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn empty_save_fails_validation() {
        let req: SaveChatRequest = serde_json::from_str(r#"{"messages":[]}"#).unwrap();
        assert_eq!(req.format, ExportFormat::Txt);
        assert!(req.validate().is_err());
    }
}
