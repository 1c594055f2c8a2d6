//! Chat transcript export (plain text, Markdown notes or JSON).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::error::ServerError;

const RULE_WIDTH: usize = 60;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ExportFormat {
    #[default]
    Txt,
    Md,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Md => "md",
            ExportFormat::Json => "json",
        }
    }
}

/// One exported message as sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TranscriptMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Everything a transcript header needs.
#[derive(Debug, Clone)]
pub struct Transcript<'a> {
    pub session_id: &'a str,
    pub title: &'a str,
    pub company_name: &'a str,
    pub assistant_name: &'a str,
    pub messages: &'a [TranscriptMessage],
}

impl Transcript<'_> {
    pub fn render(&self, format: ExportFormat, now: DateTime<Utc>) -> Result<String, ServerError> {
        match format {
            ExportFormat::Txt => Ok(self.format_text(now)),
            ExportFormat::Md => Ok(self.format_markdown(now)),
            ExportFormat::Json => self.format_json(now),
        }
    }

    pub fn format_text(&self, now: DateTime<Utc>) -> String {
        let heavy = "=".repeat(RULE_WIDTH);
        let light = "-".repeat(RULE_WIDTH);
        let mut lines = vec![
            heavy.clone(),
            format!("  {} - Conversation Transcript", self.company_name),
            heavy,
            String::new(),
            format!("Session ID: {}", self.session_id),
            format!("Exported: {}", now.format("%Y-%m-%d %H:%M:%S UTC")),
            String::new(),
            light.clone(),
            String::new(),
        ];
        for msg in self.messages {
            if let Some(ts) = msg.timestamp.as_deref().filter(|t| !t.is_empty()) {
                lines.push(format!("[{ts}]"));
            }
            lines.push(format!("{}:", self.speaker(&msg.role)));
            lines.push(msg.content.clone());
            lines.push(String::new());
        }
        lines.push(light);
        lines.push(format!("End of transcript - {} messages", self.messages.len()));
        lines.push(String::new());
        lines.join("\n")
    }

    pub fn format_markdown(&self, now: DateTime<Utc>) -> String {
        let mut lines = vec![
            format!("# {}", self.title),
            format!("Date: {}", now.format("%Y-%m-%d")),
            String::new(),
            "## Key Points".to_owned(),
            String::new(),
        ];
        for msg in self.messages {
            match msg.role.as_str() {
                "user" => lines.push(format!("**Q:** {}", msg.content)),
                "assistant" => lines.push(format!("**A:** {}", msg.content)),
                _ => continue,
            }
            lines.push(String::new());
        }
        lines.join("\n")
    }

    pub fn format_json(&self, now: DateTime<Utc>) -> Result<String, ServerError> {
        let doc = serde_json::json!({
            "session_id": self.session_id,
            "title": self.title,
            "exported_at": now.to_rfc3339(),
            "messages": self.messages,
        });
        serde_json::to_string_pretty(&doc).map_err(|e| ServerError::Internal(e.to_string()))
    }

    fn speaker(&self, role: &str) -> String {
        match role {
            "user" => "You".to_owned(),
            "assistant" => self.assistant_name.to_owned(),
            other => {
                let mut chars = other.chars();
                chars
                    .next()
                    .map(|c| c.to_uppercase().chain(chars).collect())
                    .unwrap_or_else(|| "Unknown".to_owned())
            }
        }
    }
}

/// `transcript_<session>_<YYYYmmdd_HHMMSS>.<ext>` with the session id made file-safe.
pub fn file_name(session_id: &str, format: ExportFormat, now: DateTime<Utc>) -> String {
    let session: String = session_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .take(64)
        .collect();
    let session = if session.is_empty() { "chat".to_owned() } else { session };
    format!("transcript_{session}_{}.{}", now.format("%Y%m%d_%H%M%S"), format.extension())
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    fn messages() -> Vec<TranscriptMessage> {
        vec![
            TranscriptMessage { role: "user".into(), content: "What are your hours?".into(), timestamp: None },
            TranscriptMessage {
                role: "assistant".into(),
                content: "9 to 5.".into(),
                timestamp: Some("14:00".into()),
            },
        ]
    }

    fn transcript(msgs: &[TranscriptMessage]) -> Transcript<'_> {
        Transcript {
            session_id: "abc123",
            title: "Support chat",
            company_name: "Acme",
            assistant_name: "Nora",
            messages: msgs,
        }
    }

    #[test]
    fn text_transcript_layout() {
        let msgs = messages();
        let text = transcript(&msgs).format_text(now());
        assert!(text.starts_with(&"=".repeat(60)));
        assert!(text.contains("  Acme - Conversation Transcript"));
        assert!(text.contains("Session ID: abc123"));
        assert!(text.contains("Exported: 2024-03-09 14:05:07 UTC"));
        assert!(text.contains("You:\nWhat are your hours?\n"));
        assert!(text.contains("[14:00]\nNora:\n9 to 5.\n"));
        assert!(text.ends_with("End of transcript - 2 messages\n"));
    }

    #[test]
    fn markdown_notes() {
        let msgs = messages();
        let md = transcript(&msgs).format_markdown(now());
        assert!(md.starts_with("# Support chat\nDate: 2024-03-09"));
        assert!(md.contains("**Q:** What are your hours?"));
        assert!(md.contains("**A:** 9 to 5."));
    }

    #[test]
    fn json_export_is_valid() {
        let msgs = messages();
        let raw = transcript(&msgs).render(ExportFormat::Json, now()).unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["session_id"], "abc123");
        assert_eq!(v["messages"].as_array().unwrap().len(), 2);
        assert!(v["messages"][0].get("timestamp").is_none());
    }

    #[test]
    fn file_names() {
        assert_eq!(file_name("abc123", ExportFormat::Txt, now()), "transcript_abc123_20240309_140507.txt");
        assert_eq!(file_name("../x", ExportFormat::Md, now()), "transcript_x_20240309_140507.md");
        assert_eq!(file_name("", ExportFormat::Json, now()), "transcript_chat_20240309_140507.json");
    }

    #[test]
    fn other_roles_are_capitalized() {
        let msgs = messages();
        let t = transcript(&msgs);
        assert_eq!(t.speaker("system"), "System");
        assert_eq!(t.speaker(""), "Unknown");
    }

    #[test]
    fn formats_parse_case_insensitively() {
        assert_eq!("MD".parse::<ExportFormat>().unwrap(), ExportFormat::Md);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }
}
