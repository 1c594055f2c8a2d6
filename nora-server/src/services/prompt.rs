//! Provider message list assembly and reply post-processing.

use std::str::FromStr;

use nora_llm::{ChatMessage, Role};

use crate::entities::StoredMessage;
use crate::services::language::{self, Language};

/// System prompt, then prior turns, then the new user message.
pub fn build_messages(
    system_prompt: &str,
    company_context: &str,
    language: &Language,
    history: Vec<ChatMessage>,
    user_message: &str,
) -> Vec<ChatMessage> {
    let mut system = system_prompt.trim().to_owned();
    if !company_context.trim().is_empty() {
        system.push_str("\n\nUse the following company information when it is relevant:\n\n");
        system.push_str(company_context.trim());
    }
    let instruction = language::instruction(language);
    if !instruction.is_empty() {
        system.push_str("\n\n");
        system.push_str(&instruction);
    }

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system));
    messages.extend(history);
    messages.push(ChatMessage::user(user_message));
    messages
}

/// Stored user / assistant turns as provider messages; other roles are dropped.
pub fn history_from_stored(stored: Vec<StoredMessage>) -> Vec<ChatMessage> {
    stored
        .into_iter()
        .filter_map(|m| match Role::from_str(&m.role) {
            Ok(role @ (Role::User | Role::Assistant)) => Some(ChatMessage::new(role, m.content)),
            _ => None,
        })
        .collect()
}

/// Cut `text` to `max_chars` characters plus `...`; `0` disables the cut.
pub fn truncate_response(text: String, max_chars: usize) -> String {
    if max_chars == 0 {
        return text;
    }
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text,
    }
}

/// Conversation title from the first user message.
pub fn title_from(message: &str) -> String {
    let trimmed = message.trim();
    match trimmed.char_indices().nth(50) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_owned(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;

    fn stored(role: &str, content: &str) -> StoredMessage {
        StoredMessage {
            id: content.into(),
            conversation_id: "s".into(),
            role: role.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn system_prompt_carries_context_and_language() {
        let msgs = build_messages(
            "You are Nora.",
            "=== faq.md ===\nOpen 9-5",
            &language::lookup("es"),
            vec![ChatMessage::user("hola"), ChatMessage::assistant("¡Hola!")],
            "¿Horario?",
        );
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0].role, Role::System);
        assert!(msgs[0].content.starts_with("You are Nora."));
        assert!(msgs[0].content.contains("=== faq.md ===\nOpen 9-5"));
        assert!(msgs[0].content.ends_with("Always respond in Spanish unless the user explicitly asks for another language."));
        assert_eq!(msgs[3], ChatMessage::user("¿Horario?"));
    }

    #[test]
    fn english_without_context_is_bare_prompt() {
        let msgs = build_messages("You are Nora.", "  ", &language::lookup("en"), vec![], "hi");
        assert_eq!(msgs[0].content, "You are Nora.");
        assert_eq!(msgs.len(), 2);
    }

    #[test]
    fn history_keeps_only_chat_roles() {
        let history = history_from_stored(vec![
            stored("user", "a"),
            stored("system", "b"),
            stored("assistant", "c"),
            stored("tool", "d"),
        ]);
        assert_eq!(history, vec![ChatMessage::user("a"), ChatMessage::assistant("c")]);
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_response("héllo".into(), 3), "hél...");
        assert_eq!(truncate_response("short".into(), 5), "short");
        assert_eq!(truncate_response("anything".into(), 0), "anything");
    }

    #[test]
    fn titles_are_capped_at_fifty() {
        assert_eq!(title_from("  hi  "), "hi");
        let long = "x".repeat(60);
        assert_eq!(title_from(&long), format!("{}...", "x".repeat(50)));
    }
}
