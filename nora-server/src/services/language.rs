//! Supported reply languages.

use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
    /// BCP-47 tag used by browser speech recognition / synthesis.
    pub speech_locale: &'static str,
}

const fn lang(code: &'static str, name: &'static str, speech_locale: &'static str) -> Language {
    Language { code, name, speech_locale }
}

pub const LANGUAGES: &[Language] = &[
    lang("en", "English", "en-US"),
    lang("es", "Spanish", "es-ES"),
    lang("fr", "French", "fr-FR"),
    lang("de", "German", "de-DE"),
    lang("it", "Italian", "it-IT"),
    lang("pt", "Portuguese", "pt-BR"),
    lang("nl", "Dutch", "nl-NL"),
    lang("ru", "Russian", "ru-RU"),
    lang("zh", "Chinese", "zh-CN"),
    lang("ja", "Japanese", "ja-JP"),
    lang("ko", "Korean", "ko-KR"),
    lang("ar", "Arabic", "ar-SA"),
    lang("hi", "Hindi", "hi-IN"),
    lang("tr", "Turkish", "tr-TR"),
    lang("pl", "Polish", "pl-PL"),
    lang("sv", "Swedish", "sv-SE"),
];

/// Look up `code` (case-insensitive, region suffix ignored); English otherwise.
pub fn lookup(code: &str) -> Language {
    let base = code.trim().split(['-', '_']).next().unwrap_or("");
    LANGUAGES
        .iter()
        .find(|l| l.code.eq_ignore_ascii_case(base))
        .copied()
        .unwrap_or(LANGUAGES[0])
}

/// Line appended to the system prompt; empty for English.
pub fn instruction(language: &Language) -> String {
    if language.code == "en" {
        String::new()
    } else {
        format!("Always respond in {} unless the user explicitly asks for another language.", language.name)
    }
}
