//! Company branding and system prompt, loaded once at startup.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

pub const CONFIG_FILE: &str = "config.json";
pub const SYSTEM_PROMPT_FILE: &str = "system_prompt.txt";

const DEFAULT_SYSTEM_PROMPT: &str = "You are {assistant_name}, a helpful AI assistant for {company_name}. \
You help users with their questions and tasks. Be friendly, professional, and helpful. \
If you have company context available, use it to provide more relevant answers.";

/// Contents of `company_info/config.json`. Unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct CompanyConfig {
    pub company_name: String,
    pub assistant_name: String,
    pub primary_color: String,
    pub welcome_message: String,
    pub default_language: String,
}

impl Default for CompanyConfig {
    fn default() -> Self {
        Self {
            company_name: "Your Company".into(),
            assistant_name: "Nora".into(),
            primary_color: "#6366f1".into(),
            welcome_message: "Hello! How can I help you today?".into(),
            default_language: "en".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompanyInfo {
    pub config: CompanyConfig,
    /// Placeholders already substituted.
    pub system_prompt: String,
}

impl CompanyInfo {
    /// Read `config.json` and `system_prompt.txt` from `dir`. Missing or
    /// invalid files fall back to defaults.
    pub fn load(dir: &Path) -> Self {
        let config_path = dir.join(CONFIG_FILE);
        let config = match std::fs::read_to_string(&config_path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %config_path.display(), error = %e, "invalid company config; using defaults");
                CompanyConfig::default()
            }),
            Err(e) => {
                warn!(path = %config_path.display(), error = %e, "company config not readable; using defaults");
                CompanyConfig::default()
            }
        };

        let template = std::fs::read_to_string(dir.join(SYSTEM_PROMPT_FILE))
            .ok()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_owned());
        let system_prompt = render(&template, &config);

        info!(company = %config.company_name, assistant = %config.assistant_name, "company info loaded");
        Self { config, system_prompt }
    }
}

impl Default for CompanyInfo {
    fn default() -> Self {
        let config = CompanyConfig::default();
        let system_prompt = render(DEFAULT_SYSTEM_PROMPT, &config);
        Self { config, system_prompt }
    }
}

fn render(template: &str, config: &CompanyConfig) -> String {
    template
        .replace("{company_name}", &config.company_name)
        .replace("{assistant_name}", &config.assistant_name)
        .trim()
        .to_owned()
}
