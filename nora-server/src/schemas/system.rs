use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::DeploymentInfo;
use crate::services::company::CompanyConfig;
use crate::services::language::Language;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Always `ok` while the process serves requests.
    pub status: String,
    pub version: String,
    pub provider: String,
    pub model: String,
    pub memory_enabled: bool,
    pub deployment: DeploymentInfo,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProviderStatus {
    pub name: String,
    pub configured: bool,
    pub available: bool,
    pub model: Option<String>,
    /// Installed models; only known for Ollama.
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProvidersResponse {
    pub default: String,
    pub providers: Vec<ProviderStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OllamaHealth {
    pub running: bool,
    pub url: String,
    pub model_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OllamaModels {
    pub success: bool,
    pub models: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PullResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AssistantSettings {
    pub provider: String,
    pub model: String,
    pub memory_enabled: bool,
    pub memory_context_length: usize,
    pub max_response_length: usize,
    pub transcription_enabled: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConfigResponse {
    pub company: CompanyConfig,
    pub assistant: AssistantSettings,
    pub languages: Vec<Language>,
}
