//! Static provider lookup table with Gemini/Ollama fallback.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use strum::IntoEnumIterator;
use tracing::{info, warn};

use crate::error::LlmError;
use crate::gemini::{GeminiClient, DEFAULT_GEMINI_BASE_URL};
use crate::ollama::OllamaClient;
use crate::provider::{DeltaStream, LlmProvider};
use crate::types::{ChatRequest, Completion, ProviderKind};

/// Everything needed to build the provider table.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// `"ollama"`, `"gemini"` or `"auto"` (Gemini when a key is present).
    pub default_provider: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub timeout: Duration,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            default_provider: "auto".into(),
            ollama_url: "http://localhost:11434".into(),
            ollama_model: "llama2".into(),
            gemini_api_key: None,
            gemini_model: "gemini-1.5-flash".into(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.into(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Row of [`ProviderRegistry::describe`].
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: ProviderKind,
    pub configured: bool,
    pub model: Option<String>,
    pub is_default: bool,
}

#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn LlmProvider>>,
    ollama: Arc<OllamaClient>,
    default: ProviderKind,
}

impl ProviderRegistry {
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, LlmError> {
        let ollama = Arc::new(OllamaClient::new(
            &settings.ollama_url,
            &settings.ollama_model,
            settings.timeout,
        )?);
        let mut providers: HashMap<ProviderKind, Arc<dyn LlmProvider>> = HashMap::new();
        providers.insert(ProviderKind::Ollama, ollama.clone());

        match settings.gemini_api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => {
                let gemini = GeminiClient::with_base_url(
                    &settings.gemini_base_url,
                    key,
                    &settings.gemini_model,
                    settings.timeout,
                )?;
                providers.insert(ProviderKind::Gemini, Arc::new(gemini));
            }
            None => info!("GEMINI_API_KEY not set; gemini provider disabled"),
        }

        let requested = settings.default_provider.trim();
        let default = if requested.is_empty() || requested.eq_ignore_ascii_case("auto") {
            if providers.contains_key(&ProviderKind::Gemini) {
                ProviderKind::Gemini
            } else {
                ProviderKind::Ollama
            }
        } else {
            let kind = ProviderKind::from_str(requested)
                .map_err(|_| LlmError::UnknownProvider(requested.to_owned()))?;
            if !providers.contains_key(&kind) {
                warn!(provider = %kind, "default provider is not configured; using ollama");
                ProviderKind::Ollama
            } else {
                kind
            }
        };

        info!(default = %default, providers = providers.len(), "provider registry ready");
        Ok(Self { providers, ollama, default })
    }

    pub fn default_kind(&self) -> ProviderKind {
        self.default
    }

    /// Direct access to the Ollama client for model management endpoints.
    pub fn ollama(&self) -> &OllamaClient {
        &self.ollama
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&Arc<dyn LlmProvider>> {
        self.providers.get(&kind)
    }

    /// Map a request's provider name onto a configured provider.
    pub fn resolve(&self, name: Option<&str>) -> Result<ProviderKind, LlmError> {
        let name = name.map(str::trim).unwrap_or("");
        if name.is_empty() || name.eq_ignore_ascii_case("auto") {
            return Ok(self.default);
        }
        let kind = ProviderKind::from_str(name).map_err(|_| LlmError::UnknownProvider(name.to_owned()))?;
        if !self.providers.contains_key(&kind) {
            return Err(LlmError::NotConfigured {
                provider: kind,
                message: format!("{kind} is not configured on this gateway"),
            });
        }
        Ok(kind)
    }

    fn fallback_for(&self, kind: ProviderKind, use_fallback: bool) -> Option<&Arc<dyn LlmProvider>> {
        if use_fallback { self.providers.get(&kind.fallback()) } else { None }
    }

    /// One call to `kind`; on failure one call to the other provider when allowed.
    pub async fn complete(
        &self,
        kind: ProviderKind,
        req: &ChatRequest,
        use_fallback: bool,
    ) -> Result<Completion, LlmError> {
        let primary = self.providers.get(&kind).ok_or_else(|| LlmError::NotConfigured {
            provider: kind,
            message: format!("{kind} is not configured on this gateway"),
        })?;
        let primary_err = match primary.chat(req).await {
            Ok(text) => {
                return Ok(Completion {
                    text,
                    provider: kind,
                    model: primary.model_for(req).to_owned(),
                    fell_back: false,
                });
            }
            Err(e) => e,
        };

        let Some(backup) = self.fallback_for(kind, use_fallback) else {
            return Err(primary_err);
        };
        warn!(provider = %kind, fallback = %backup.kind(), error = %primary_err, "provider failed; falling back");
        // The requested model belongs to the primary provider.
        let backup_req = req.clone().with_model(None);
        let text = backup.chat(&backup_req).await?;
        Ok(Completion {
            text,
            provider: backup.kind(),
            model: backup.default_model().to_owned(),
            fell_back: true,
        })
    }

    /// Open a stream on `kind`, falling back only if the stream cannot be opened.
    pub async fn stream(
        &self,
        kind: ProviderKind,
        req: &ChatRequest,
        use_fallback: bool,
    ) -> Result<(ProviderKind, DeltaStream), LlmError> {
        let primary = self.providers.get(&kind).ok_or_else(|| LlmError::NotConfigured {
            provider: kind,
            message: format!("{kind} is not configured on this gateway"),
        })?;
        match primary.chat_stream(req).await {
            Ok(stream) => Ok((kind, stream)),
            Err(e) => {
                let Some(backup) = self.fallback_for(kind, use_fallback) else {
                    return Err(e);
                };
                warn!(provider = %kind, fallback = %backup.kind(), error = %e, "stream open failed; falling back");
                let stream = backup.chat_stream(&req.clone().with_model(None)).await?;
                Ok((backup.kind(), stream))
            }
        }
    }

    /// Static description of every known provider.
    pub fn describe(&self) -> Vec<ProviderInfo> {
        ProviderKind::iter()
            .map(|kind| {
                let provider = self.providers.get(&kind);
                ProviderInfo {
                    name: kind,
                    configured: provider.is_some(),
                    model: provider.map(|p| p.default_model().to_owned()),
                    is_default: kind == self.default,
                }
            })
            .collect()
    }
}
