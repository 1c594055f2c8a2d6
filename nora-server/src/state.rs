//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use nora_llm::ProviderRegistry;

use crate::auth::LoginLimiter;
use crate::config::Config;
use crate::entities::SqliteStore;
use crate::error::ServerError;
use crate::services::company::CompanyInfo;
use crate::services::context::ContextCache;
use crate::services::files::FileManager;
use crate::services::transcribe::WhisperClient;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Users, conversations, messages and saved chats.
    pub store: Arc<SqliteStore>,
    /// Ollama / Gemini lookup table.
    pub providers: Arc<ProviderRegistry>,
    /// Branding and system prompt, loaded once.
    pub company: Arc<CompanyInfo>,
    pub context: Arc<ContextCache>,
    pub files: Arc<FileManager>,
    pub whisper: Arc<WhisperClient>,
    pub login_limiter: Arc<LoginLimiter>,
}

impl AppState {
    /// Wire every service from `config`; the store is opened by the caller.
    pub fn new(config: Config, store: SqliteStore, company: CompanyInfo) -> Result<Self, ServerError> {
        let providers = ProviderRegistry::from_settings(&config.provider_settings())?;
        let context = ContextCache::new(
            config.company_info_dir.clone(),
            config.context_cache_ttl,
            config.max_context_chars,
        );
        let files = FileManager::new(
            config.uploads_dir.clone(),
            config.company_info_dir.clone(),
            config.max_upload_bytes(),
        );
        let whisper = WhisperClient::new(config.whisper_url.clone(), config.request_timeout)?;
        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(store),
            providers: Arc::new(providers),
            company: Arc::new(company),
            context: Arc::new(context),
            files: Arc::new(files),
            whisper: Arc::new(whisper),
            login_limiter: Arc::new(LoginLimiter::default()),
        })
    }
}
