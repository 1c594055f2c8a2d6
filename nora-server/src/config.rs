//! Server configuration, loaded from environment variables at startup.

use std::path::PathBuf;
use std::time::Duration;

use nora_llm::ProviderSettings;
use serde::Serialize;
use utoipa::ToSchema;

/// Shipped admin password; startup warns while it is still in use.
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

/// Runtime configuration for nora-server.
///
/// Every field has a default so the gateway starts with no environment set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:8000"`).
    pub bind_address: String,

    /// sqlx SQLite URL (default: `"sqlite://nora.db?mode=rwc"`).
    pub database_url: String,

    /// Accepted for compatibility; the cache namespace is kept in-process.
    pub redis_url: Option<String>,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Directory for a daily rolling log file. Stdout only when unset.
    pub log_dir: Option<PathBuf>,

    /// Comma-separated list of allowed CORS origins; wildcard when unset.
    pub cors_allowed_origins: Option<String>,

    pub enable_swagger: bool,
    /// `ENABLE_WEBSOCKET`: serve the `/ws` command channel.
    pub enable_websocket: bool,

    // ── LLM providers ────────────────────────────────────────────────────────
    /// `ollama`, `gemini` or `auto`.
    pub ai_provider: String,
    pub ai_model: String,
    pub ai_server_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub request_timeout: Duration,
    /// Replies longer than this many characters are cut; `0` disables.
    pub max_response_length: usize,

    // ── Memory ───────────────────────────────────────────────────────────────
    pub enable_memory: bool,
    /// Prior messages replayed to the provider on each turn.
    pub memory_context_length: usize,

    // ── Auth ─────────────────────────────────────────────────────────────────
    pub secret_key: String,
    /// `true` when `SECRET_KEY` was missing and a per-process key was generated.
    pub secret_key_generated: bool,
    pub admin_username: String,
    pub admin_password: String,
    pub token_expire_hours: u64,

    // ── Files ────────────────────────────────────────────────────────────────
    pub company_info_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub static_dir: PathBuf,
    pub max_upload_size_mb: u64,
    pub context_cache_ttl: Duration,
    pub max_context_chars: usize,

    /// Base URL of an OpenAI-compatible Whisper service.
    pub whisper_url: Option<String>,

    pub deployment: DeploymentInfo,
}

/// Deployment switches written by the setup tooling. Never carries secrets.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct DeploymentInfo {
    pub use_cloudflare: bool,
    pub cloudflare_tunnel_configured: bool,
    pub domain_configured: bool,
    pub ssl_email_configured: bool,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] but reading variables through `get`.
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(get);
        let (secret_key, secret_key_generated) = match env.opt("SECRET_KEY") {
            Some(key) => (key, false),
            None => (random_secret(), true),
        };
        Self {
            bind_address: env.or("NORA_BIND", "0.0.0.0:8000"),
            database_url: env.or("DATABASE_URL", "sqlite://nora.db?mode=rwc"),
            redis_url: env.opt("REDIS_URL"),
            log_level: env.or("NORA_LOG", "info"),
            log_json: env.flag("NORA_LOG_JSON", false),
            log_dir: env.opt("NORA_LOG_DIR").map(PathBuf::from),
            cors_allowed_origins: env.opt("NORA_CORS_ORIGINS"),
            enable_swagger: env.flag("NORA_ENABLE_SWAGGER", true),
            enable_websocket: env.flag("ENABLE_WEBSOCKET", true),

            ai_provider: env.or("AI_PROVIDER", "auto"),
            ai_model: env.or("AI_MODEL", "llama2"),
            ai_server_url: env.or("AI_SERVER_URL", "http://localhost:11434"),
            gemini_api_key: env.opt("GEMINI_API_KEY"),
            gemini_model: env.or("GEMINI_MODEL", "gemini-1.5-flash"),
            request_timeout: Duration::from_secs(env.parse("REQUEST_TIMEOUT", 60)),
            max_response_length: env.parse("MAX_RESPONSE_LENGTH", 2000),

            enable_memory: env.flag("ENABLE_MEMORY", true),
            memory_context_length: env.parse("MEMORY_CONTEXT_LENGTH", 10),

            secret_key,
            secret_key_generated,
            admin_username: env.or("ADMIN_USERNAME", "admin"),
            admin_password: env.or("ADMIN_PASSWORD", DEFAULT_ADMIN_PASSWORD),
            token_expire_hours: env.parse("TOKEN_EXPIRE_HOURS", 24),

            company_info_dir: PathBuf::from(env.or("COMPANY_INFO_DIR", "company_info")),
            uploads_dir: PathBuf::from(env.or("UPLOADS_DIR", "uploads")),
            static_dir: PathBuf::from(env.or("STATIC_DIR", "static")),
            max_upload_size_mb: env.parse("MAX_UPLOAD_SIZE_MB", 10),
            context_cache_ttl: Duration::from_secs(env.parse("CONTEXT_CACHE_TTL", 60)),
            max_context_chars: env.parse("MAX_CONTEXT_CHARS", 20_000),

            whisper_url: env.opt("WHISPER_URL"),

            deployment: DeploymentInfo {
                use_cloudflare: env.flag("USE_CLOUDFLARE", false),
                cloudflare_tunnel_configured: env.opt("CLOUDFLARE_TUNNEL_TOKEN").is_some(),
                domain_configured: env.opt("DOMAIN").is_some(),
                ssl_email_configured: env.opt("SSL_EMAIL").is_some(),
            },
        }
    }

    /// Settings for the provider registry.
    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            default_provider: self.ai_provider.clone(),
            ollama_url: self.ai_server_url.clone(),
            ollama_model: self.ai_model.clone(),
            gemini_api_key: self.gemini_api_key.clone(),
            gemini_model: self.gemini_model.clone(),
            timeout: self.request_timeout,
            ..ProviderSettings::default()
        }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_expire_hours.saturating_mul(3600))
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Set and non-blank.
    fn opt(&self, key: &str) -> Option<String> {
        (self.0)(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_owned())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.opt(key)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes"))
            .unwrap_or(default)
    }
}

fn random_secret() -> String {
    format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
}
