//! Public UI configuration: branding, assistant settings and languages.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::schemas::system::{AssistantSettings, ConfigResponse};
use crate::services::language::LANGUAGES;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_config), components(schemas(ConfigResponse, AssistantSettings)))]
pub struct ConfigApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/config", get(get_config))
}

#[utoipa::path(
    get,
    path = "/config",
    tag = "config",
    responses(
        (status = 200, description = "UI configuration", body = ConfigResponse)
    )
)]
pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<ConfigResponse> {
    let provider = state.providers.default_kind();
    let model = state
        .providers
        .get(provider)
        .map(|p| p.default_model().to_owned())
        .unwrap_or_else(|| state.config.ai_model.clone());
    Json(ConfigResponse {
        company: state.company.config.clone(),
        assistant: AssistantSettings {
            provider: provider.to_string(),
            model,
            memory_enabled: state.config.enable_memory,
            memory_context_length: state.config.memory_context_length,
            max_response_length: state.config.max_response_length,
            transcription_enabled: state.whisper.is_configured(),
        },
        languages: LANGUAGES.to_vec(),
    })
}
