//! Provider status and Ollama model management.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use nora_llm::ProviderKind;
use tracing::{info, warn};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::system::{OllamaHealth, OllamaModels, ProviderStatus, ProvidersResponse, PullResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(list_providers, ollama_health, ollama_models, pull_model),
    components(schemas(ProvidersResponse, ProviderStatus, OllamaHealth, OllamaModels, PullResponse))
)]
pub struct ProvidersApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/providers", get(list_providers))
        .route("/ollama/health", get(ollama_health))
        .route("/ollama/models", get(ollama_models))
        .route("/ollama/pull/{model}", post(pull_model))
}

/// Every known provider with its configuration and live reachability.
#[utoipa::path(
    get,
    path = "/providers",
    tag = "providers",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Provider table", body = ProvidersResponse),
    )
)]
pub async fn list_providers(State(state): State<Arc<AppState>>) -> Json<ProvidersResponse> {
    let mut providers = Vec::new();
    for info in state.providers.describe() {
        let (available, models) = match info.name {
            ProviderKind::Ollama => match state.providers.ollama().list_models().await {
                Ok(models) => (true, models),
                Err(_) => (false, Vec::new()),
            },
            kind => match state.providers.get(kind) {
                Some(provider) => (provider.is_available().await, Vec::new()),
                None => (false, Vec::new()),
            },
        };
        providers.push(ProviderStatus {
            name: info.name.to_string(),
            configured: info.configured,
            available,
            model: info.model,
            models,
        });
    }
    Json(ProvidersResponse { default: state.providers.default_kind().to_string(), providers })
}

#[utoipa::path(
    get,
    path = "/ollama/health",
    tag = "providers",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Ollama reachability", body = OllamaHealth),
    )
)]
pub async fn ollama_health(State(state): State<Arc<AppState>>) -> Json<OllamaHealth> {
    let ollama = state.providers.ollama();
    let (running, model_count) = match ollama.list_models().await {
        Ok(models) => (true, models.len()),
        Err(e) => {
            warn!(error = %e, "ollama health check failed");
            (false, 0)
        }
    };
    Json(OllamaHealth { running, url: ollama.base_url().to_owned(), model_count })
}

/// Installed Ollama models. Never fails; `success` is false when Ollama is down.
#[utoipa::path(
    get,
    path = "/ollama/models",
    tag = "providers",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Installed models", body = OllamaModels),
    )
)]
pub async fn ollama_models(State(state): State<Arc<AppState>>) -> Json<OllamaModels> {
    match state.providers.ollama().list_models().await {
        Ok(models) => Json(OllamaModels { success: true, models, error: None }),
        Err(e) => Json(OllamaModels { success: false, models: Vec::new(), error: Some(e.to_string()) }),
    }
}

/// Download a model onto the Ollama server and wait for it to finish.
#[utoipa::path(
    post,
    path = "/ollama/pull/{model}",
    tag = "providers",
    security(("bearer" = [])),
    params(("model" = String, Path, description = "Model name, e.g. llama2 or mistral:7b")),
    responses(
        (status = 200, description = "Model pulled", body = PullResponse),
        (status = 502, description = "Ollama rejected the pull"),
        (status = 503, description = "Ollama is not running"),
        (status = 504, description = "Pull timed out"),
    )
)]
pub async fn pull_model(
    State(state): State<Arc<AppState>>,
    Path(model): Path<String>,
) -> Result<Json<PullResponse>, ServerError> {
    let model = model.trim();
    if model.is_empty() {
        return Err(ServerError::BadRequest("Model name is required".into()));
    }
    let ollama = state.providers.ollama();
    if let Err(e) = ollama.list_models().await {
        warn!(error = %e, "cannot pull: ollama is not running");
        return Err(ServerError::ServiceUnavailable(format!(
            "Ollama is not running at {}",
            ollama.base_url()
        )));
    }
    ollama.pull_model(model).await?;
    info!(model, "model pulled");
    Ok(Json(PullResponse { success: true, message: format!("Model '{model}' pulled successfully") }))
}
