//! Health / heartbeat endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use utoipa::OpenApi;

use crate::schemas::system::HealthResponse;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_health), components(schemas(HealthResponse)))]
pub struct HealthApi;

/// Register health-check routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

/// Heartbeat endpoint.
///
/// Always 200 while the process is up. Reports the default provider and the
/// deployment flags (never the tunnel token itself).
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is healthy", body = HealthResponse)
    )
)]
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let provider = state.providers.default_kind();
    let model = state
        .providers
        .get(provider)
        .map(|p| p.default_model().to_owned())
        .unwrap_or_else(|| state.config.ai_model.clone());
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        provider: provider.to_string(),
        model,
        memory_enabled: state.config.enable_memory,
        deployment: state.config.deployment.clone(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::routes::test_support::TestApp;

    #[tokio::test]
    async fn health_response_has_ok_status() {
        let app = TestApp::new().await;
        let Json(body) = get_health(State(app.state.clone())).await;
        assert_eq!(body.status, "ok");
        assert!(!body.version.is_empty());
        assert_eq!(body.provider, "ollama");
    }

    #[tokio::test]
    async fn health_never_exposes_tunnel_token() {
        let app = TestApp::new().await;
        let Json(body) = get_health(State(app.state.clone())).await;
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["deployment"]["cloudflare_tunnel_configured"], false);
        assert!(json["deployment"].get("cloudflare_tunnel_token").is_none());
    }
}
