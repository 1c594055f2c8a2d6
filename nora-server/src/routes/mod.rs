//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (CORS, per-request trace-ID injection)
//! - Optional Swagger UI / OpenAPI document endpoint (disable with `NORA_ENABLE_SWAGGER=false`)
//! - Public routes: health, login, UI config and the static web client
//! - The `/ws` command channel, which checks its own token
//! - Everything else behind the bearer-token route layer

mod auth;
mod chat;
mod config;
pub mod doc;
mod files;
mod health;
mod providers;
mod ws;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use axum::{Router, middleware};
use tower::ServiceBuilder;
use tower_http::services::{ServeDir, ServeFile};
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::{auth::require_auth, cors, trace};
use crate::state::AppState;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .merge(auth::router())
        .merge(chat::router())
        .merge(files::router(state.files.max_upload_bytes()))
        .merge(providers::router())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let public = Router::new()
        .merge(health::router())
        .merge(auth::public_router())
        .merge(config::router())
        .merge(ws::router());

    let mut app = Router::new().merge(public).merge(protected);

    if state.config.enable_swagger {
        app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", doc::get_docs()));
    }

    // Unknown paths fall through to the web client.
    let static_dir = &state.config.static_dir;
    let web_client = ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    app.fallback_service(web_client)
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(&state)))
        .layer(middleware::from_fn_with_state(state.clone(), trace::trace_middleware))
        .with_state(state)
}
