//! Login and token verification.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use tracing::{info, warn};
use utoipa::OpenApi;
use validator::Validate;

use crate::auth::{AuthUser, client_ip, password, token};
use crate::entities::UserStore;
use crate::error::ServerError;
use crate::schemas::auth::{LoginRequest, LoginResponse, VerifyResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(login, verify),
    components(schemas(LoginRequest, LoginResponse, VerifyResponse))
)]
pub struct AuthApi;

/// `POST /auth/login`; reachable without a token.
pub fn public_router() -> Router<Arc<AppState>> {
    Router::new().route("/auth/login", post(login))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/auth/verify", get(verify))
}

/// Exchange username and password for a bearer token.
///
/// Five failed attempts from one client address within five minutes lock
/// that address out until the window clears.
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 400, description = "Missing username or password"),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many failed attempts"),
    )
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    peer: Option<Extension<ConnectInfo<SocketAddr>>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ServerError> {
    let client = client_ip(&headers, peer.map(|Extension(ConnectInfo(addr))| addr));
    if !state.login_limiter.check(&client) {
        warn!(client = %client, "login rate limit exceeded");
        return Err(ServerError::TooManyRequests(
            "Too many failed login attempts. Try again later.".into(),
        ));
    }
    req.validate()?;

    let user = state.store.get_user(req.username.trim()).await?;
    let valid = password::verify_user(user.as_ref().map(|u| u.password_hash.as_str()), &req.password);
    let Some(user) = user.filter(|_| valid) else {
        state.login_limiter.record_failure(&client);
        warn!(client = %client, username = %req.username, "failed login");
        return Err(ServerError::Unauthorized("Invalid username or password".into()));
    };
    state.login_limiter.clear(&client);

    let ttl = state.config.token_ttl();
    let access_token = token::issue(&state.config.secret_key, &user.username, &user.role, ttl)?;
    info!(username = %user.username, "user logged in");
    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer".into(),
        expires_in: ttl.as_secs(),
        username: user.username,
        role: user.role,
    }))
}

/// Echo the identity behind the presented token.
#[utoipa::path(
    get,
    path = "/auth/verify",
    tag = "auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Token is valid", body = VerifyResponse),
        (status = 401, description = "Missing or invalid token"),
    )
)]
pub async fn verify(Extension(user): Extension<AuthUser>) -> Json<VerifyResponse> {
    Json(VerifyResponse { valid: true, username: user.username, role: user.role })
}
