use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, header};
use axum::middleware::Next;
use axum::response::Response;

use crate::auth::{AuthUser, token};
use crate::error::ServerError;
use crate::state::AppState;

/// Reject requests without a valid `Authorization: Bearer <jwt>` and attach
/// the caller as an [`AuthUser`] extension.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ServerError> {
    let user = authenticate(&state, bearer_token(req.headers()).as_deref())?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// The token of an `Authorization: Bearer <jwt>` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
}

/// Verify `bearer` against the server secret.
pub fn authenticate(state: &AppState, bearer: Option<&str>) -> Result<AuthUser, ServerError> {
    let Some(bearer) = bearer else {
        return Err(ServerError::Unauthorized("Not authenticated".into()));
    };
    let claims = token::verify(&state.config.secret_key, bearer)
        .ok_or_else(|| ServerError::Unauthorized("Invalid or expired token".into()))?;
    Ok(AuthUser { username: claims.sub, role: claims.role })
}
