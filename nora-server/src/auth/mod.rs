//! Authentication primitives: tokens, password hashes, login rate limiting.
//!
//! The axum middleware that enforces bearer tokens lives in
//! [`crate::middleware::auth`].

pub mod limiter;
pub mod password;
pub mod token;

use std::net::SocketAddr;

use axum::http::HeaderMap;
use chrono::Utc;
use tracing::info;

use crate::entities::{UserRecord, UserStore};
use crate::error::ServerError;

pub use limiter::LoginLimiter;

pub const ADMIN_ROLE: &str = "admin";

/// Identity attached to authenticated requests as an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub username: String,
    pub role: String,
}

/// Client address for rate limiting: `CF-Connecting-IP`, then the first
/// `X-Forwarded-For` hop, then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    if let Some(ip) = header("cf-connecting-ip") {
        return ip.to_owned();
    }
    if let Some(hop) = header("x-forwarded-for").and_then(|v| v.split(',').next()) {
        let hop = hop.trim();
        if !hop.is_empty() {
            return hop.to_owned();
        }
    }
    peer.map(|p| p.ip().to_string()).unwrap_or_else(|| "unknown".to_owned())
}

/// Create the configured admin account, or reset its password and role.
pub async fn ensure_admin(store: &impl UserStore, username: &str, password: &str) -> Result<(), ServerError> {
    let password_hash = password::hash(password)?;
    store
        .upsert_user(UserRecord {
            username: username.to_owned(),
            password_hash,
            role: ADMIN_ROLE.to_owned(),
            created_at: Utc::now(),
        })
        .await?;
    info!(username, "admin account ready");
    Ok(())
}
