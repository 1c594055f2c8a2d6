//! HS256 JSON Web Tokens signed with the server's `SECRET_KEY`.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::ServerError;

type HmacSha256 = Hmac<Sha256>;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

fn mac(secret: &str) -> Result<HmacSha256, ServerError> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ServerError::Internal(format!("invalid signing key: {e}")))
}

/// Sign a token for `username` valid for `ttl` from now.
pub fn issue(secret: &str, username: &str, role: &str, ttl: Duration) -> Result<String, ServerError> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: username.to_owned(),
        role: role.to_owned(),
        iat: now,
        exp: now + ttl.as_secs() as i64,
    };
    encode(secret, &claims)
}

pub fn encode(secret: &str, claims: &Claims) -> Result<String, ServerError> {
    let payload = serde_json::to_vec(claims).map_err(|e| ServerError::Internal(e.to_string()))?;
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(HEADER),
        URL_SAFE_NO_PAD.encode(payload)
    );
    let mut mac = mac(secret)?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{signing_input}.{signature}"))
}

/// Claims of a well-formed, correctly signed, unexpired token.
pub fn verify(secret: &str, token: &str) -> Option<Claims> {
    verify_at(secret, token, chrono::Utc::now().timestamp())
}

pub fn verify_at(secret: &str, token: &str, now: i64) -> Option<Claims> {
    let mut parts = token.split('.');
    let (header_b64, payload, signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let header: Header = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header_b64).ok()?).ok()?;
    if header.alg != "HS256" {
        return None;
    }

    let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
    let mut mac = mac(secret).ok()?;
    mac.update(format!("{header_b64}.{payload}").as_bytes());
    // Constant-time comparison.
    mac.verify_slice(&signature).ok()?;

    let claims: Claims = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).ok()?).ok()?;
    (claims.exp > now).then_some(claims)
}
