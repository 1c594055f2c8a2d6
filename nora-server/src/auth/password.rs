//! Argon2 password hashing (PHC string format).

use std::sync::LazyLock;

use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng};

use crate::error::ServerError;

pub fn hash(password: &str) -> Result<String, ServerError> {
    if password.is_empty() {
        return Err(ServerError::BadRequest("password is empty".into()));
    }
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ServerError::Internal(format!("password hashing failed: {e}")))
}

/// Stands in for the stored hash of an unknown user so a failed lookup
/// costs as much as a wrong password.
static DUMMY_HASH: LazyLock<String> = LazyLock::new(|| hash("nora-unknown-user").unwrap_or_default());

/// `false` for a wrong password and for an unparsable stored hash.
pub fn verify(stored_hash: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

/// Verify `password` against a user's hash; `None` (no such user) always
/// fails after a full verification against a dummy hash.
pub fn verify_user(stored_hash: Option<&str>, password: &str) -> bool {
    match stored_hash {
        Some(stored) => verify(stored, password),
        None => {
            verify(&DUMMY_HASH, password);
            false
        }
    }
}
