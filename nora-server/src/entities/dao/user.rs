use chrono::{DateTime, Utc};

/// A row in the `users` table.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub username: String,
    /// Argon2 PHC string.
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}
