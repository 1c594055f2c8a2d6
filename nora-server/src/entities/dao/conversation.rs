use chrono::{DateTime, Utc};

/// A row in the `conversations` table; `id` is the client-facing session id.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: String,
    pub username: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
