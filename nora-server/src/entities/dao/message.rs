use chrono::{DateTime, Utc};

/// A single message row in the `messages` table.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    /// `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
