use chrono::{DateTime, Utc};

/// A row in the `saved_chats` table, pointing at a file in `uploads/exports`.
#[derive(Debug, Clone)]
pub struct SavedChat {
    pub id: String,
    pub username: String,
    pub filename: String,
    /// `txt`, `md` or `json`.
    pub format: String,
    pub title: Option<String>,
    pub message_count: i64,
    pub created_at: DateTime<Utc>,
}
