use std::future::Future;

use crate::entities::{SavedChat, SqliteStore, parse_ts, ts};

/// Saved transcripts kept per user; older ones are evicted.
pub const MAX_SAVED_CHATS: usize = 50;

pub trait SavedChatStore: Send + Sync + 'static {
    fn insert_saved_chat(&self, chat: SavedChat) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    /// Newest first.
    fn list_saved_chats(&self, username: &str) -> impl Future<Output = Result<Vec<SavedChat>, sqlx::Error>> + Send;
    /// Delete everything beyond the newest `keep` rows of `username` and
    /// return the deleted rows so their files can be removed.
    fn evict_saved_chats(
        &self,
        username: &str,
        keep: usize,
    ) -> impl Future<Output = Result<Vec<SavedChat>, sqlx::Error>> + Send;
}

type Row = (String, String, String, String, Option<String>, i64, String);

fn from_row((id, username, filename, format, title, message_count, created_at): Row) -> SavedChat {
    SavedChat {
        id,
        username,
        filename,
        format,
        title,
        message_count,
        created_at: parse_ts(&created_at),
    }
}

impl SavedChatStore for SqliteStore {
    async fn insert_saved_chat(&self, chat: SavedChat) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO saved_chats (id, username, filename, format, title, message_count, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&chat.id)
        .bind(&chat.username)
        .bind(&chat.filename)
        .bind(&chat.format)
        .bind(&chat.title)
        .bind(chat.message_count)
        .bind(ts(&chat.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_saved_chats(&self, username: &str) -> Result<Vec<SavedChat>, sqlx::Error> {
        let rows: Vec<Row> = sqlx::query_as(
            "SELECT id, username, filename, format, title, message_count, created_at \
             FROM saved_chats WHERE username = ?1 ORDER BY created_at DESC, rowid DESC",
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    async fn evict_saved_chats(&self, username: &str, keep: usize) -> Result<Vec<SavedChat>, sqlx::Error> {
        let evicted: Vec<SavedChat> = self.list_saved_chats(username).await?.into_iter().skip(keep).collect();
        if evicted.is_empty() {
            return Ok(evicted);
        }
        let mut tx = self.pool.begin().await?;
        for chat in &evicted {
            sqlx::query("DELETE FROM saved_chats WHERE id = ?1")
                .bind(&chat.id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(evicted)
    }
}
