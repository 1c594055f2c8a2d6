use std::future::Future;

use crate::entities::{SqliteStore, StoredMessage, parse_ts, ts};

pub trait MessageStore: Send + Sync + 'static {
    fn append_message(&self, msg: StoredMessage) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    /// The last `limit` messages of a conversation, oldest first.
    fn recent_messages(
        &self,
        conversation_id: &str,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<StoredMessage>, sqlx::Error>> + Send;
    fn list_messages(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<Vec<StoredMessage>, sqlx::Error>> + Send;
}

type Row = (String, String, String, String, String);

fn from_row((id, conversation_id, role, content, created_at): Row) -> StoredMessage {
    StoredMessage { id, conversation_id, role, content, created_at: parse_ts(&created_at) }
}

impl MessageStore for SqliteStore {
    async fn append_message(&self, msg: StoredMessage) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&msg.id)
        .bind(&msg.conversation_id)
        .bind(&msg.role)
        .bind(&msg.content)
        .bind(ts(&msg.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_messages(&self, conversation_id: &str, limit: i64) -> Result<Vec<StoredMessage>, sqlx::Error> {
        let rows: Vec<Row> = sqlx::query_as(
            "SELECT id, conversation_id, role, content, created_at FROM messages \
             WHERE conversation_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        let mut messages: Vec<StoredMessage> = rows.into_iter().map(from_row).collect();
        messages.reverse();
        Ok(messages)
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, sqlx::Error> {
        let rows: Vec<Row> = sqlx::query_as(
            "SELECT id, conversation_id, role, content, created_at FROM messages \
             WHERE conversation_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entities::{Conversation, ConversationStore};
    use chrono::{Duration, Utc};

    async fn seeded() -> SqliteStore {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        let now = Utc::now();
        store
            .create_conversation(Conversation {
                id: "s".into(),
                username: "u".into(),
                title: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        for i in 0..5 {
            store
                .append_message(StoredMessage {
                    id: format!("m{i}"),
                    conversation_id: "s".into(),
                    role: if i % 2 == 0 { "user" } else { "assistant" }.into(),
                    content: format!("msg {i}"),
                    created_at: now + Duration::milliseconds(i),
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn recent_returns_tail_in_order() {
        let store = seeded().await;
        let recent: Vec<String> = store
            .recent_messages("s", 3)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(recent, vec!["msg 2", "msg 3", "msg 4"]);
    }

    #[tokio::test]
    async fn list_returns_everything_oldest_first() {
        let store = seeded().await;
        let all = store.list_messages("s").await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].id, "m0");
        assert_eq!(all[4].role, "user");
        assert!(store.list_messages("other").await.unwrap().is_empty());
    }
}
