use std::future::Future;

use chrono::Utc;

use crate::entities::{Conversation, SqliteStore, StoredMessage, parse_ts, ts};

pub trait ConversationStore: Send + Sync + 'static {
    fn create_conversation(&self, conv: Conversation) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    fn get_conversation(&self, id: &str) -> impl Future<Output = Result<Option<Conversation>, sqlx::Error>> + Send;
    /// Most recently updated first.
    fn list_conversations(
        &self,
        username: &str,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<Conversation>, sqlx::Error>> + Send;
    fn touch_conversation(&self, id: &str) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    /// Create `conv` unless it already exists, then append `messages` and
    /// bump it, all in one transaction. `false` (and nothing written) when
    /// the id belongs to another user.
    fn record_turn(
        &self,
        conv: &Conversation,
        messages: &[StoredMessage],
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;
    /// Removes the conversation and all of its messages. `false` if it did not exist.
    fn delete_conversation(&self, id: &str) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;
}

type Row = (String, String, Option<String>, String, String);

fn from_row((id, username, title, created_at, updated_at): Row) -> Conversation {
    Conversation {
        id,
        username,
        title,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    }
}

impl ConversationStore for SqliteStore {
    async fn create_conversation(&self, conv: Conversation) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO conversations (id, username, title, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&conv.id)
        .bind(&conv.username)
        .bind(&conv.title)
        .bind(ts(&conv.created_at))
        .bind(ts(&conv.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, sqlx::Error> {
        let row: Option<Row> = sqlx::query_as(
            "SELECT id, username, title, created_at, updated_at FROM conversations WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(from_row))
    }

    async fn list_conversations(&self, username: &str, limit: i64) -> Result<Vec<Conversation>, sqlx::Error> {
        let rows: Vec<Row> = sqlx::query_as(
            "SELECT id, username, title, created_at, updated_at FROM conversations \
             WHERE username = ?1 ORDER BY updated_at DESC LIMIT ?2",
        )
        .bind(username)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    async fn touch_conversation(&self, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE conversations SET updated_at = ?1 WHERE id = ?2")
            .bind(ts(&Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_turn(&self, conv: &Conversation, messages: &[StoredMessage]) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT OR IGNORE INTO conversations (id, username, title, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&conv.id)
        .bind(&conv.username)
        .bind(&conv.title)
        .bind(ts(&conv.created_at))
        .bind(ts(&conv.updated_at))
        .execute(&mut *tx)
        .await?;

        let (owner,): (String,) = sqlx::query_as("SELECT username FROM conversations WHERE id = ?1")
            .bind(&conv.id)
            .fetch_one(&mut *tx)
            .await?;
        if owner != conv.username {
            tx.rollback().await?;
            return Ok(false);
        }

        for m in messages {
            sqlx::query(
                "INSERT INTO messages (id, conversation_id, role, content, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&m.id)
            .bind(&conv.id)
            .bind(&m.role)
            .bind(&m.content)
            .bind(ts(&m.created_at))
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query("UPDATE conversations SET updated_at = ?1 WHERE id = ?2")
            .bind(ts(&Utc::now()))
            .bind(&conv.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn delete_conversation(&self, id: &str) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM messages WHERE conversation_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM conversations WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entities::MessageStore;
    use chrono::Duration;

    fn conv(id: &str, user: &str, age_secs: i64) -> Conversation {
        let t = Utc::now() - Duration::seconds(age_secs);
        Conversation {
            id: id.into(),
            username: user.into(),
            title: Some(format!("chat {id}")),
            created_at: t,
            updated_at: t,
        }
    }

    #[tokio::test]
    async fn list_is_per_user_newest_first() {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        store.create_conversation(conv("a", "alice", 30)).await.unwrap();
        store.create_conversation(conv("b", "alice", 10)).await.unwrap();
        store.create_conversation(conv("c", "bob", 0)).await.unwrap();

        let ids: Vec<String> = store
            .list_conversations("alice", 10)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);

        store.touch_conversation("a").await.unwrap();
        let first = store.list_conversations("alice", 1).await.unwrap();
        assert_eq!(first[0].id, "a");
    }

    #[tokio::test]
    async fn delete_cascades_messages() {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        store.create_conversation(conv("s1", "alice", 0)).await.unwrap();
        store
            .append_message(StoredMessage {
                id: "m1".into(),
                conversation_id: "s1".into(),
                role: "user".into(),
                content: "hi".into(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        assert!(store.delete_conversation("s1").await.unwrap());
        assert!(store.get_conversation("s1").await.unwrap().is_none());
        assert!(store.list_messages("s1").await.unwrap().is_empty());
        assert!(!store.delete_conversation("s1").await.unwrap());
    }

    fn msg(role: &str, content: &str) -> StoredMessage {
        StoredMessage {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: String::new(),
            role: role.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn record_turn_creates_on_first_write_only() {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        let c = conv("s1", "alice", 0);
        assert!(store.record_turn(&c, &[msg("user", "hi"), msg("assistant", "hello")]).await.unwrap());

        let mut again = conv("s1", "alice", 0);
        again.title = Some("other title".into());
        assert!(store.record_turn(&again, &[msg("user", "more"), msg("assistant", "sure")]).await.unwrap());

        let stored = store.get_conversation("s1").await.unwrap().unwrap();
        assert_eq!(stored.title.as_deref(), Some("chat s1"));
        let contents: Vec<String> = store.list_messages("s1").await.unwrap().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["hi", "hello", "more", "sure"]);
    }

    #[tokio::test]
    async fn record_turn_refuses_foreign_conversation() {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        store.record_turn(&conv("s1", "alice", 0), &[msg("user", "mine")]).await.unwrap();

        assert!(!store.record_turn(&conv("s1", "mallory", 0), &[msg("user", "sneaky")]).await.unwrap());
        let messages = store.list_messages("s1").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "mine");
    }

    #[tokio::test]
    async fn concurrent_first_turns_share_one_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("race.db").display());
        let store = SqliteStore::connect(&url).await.unwrap();

        let c = conv("same-id", "alice", 0);
        let first = [msg("user", "one")];
        let second = [msg("user", "two")];
        let (a, b) = tokio::join!(
            store.record_turn(&c, &first),
            store.record_turn(&c, &second),
        );
        assert!(a.unwrap());
        assert!(b.unwrap());
        assert_eq!(store.list_conversations("alice", 10).await.unwrap().len(), 1);
        assert_eq!(store.list_messages("same-id").await.unwrap().len(), 2);
    }
}
