use std::future::Future;

use crate::entities::{SqliteStore, UserRecord, parse_ts, ts};

pub trait UserStore: Send + Sync + 'static {
    /// Insert or replace the password hash and role of `user.username`.
    fn upsert_user(&self, user: UserRecord) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    fn get_user(&self, username: &str) -> impl Future<Output = Result<Option<UserRecord>, sqlx::Error>> + Send;
}

impl UserStore for SqliteStore {
    async fn upsert_user(&self, user: UserRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO users (username, password_hash, role, created_at) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT (username) DO UPDATE SET password_hash = excluded.password_hash, role = excluded.role",
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(ts(&user.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_user(&self, username: &str) -> Result<Option<UserRecord>, sqlx::Error> {
        let row: Option<(String, String, String, String)> = sqlx::query_as(
            "SELECT username, password_hash, role, created_at FROM users WHERE username = ?1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(username, password_hash, role, created_at)| UserRecord {
            username,
            password_hash,
            role,
            created_at: parse_ts(&created_at),
        }))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;

    fn user(hash: &str, role: &str) -> UserRecord {
        UserRecord {
            username: "admin".into(),
            password_hash: hash.into(),
            role: role.into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_hash_and_role() {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        assert!(store.get_user("admin").await.unwrap().is_none());

        store.upsert_user(user("h1", "user")).await.unwrap();
        store.upsert_user(user("h2", "admin")).await.unwrap();

        let got = store.get_user("admin").await.unwrap().unwrap();
        assert_eq!(got.password_hash, "h2");
        assert_eq!(got.role, "admin");
    }
}
