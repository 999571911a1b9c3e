use sqlx::SqlitePool;
use thiserror::Error;
use time::OffsetDateTime;

use crate::hub::UserId;

/// Identity a message gets once it is durable. Immutable after assignment;
/// every recipient of the message sees these exact values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: i64,
    /// Unix timestamp, seconds.
    pub created_at: i64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

/// Durable append of chat messages. The dispatch engine persists through
/// this before computing any delivery.
pub trait MessageStore {
    fn store(
        &self,
        room_id: Option<&str>,
        sender_user_id: UserId,
        body: &str,
    ) -> impl Future<Output = Result<StoredMessage, StoreError>> + Send;
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl MessageStore for SqliteStore {
    async fn store(
        &self,
        room_id: Option<&str>,
        sender_user_id: UserId,
        body: &str,
    ) -> Result<StoredMessage, StoreError> {
        let created_at = OffsetDateTime::now_utc().unix_timestamp();
        let result =
            sqlx::query("INSERT INTO chattings (room_id,send_user_id,message,created_at) VALUES (?,?,?,?)")
                .bind(room_id)
                .bind(sender_user_id)
                .bind(body)
                .bind(created_at)
                .execute(&self.pool)
                .await?;
        Ok(StoredMessage {
            id: result.last_insert_rowid(),
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        // one connection, or each checkout would see its own :memory: db
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::init(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn store_assigns_increasing_ids() {
        let store = SqliteStore::new(memory_pool().await);
        let first = store.store(Some("r1"), 1, "hi").await.unwrap();
        let second = store.store(None, 2, "hey").await.unwrap();
        assert!(second.id > first.id);
        assert!(first.created_at > 0);
    }
}
