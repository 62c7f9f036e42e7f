use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use super::{DbPool, NewMessage, StoredMessage};
use crate::models::chat::{QueryType, Role};

/// Durable, append-only message log keyed by session
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert one message, returning its id
    async fn append(&self, message: NewMessage) -> Result<i64>;

    /// Insert a user message and its reply atomically: both or neither
    async fn append_exchange(&self, user: NewMessage, assistant: NewMessage) -> Result<()>;

    /// The most recent `limit` messages of a session, oldest first
    async fn list(&self, session_id: &str, limit: i64) -> Result<Vec<StoredMessage>>;

    /// Delete a session's messages, returning how many were removed
    async fn delete(&self, session_id: &str) -> Result<u64>;

    /// Session ids ordered by most recent activity
    async fn distinct_sessions(&self, limit: i64) -> Result<Vec<String>>;

    /// Messages in one session, or in total when `session_id` is None
    async fn count(&self, session_id: Option<String>) -> Result<i64>;

    async fn ping(&self) -> Result<()>;
}

/// Persist one user/assistant exchange
pub async fn save_exchange(
    store: &dyn MessageStore,
    session_id: &str,
    query: &str,
    query_type: Option<QueryType>,
    response: &str,
    calculation_result: Option<&str>,
) -> Result<()> {
    let metadata = calculation_result.map(|r| json!({ "calculation_result": r }));

    let user = NewMessage {
        session_id: session_id.to_string(),
        role: Role::User,
        content: query.to_string(),
        query_type,
        metadata: metadata.clone(),
    };
    let assistant = NewMessage {
        session_id: session_id.to_string(),
        role: Role::Assistant,
        content: response.to_string(),
        query_type: None,
        metadata,
    };

    store.append_exchange(user, assistant).await?;

    debug!("Saved exchange for session {}", session_id);
    Ok(())
}

async fn insert_message<'e, E>(executor: E, message: &NewMessage) -> Result<i64>
where
    E: sqlx::PgExecutor<'e>,
{
    let id = sqlx::query_scalar::<_, i64>(
        r#"INSERT INTO chat_messages (session_id, message, message_type, query_type, metadata)
           VALUES ($1, $2, $3, $4, $5)
           RETURNING id"#,
    )
    .bind(&message.session_id)
    .bind(&message.content)
    .bind(message.role.as_str())
    .bind(message.query_type.map(|qt| qt.as_str()))
    .bind(&message.metadata)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

pub struct Repository {
    pub pool: DbPool,
}

impl Repository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create the message table and its index if missing
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS chat_messages (
                id BIGSERIAL PRIMARY KEY,
                session_id VARCHAR(255) NOT NULL,
                message TEXT NOT NULL,
                message_type VARCHAR(10) NOT NULL,
                query_type VARCHAR(20),
                metadata JSONB,
                timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"#,
        )
        .execute(self.pool.get_pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_messages_session_ts \
             ON chat_messages (session_id, timestamp)",
        )
        .execute(self.pool.get_pool())
        .await?;

        info!("chat_messages schema ready");
        Ok(())
    }
}

#[async_trait]
impl MessageStore for Repository {
    async fn append(&self, message: NewMessage) -> Result<i64> {
        insert_message(self.pool.get_pool(), &message).await
    }

    async fn append_exchange(&self, user: NewMessage, assistant: NewMessage) -> Result<()> {
        let mut transaction = self.pool.get_pool().begin().await?;

        insert_message(&mut *transaction, &user).await?;
        insert_message(&mut *transaction, &assistant).await?;

        // an uncommitted transaction rolls back on drop
        transaction.commit().await?;
        Ok(())
    }

    async fn list(&self, session_id: &str, limit: i64) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query_as::<_, StoredMessage>(
            r#"SELECT id, session_id, message, message_type, query_type, metadata, timestamp
               FROM (
                   SELECT id, session_id, message, message_type, query_type, metadata, timestamp
                   FROM chat_messages
                   WHERE session_id = $1
                   ORDER BY timestamp DESC, id DESC
                   LIMIT $2
               ) recent
               ORDER BY timestamp ASC, id ASC"#,
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(self.pool.get_pool())
        .await?;

        debug!("Loaded {} stored messages for session {}", rows.len(), session_id);
        Ok(rows)
    }

    async fn delete(&self, session_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chat_messages WHERE session_id = $1")
            .bind(session_id)
            .execute(self.pool.get_pool())
            .await?;

        Ok(result.rows_affected())
    }

    async fn distinct_sessions(&self, limit: i64) -> Result<Vec<String>> {
        let sessions = sqlx::query_scalar::<_, String>(
            r#"SELECT session_id
               FROM chat_messages
               GROUP BY session_id
               ORDER BY MAX(timestamp) DESC
               LIMIT $1"#,
        )
        .bind(limit)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(sessions)
    }

    async fn count(&self, session_id: Option<String>) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM chat_messages WHERE ($1::TEXT IS NULL OR session_id = $1)",
        )
        .bind(session_id)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(count)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(self.pool.get_pool()).await?;
        Ok(())
    }
}
