use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::models::chat::{HistoryEntry, QueryType, Role};

/// Row of `chat_messages`
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StoredMessage {
    pub id: i64,
    pub session_id: String,
    pub message: String,
    pub message_type: String,
    pub query_type: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl StoredMessage {
    pub fn into_history_entry(self) -> HistoryEntry {
        HistoryEntry {
            role: Role::from_db(&self.message_type),
            content: self.message,
            query_type: self.query_type.as_deref().and_then(QueryType::parse),
            timestamp: Some(self.timestamp),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub query_type: Option<QueryType>,
    pub metadata: Option<serde_json::Value>,
}
