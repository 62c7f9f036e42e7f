use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque conversation identifier
pub type SessionId = String;

// ===== CONVERSATION MODELS =====

/// Who produced a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "user" => Self::User,
            // older rows were written with "bot"
            _ => Self::Assistant,
        }
    }
}

/// Path chosen by the classification stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Text,
    Calculation,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Calculation => "calculation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "calculation" => Some(Self::Calculation),
            _ => None,
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a rolling history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_type: Option<QueryType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    pub fn user(content: impl Into<String>, query_type: Option<QueryType>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            query_type,
            timestamp: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            query_type: None,
            timestamp: None,
        }
    }
}

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub success: bool,
    pub session_id: String,
    pub response: String,
    pub query_type: Option<QueryType>,
    pub calculation_result: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistorySource {
    Cache,
    Database,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionHistoryResponse {
    pub success: bool,
    pub session_id: String,
    pub history: Vec<HistoryEntry>,
    pub source: HistorySource,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClearResponse {
    pub success: bool,
    pub session_id: String,
    pub cache_cleared: bool,
    pub messages_deleted: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatisticsResponse {
    pub total_messages: i64,
    pub active_sessions: usize,
    pub recent_sessions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub success: bool,
    pub sessions_cleaned: usize,
}
