use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::database::{save_exchange, MessageStore};
use crate::models::chat::{
    ChatResponse, HistoryEntry, HistorySource, SessionClearResponse, SessionId,
    StatisticsResponse,
};
use crate::services::workflow::{WorkflowEngine, MAX_HISTORY_ENTRIES};
use crate::utils::validators::validate_and_sanitize;

use super::cache::SessionCache;

pub const SERVICE_FAULT_RESPONSE: &str = "An unexpected error occurred. Please try again.";

const RECENT_SESSIONS_LIMIT: i64 = 5;

/// Orchestrates one chat turn: history lookup, engine run, persistence.
///
/// Requests for the same session are serialized by a per-session async
/// lock held across the whole read-process-write cycle, so two turns can
/// never overwrite each other's history. Different sessions never share
/// a lock.
pub struct ConversationManager {
    engine: Arc<WorkflowEngine>,
    cache: SessionCache,
    store: Arc<dyn MessageStore>,
    session_locks: DashMap<SessionId, Arc<Mutex<()>>>,
}

impl ConversationManager {
    pub fn new(
        engine: Arc<WorkflowEngine>,
        cache: SessionCache,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            engine,
            cache,
            store,
            session_locks: DashMap::new(),
        }
    }

    pub fn new_session_id() -> SessionId {
        format!("session-{}", uuid::Uuid::new_v4())
    }

    fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.session_locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop locks nobody is holding or waiting on
    fn prune_idle_locks(&self) {
        self.session_locks
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Process one user message end to end
    pub async fn handle_message(&self, query: &str, session_id: Option<String>) -> ChatResponse {
        let session_id = session_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(Self::new_session_id);

        let clean_query = match validate_and_sanitize(query) {
            Ok(q) => q,
            Err(e) => {
                warn!("Rejected query for session {}: {}", session_id, e);
                return ChatResponse {
                    success: false,
                    session_id,
                    response: format!("Invalid query: {}", e),
                    query_type: None,
                    calculation_result: None,
                    error: Some(e.to_string()),
                };
            }
        };

        let lock = self.session_lock(&session_id);
        let _guard = lock.lock().await;

        let history = match self.load_history(&session_id).await {
            Ok(history) => history,
            Err(e) => {
                error!("Failed to load history for session {}: {:#}", session_id, e);
                return ChatResponse {
                    success: false,
                    session_id,
                    response: SERVICE_FAULT_RESPONSE.to_string(),
                    query_type: None,
                    calculation_result: None,
                    error: Some(format!("{:#}", e)),
                };
            }
        };

        let result = self
            .engine
            .process_query(&clean_query, &session_id, history)
            .await;

        if result.success {
            if let Err(e) = save_exchange(
                self.store.as_ref(),
                &session_id,
                &clean_query,
                result.query_type,
                &result.response,
                result.calculation_result.as_deref(),
            )
            .await
            {
                warn!("Failed to persist exchange for session {}: {:#}", session_id, e);
            }

            self.cache.put(&session_id, result.history);
            info!(
                "Session {} answered ({})",
                session_id,
                result.query_type.map(|qt| qt.as_str()).unwrap_or("unknown")
            );
        }

        ChatResponse {
            success: result.success,
            session_id,
            response: result.response,
            query_type: result.query_type,
            calculation_result: result.calculation_result,
            error: result.error,
        }
    }

    /// Cache first; on miss read the store and warm the cache
    async fn load_history(&self, session_id: &str) -> Result<Vec<HistoryEntry>> {
        if let Some(history) = self.cache.get(session_id) {
            return Ok(history);
        }

        let history: Vec<HistoryEntry> = self
            .store
            .list(session_id, MAX_HISTORY_ENTRIES as i64)
            .await?
            .into_iter()
            .map(|m| m.into_history_entry())
            .collect();

        debug!(
            "Cache miss for session {}, loaded {} entries from store",
            session_id,
            history.len()
        );
        if !history.is_empty() {
            self.cache.put(session_id, history.clone());
        }
        Ok(history)
    }

    /// The most recent `limit` entries and where they came from
    pub async fn session_history(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<(Vec<HistoryEntry>, HistorySource)> {
        if let Some(mut history) = self.cache.get(session_id) {
            let excess = history.len().saturating_sub(limit);
            history.drain(..excess);
            return Ok((history, HistorySource::Cache));
        }

        let history = self
            .store
            .list(session_id, limit as i64)
            .await?
            .into_iter()
            .map(|m| m.into_history_entry())
            .collect();
        Ok((history, HistorySource::Database))
    }

    /// Remove a session from the cache and the store
    pub async fn clear_session(&self, session_id: &str) -> Result<SessionClearResponse> {
        let lock = self.session_lock(session_id);
        let (cache_cleared, deleted) = {
            let _guard = lock.lock().await;
            (self.cache.invalidate(session_id), self.store.delete(session_id).await)
        };
        drop(lock);
        self.prune_idle_locks();

        let messages_deleted = deleted?;
        info!(
            "Cleared session {} (cache: {}, messages: {})",
            session_id, cache_cleared, messages_deleted
        );

        Ok(SessionClearResponse {
            success: true,
            session_id: session_id.to_string(),
            cache_cleared,
            messages_deleted,
        })
    }

    pub async fn statistics(&self) -> Result<StatisticsResponse> {
        let total_messages = self.store.count(None).await?;
        let recent_sessions = self.store.distinct_sessions(RECENT_SESSIONS_LIMIT).await?;

        Ok(StatisticsResponse {
            total_messages,
            active_sessions: self.cache.size(),
            recent_sessions,
        })
    }

    /// Sweep expired cache entries; returns how many were evicted
    pub fn cleanup_expired_sessions(&self) -> usize {
        let swept = self.cache.sweep_expired();
        self.prune_idle_locks();
        if swept > 0 {
            info!("🧹 Cleaned up {} expired sessions", swept);
        }
        swept
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }
}
