use crate::models::chat::{
    CleanupResponse, HistoryQuery, SessionClearResponse, SessionHistoryResponse,
    StatisticsResponse,
};
use crate::services::ConversationManager;
use crate::utils::error::ApiError;
use crate::utils::validators::validate_session_id;
use axum::{
    extract::{Extension, Path, Query},
    Json,
};
use std::sync::Arc;
use tracing::debug;

const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 100;

/// GET /api/chat/history/{session_id}?limit=20
pub async fn history_handler(
    Extension(manager): Extension<Arc<ConversationManager>>,
    Path(session_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<SessionHistoryResponse>, ApiError> {
    validate_session_id(&session_id)?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let (history, source) = manager
        .session_history(&session_id, limit)
        .await
        .map_err(|e| ApiError::DatabaseError(format!("{:#}", e)))?;

    debug!("History for {}: {} entries from {:?}", session_id, history.len(), source);

    Ok(Json(SessionHistoryResponse {
        success: true,
        session_id,
        history,
        source,
    }))
}

/// DELETE /api/chat/session/{session_id}
pub async fn clear_session_handler(
    Extension(manager): Extension<Arc<ConversationManager>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionClearResponse>, ApiError> {
    validate_session_id(&session_id)?;

    let cleared = manager
        .clear_session(&session_id)
        .await
        .map_err(|e| ApiError::DatabaseError(format!("{:#}", e)))?;

    Ok(Json(cleared))
}

/// GET /api/chat/statistics
pub async fn statistics_handler(
    Extension(manager): Extension<Arc<ConversationManager>>,
) -> Result<Json<StatisticsResponse>, ApiError> {
    let stats = manager
        .statistics()
        .await
        .map_err(|e| ApiError::DatabaseError(format!("{:#}", e)))?;

    Ok(Json(stats))
}

/// POST /api/chat/cleanup
pub async fn cleanup_handler(
    Extension(manager): Extension<Arc<ConversationManager>>,
) -> Json<CleanupResponse> {
    Json(CleanupResponse {
        success: true,
        sessions_cleaned: manager.cleanup_expired_sessions(),
    })
}
