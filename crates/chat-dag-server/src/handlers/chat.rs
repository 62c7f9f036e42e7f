use crate::models::chat::{ChatRequest, ChatResponse};
use crate::services::ConversationManager;
use crate::utils::error::ApiError;
use crate::utils::validators::{validate_query, validate_session_id};
use axum::{
    extract::{rejection::JsonRejection, Extension},
    Json,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// POST /api/chat
pub async fn chat_handler(
    Extension(manager): Extension<Arc<ConversationManager>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let start_time = Instant::now();
    let Json(request) = payload?;

    validate_query(&request.query)?;
    if let Some(session_id) = request.session_id.as_deref() {
        validate_session_id(session_id)?;
    }

    let response = manager
        .handle_message(&request.query, request.session_id)
        .await;

    info!(
        "Chat request: session={}, success={}, query_type={:?}, took={:?}",
        response.session_id,
        response.success,
        response.query_type,
        start_time.elapsed()
    );

    Ok(Json(response))
}
