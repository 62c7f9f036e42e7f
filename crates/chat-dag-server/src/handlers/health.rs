use crate::services::ConversationManager;
use crate::utils::error::ApiError;
use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    service: String,
    version: String,
}

pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            service: "chatbot".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    ready: bool,
    database: String,
}

/// 200 when the message store answers, 503 otherwise
pub async fn readiness_check(
    Extension(manager): Extension<Arc<ConversationManager>>,
) -> Result<Json<ReadinessResponse>, ApiError> {
    manager
        .store()
        .ping()
        .await
        .map_err(|e| ApiError::Unavailable(format!("database: {:#}", e)))?;

    Ok(Json(ReadinessResponse {
        ready: true,
        database: "ok".to_string(),
    }))
}
