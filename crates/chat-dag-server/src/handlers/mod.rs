pub mod chat;
pub mod health;
pub mod session;

use axum::{
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Extension, Router,
};
use std::any::Any;
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::services::ConversationManager;
use crate::utils::error::ApiError;

pub fn build_router(manager: Arc<ConversationManager>) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let chat_routes = Router::new()
        .route("/api/chat", post(chat::chat_handler))
        .route("/api/chat/history/{session_id}", get(session::history_handler))
        .route("/api/chat/session/{session_id}", delete(session::clear_session_handler))
        .route("/api/chat/statistics", get(session::statistics_handler))
        .route("/api/chat/cleanup", post(session::cleanup_handler));

    Router::new()
        .merge(public_routes)
        .merge(chat_routes)
        .layer(Extension(manager))
        // CORS
        .layer(
            CorsLayer::permissive()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // Tracing
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
        .layer(CatchPanicLayer::custom(panic_response))
}

/// A panicking handler still answers with the JSON error body
fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!("Handler panicked: {}", detail);

    ApiError::InternalError("An unexpected error occurred. Please try again.".to_string())
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MockMessageStore;
    use crate::models::chat::HistoryEntry;
    use crate::services::llm_service::MockLlmProvider;
    use crate::services::{SessionCache, WorkflowEngine};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(store: MockMessageStore) -> (Router, Arc<ConversationManager>) {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .returning(|_| Ok("Hi there!".to_string()));
        let engine = Arc::new(WorkflowEngine::new(Arc::new(llm), Duration::from_secs(5)));
        let manager = Arc::new(ConversationManager::new(
            engine,
            SessionCache::default(),
            Arc::new(store),
        ));
        (build_router(manager.clone()), manager)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_chat_calculation() {
        let mut store = MockMessageStore::new();
        store.expect_list().returning(|_, _| Ok(Vec::new()));
        store.expect_append_exchange().times(1).returning(|_, _| Ok(()));
        let (app, _) = app(store);

        let (status, body) = send(app, post_json("/api/chat", json!({ "query": "what is 5 + 3?" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["query_type"], "calculation");
        assert_eq!(body["calculation_result"], "8");
        assert!(body["session_id"].as_str().unwrap().starts_with("session-"));
    }

    #[tokio::test]
    async fn test_chat_text_keeps_session_id() {
        let mut store = MockMessageStore::new();
        store.expect_list().returning(|_, _| Ok(Vec::new()));
        store.expect_append_exchange().returning(|_, _| Ok(()));
        let (app, manager) = app(store);

        let request = post_json("/api/chat", json!({ "query": "hello", "session_id": "session-abc" }));
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session_id"], "session-abc");
        assert_eq!(body["response"], "Hi there!");
        assert_eq!(body["query_type"], "text");
        assert!(body["calculation_result"].is_null());
        assert!(manager.cache().exists("session-abc"));
    }

    #[tokio::test]
    async fn test_chat_rejects_bad_input() {
        let (app, _) = app(MockMessageStore::new());

        let (status, body) = send(app.clone(), post_json("/api/chat", json!({ "query": "   " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let long = "a".repeat(5001);
        let (status, _) = send(app.clone(), post_json("/api/chat", json!({ "query": long }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = post_json("/api/chat", json!({ "query": "hi", "session_id": "bad id!" }));
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Session ID contains invalid characters");
    }

    #[tokio::test]
    async fn test_history_from_cache() {
        let (app, manager) = app(MockMessageStore::new());
        manager.cache().put(
            "session-a",
            vec![HistoryEntry::user("2+2", None), HistoryEntry::assistant("4")],
        );

        let (status, body) = send(app, get("/api/chat/history/session-a?limit=1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "cache");
        assert_eq!(body["history"].as_array().unwrap().len(), 1);
        assert_eq!(body["history"][0]["content"], "4");
    }

    #[tokio::test]
    async fn test_history_store_failure_is_500() {
        let mut store = MockMessageStore::new();
        store
            .expect_list()
            .returning(|_, _| Err(anyhow::anyhow!("timeout")));
        let (app, _) = app(store);

        let (status, body) = send(app, get("/api/chat/history/session-a")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "DatabaseError");
    }

    #[tokio::test]
    async fn test_clear_session() {
        let mut store = MockMessageStore::new();
        store.expect_delete().returning(|_| Ok(3));
        let (app, manager) = app(store);
        manager.cache().put("session-a", Vec::new());

        let request = Request::builder()
            .method("DELETE")
            .uri("/api/chat/session/session-a")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cache_cleared"], true);
        assert_eq!(body["messages_deleted"], 3);
    }

    #[tokio::test]
    async fn test_statistics_and_cleanup() {
        let mut store = MockMessageStore::new();
        store.expect_count().returning(|_| Ok(12));
        store
            .expect_distinct_sessions()
            .returning(|_| Ok(vec!["session-a".to_string()]));
        let (app, _) = app(store);

        let (status, body) = send(app.clone(), get("/api/chat/statistics")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_messages"], 12);
        assert_eq!(body["active_sessions"], 0);
        assert_eq!(body["recent_sessions"], json!(["session-a"]));

        let (status, body) = send(app, post_json("/api/chat/cleanup", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sessions_cleaned"], 0);
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let mut store = MockMessageStore::new();
        store
            .expect_ping()
            .returning(|| Err(anyhow::anyhow!("connection refused")));
        let (app, _) = app(store);

        let (status, body) = send(app.clone(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = send(app, get("/health/ready")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Unavailable");
        assert_eq!(body["message"], "database: connection refused");
    }

    #[tokio::test]
    async fn test_readiness_ok() {
        let mut store = MockMessageStore::new();
        store.expect_ping().times(1).returning(|| Ok(()));
        let (app, _) = app(store);

        let (status, body) = send(app, get("/health/ready")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ready"], true);
    }

    #[tokio::test]
    async fn test_malformed_chat_body_is_400_json() {
        let (app, _) = app(MockMessageStore::new());

        let (status, body) = send(app.clone(), post_json("/api/chat", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "BadRequest");

        let (status, body) = send(app.clone(), post_json("/api/chat", json!({ "query": 42 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let request = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "BadRequest");
    }

    async fn exploding_handler() -> &'static str {
        panic!("handler exploded")
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_json_500() {
        let app = Router::new()
            .route("/boom", axum::routing::get(exploding_handler))
            .layer(CatchPanicLayer::custom(panic_response));

        let (status, body) = send(app, get("/boom")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "InternalError");
    }
}
