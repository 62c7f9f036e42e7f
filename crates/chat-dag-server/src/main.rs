use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use chat_dag_server::config::Settings;
use chat_dag_server::database::{DbPool, MessageStore, Repository};
use chat_dag_server::handlers::build_router;
use chat_dag_server::logging::init_logger;
use chat_dag_server::services::{ConversationManager, LlmProvider, LlmService, SessionCache, WorkflowEngine};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load()?;

    // Initialize logging
    init_logger(&settings.logging)?;
    info!("🚀 Starting chat workflow server...");
    info!("✅ Configuration loaded");
    for message in &settings.warnings {
        warn!("{}", message);
    }

    // Initialize database pool
    let db_pool = DbPool::new(&settings.database).await?;
    info!("✅ Database connection established");

    let repository = Repository::new(db_pool.clone());
    repository.ensure_schema().await?;
    let store: Arc<dyn MessageStore> = Arc::new(repository);

    // Generation provider: missing credentials stop the process here
    let llm: Arc<dyn LlmProvider> = Arc::new(LlmService::new(settings.llm.clone())?);
    info!("✅ LLM client ready (model: {})", settings.llm.model);

    let engine = Arc::new(WorkflowEngine::new(llm, settings.llm.timeout()));
    let cache = SessionCache::new(settings.cache.ttl());
    let manager = Arc::new(ConversationManager::new(engine, cache, store));

    spawn_cache_sweeper(manager.clone(), settings.cache.sweep_interval_seconds);

    let app = build_router(manager);

    // Server address
    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    info!("🎯 Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db_pool.close().await;
    info!("👋 Database pool closed, shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("🛑 Shutdown signal received, draining connections");
}

/// Periodically evict expired sessions; 0 disables the task
fn spawn_cache_sweeper(manager: Arc<ConversationManager>, interval_seconds: u64) {
    if interval_seconds == 0 {
        info!("Cache sweeper disabled");
        return;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            manager.cleanup_expired_sessions();
        }
    });
    info!("✅ Cache sweeper running every {}s", interval_seconds);
}
