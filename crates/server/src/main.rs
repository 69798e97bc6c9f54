use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docflow_core::{
    build_llm_registry, content_hash, load_config, validate_config, IngestionQueue, LockManager,
    LoggingHandler, PipelineOrchestrator, SqliteStateStore, StateStore, TaskRegistry,
};

use docflow_server::api::create_router;
use docflow_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("DOCFLOW_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = content_hash(&config_json);
    info!(
        "docflow {} starting (config {})",
        VERSION,
        &config_hash[..16]
    );
    info!("Database path: {:?}", config.database.path);

    // Create SQLite state store
    let store: Arc<dyn StateStore> = Arc::new(
        SqliteStateStore::new(&config.database.path).context("Failed to create state store")?,
    );
    info!("State store initialized");

    let locks = Arc::new(LockManager::with_ttl(
        Arc::clone(&store),
        config.lock.default_ttl(),
    ));

    // Stage tasks are LLM-backed; without an [llm] section every stage is skipped
    let registry = match &config.llm {
        Some(llm) => {
            info!(
                "Using {:?} model '{}' for stage tasks",
                llm.provider, llm.model
            );
            build_llm_registry(llm.build_client(), llm.max_tokens, llm.temperature)
        }
        None => {
            warn!("No [llm] section configured; documents will not advance past CREATED");
            TaskRegistry::new()
        }
    };

    let orchestrator = Arc::new(
        PipelineOrchestrator::new(
            config.orchestrator.clone(),
            Arc::clone(&store),
            locks,
            registry,
        )
        .with_sweep_interval(config.lock.sweep_interval()),
    );
    orchestrator
        .start()
        .await
        .context("Failed to start orchestrator")?;

    let queue = Arc::new(IngestionQueue::new(
        config.ingestion.clone(),
        Arc::clone(&orchestrator),
        Arc::new(LoggingHandler),
    ));
    queue.start().await;

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        store,
        Arc::clone(&orchestrator),
        Arc::clone(&queue),
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Drain the queue before the sweeper goes away so cancelled runs release their locks
    info!("Server shutting down...");
    queue.stop().await;
    orchestrator.stop().await;
    info!("Shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
