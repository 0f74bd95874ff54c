use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use atelier_api::config::ServerConfig;
use atelier_api::router::build_app_router;
use atelier_api::state::AppState;
use atelier_api::{background, ws};
use atelier_events::EventBus;
use atelier_pipeline::{DispatchConfig, ExecutorConfig, PgStore, Pipeline};
use atelier_provider::ProviderRegistry;
use atelier_storage::StorageConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atelier_api=debug,atelier_pipeline=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let dispatch_config = DispatchConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = atelier_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    atelier_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    atelier_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Artifact storage and providers ---
    let artifacts = StorageConfig::from_env().build().await;
    tracing::info!(backend = artifacts.backend_name(), "Artifact store ready");

    let providers = ProviderRegistry::from_env();
    if providers.names().is_empty() {
        tracing::warn!("No providers configured; every submission will be rejected");
    }

    // --- Pipeline ---
    let event_bus = Arc::new(EventBus::default());
    let pipeline = Pipeline::new(
        Arc::new(PgStore::new(pool.clone())),
        providers,
        artifacts,
        Arc::clone(&event_bus),
        dispatch_config,
        ExecutorConfig::default(),
    );

    // --- WebSocket live feed ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));
    let forwarder_handle = tokio::spawn(background::event_forwarder::run(
        Arc::clone(&ws_manager),
        event_bus.subscribe(),
    ));

    // --- Scheduled dispatch ---
    let dispatch_cancel = CancellationToken::new();
    let dispatch_handle = config.scheduled_dispatch.then(|| {
        tokio::spawn(background::scheduled_dispatch::run(
            Arc::clone(&pipeline.dispatcher),
            dispatch_cancel.clone(),
        ))
    });

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        pipeline,
        ws_manager: Arc::clone(&ws_manager),
        pool: Some(pool),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let grace = Duration::from_secs(config.shutdown_timeout_secs);

    dispatch_cancel.cancel();
    if let Some(handle) = dispatch_handle {
        let _ = tokio::time::timeout(grace, handle).await;
        tracing::info!("Scheduled dispatcher stopped");
    }

    ws_manager.shutdown_all().await;
    heartbeat_handle.abort();
    forwarder_handle.abort();

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
