//! Standalone dispatch worker.
//!
//! Runs the scheduled dispatch loop against the shared job store without
//! serving HTTP. Any number of workers (and API processes with scheduled
//! dispatch enabled) may run side by side; the conditional claim keeps
//! each job to a single executor.

use std::sync::Arc;

use atelier_events::EventBus;
use atelier_pipeline::{DispatchConfig, ExecutorConfig, PgStore, Pipeline};
use atelier_provider::ProviderRegistry;
use atelier_storage::StorageConfig;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atelier_worker=debug,atelier_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = atelier_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    atelier_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    let artifacts = StorageConfig::from_env().build().await;
    let providers = ProviderRegistry::from_env();
    tracing::info!(
        backend = artifacts.backend_name(),
        providers = ?providers.names(),
        "Worker starting"
    );

    let events = Arc::new(EventBus::default());
    let log_handle = tokio::spawn(log_outcomes(events.subscribe()));

    let pipeline = Pipeline::new(
        Arc::new(PgStore::new(pool)),
        providers,
        artifacts,
        Arc::clone(&events),
        DispatchConfig::from_env(),
        ExecutorConfig::default(),
    );

    let cancel = CancellationToken::new();
    let loop_handle = {
        let dispatcher = Arc::clone(&pipeline.dispatcher);
        let cancel = cancel.clone();
        tokio::spawn(async move { dispatcher.run(cancel).await })
    };

    shutdown_signal().await;
    tracing::info!("Shutdown requested, finishing in-flight jobs");
    cancel.cancel();
    if let Err(e) = loop_handle.await {
        tracing::error!(error = %e, "Dispatch loop panicked");
    }
    log_handle.abort();

    tracing::info!("Worker stopped");
}

/// Log terminal job updates; the worker has no live-feed subscribers.
async fn log_outcomes(mut events: tokio::sync::broadcast::Receiver<atelier_events::JobEvent>) {
    loop {
        match events.recv().await {
            Ok(event) if event.is_terminal() => {
                tracing::info!(job_id = event.job_id, status = %event.status, "Job finished");
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "Outcome log lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

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
        () = ctrl_c => {}
        () = terminate => {}
    }
}
