use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use adsync_client::{AccessTokenProvider, BigQueryWarehouse, GcsObjectStore, GoogleAdsClient};
use adsync_core::{Orchestrator, PipelineConfig, TracingWorkerReporter, WorkerConfig, WorkerService};
use adsync_db::{Database, DatabaseConfig};
use adsync_server::state::AppState;
use adsync_server::{routes, startup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("adsync=info".parse()?))
        .with_target(false)
        .init();

    let api_key =
        std::env::var("ADSYNC_SERVER_API_KEY").context("ADSYNC_SERVER_API_KEY must be set")?;
    let port = std::env::var("ADSYNC_SERVER_PORT").unwrap_or_else(|_| "3000".to_string());
    let embedded_worker = env_flag("ADSYNC_EMBEDDED_WORKER", true);
    let roster_on_startup = env_flag("ADSYNC_LOAD_ROSTER_ON_STARTUP", true);
    let addr = format!("0.0.0.0:{port}");

    let db = Database::connect(&DatabaseConfig::from_env()?).await?;
    db.migrate().await?;

    let config = PipelineConfig::from_env()?;
    let tokens = AccessTokenProvider::cloud_from_env()?;
    let orchestrator = Arc::new(Orchestrator::new(
        GoogleAdsClient::from_env()?,
        GcsObjectStore::new(&config.project, tokens.clone())?,
        BigQueryWarehouse::new(&config.project, tokens)?,
        db.task_repo(),
        config,
    ));

    if roster_on_startup {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            startup::load_roster(&orchestrator).await;
        });
    }

    let cancel = CancellationToken::new();
    let worker = embedded_worker.then(|| {
        let service = WorkerService::new(
            db.task_repo(),
            orchestrator.clone(),
            WorkerConfig::default(),
        );
        let cancel = cancel.clone();
        tokio::spawn(async move { service.run(cancel, &TracingWorkerReporter).await })
    });

    let state = Arc::new(AppState {
        orchestrator,
        db,
        api_key,
    });

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!(%addr, embedded_worker, roster_on_startup, "Starting server");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    if let Some(handle) = worker {
        handle.await??;
    }

    Ok(())
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v != "false" && v != "0")
        .unwrap_or(default)
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
        }
        () = cancel.cancelled() => {}
    }
    tracing::info!("Shutdown signal received");
}
