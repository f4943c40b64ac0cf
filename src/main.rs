mod api;
mod artifact_store;
mod config;
mod converter;
mod error;
mod formats;
mod models;
mod queue;
mod service;
mod store;
mod worker;

use std::sync::Arc;

use anyhow::{Context, Result};
use config::Config;
use service::ConversionService;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ConversionService>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "convertly_api=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    artifact_store::ensure_work_root(&config.work_root).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    let service = ConversionService::start(config.clone());
    let app = api::router(AppState {
        service: service.clone(),
    });

    info!("convertly-api listening on {}", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
