use std::sync::Arc;

use catalog_sync_service::catalog::MemoryCatalog;
use catalog_sync_service::handlers::{router, AppState};
use catalog_sync_service::logging::SyncLogger;
use catalog_sync_service::sync::SyncEngine;
use catalog_sync_service::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "catalog_sync_service=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env();
    let port = config.port;

    let logger = Arc::new(SyncLogger::new(config.logging_enabled));
    let catalog = Arc::new(MemoryCatalog::new());
    let engine = Arc::new(SyncEngine::new(config.clone(), catalog, logger)?);

    let state = AppState {
        engine,
        api_token: config.api_token,
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port = port, "catalog sync service listening");
    axum::serve(listener, app).await?;
    Ok(())
}
