mod config;
mod error;
mod routes;

use std::sync::Arc;

use config::AppConfig;
use routes::{app_router, AppState};
use tillsync_core::services::SyncEngine;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tillsync=info".parse()?)
                .add_directive("tillsync_api=info".parse()?),
        )
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!("Starting tillsync-api with config: {:?}", config);

    let engine = Arc::new(SyncEngine::open(&config.sync, &config.db_path).await?);
    let scheduler = config
        .run_scheduler
        .then(|| engine.spawn_scheduler(config.sync.schedule));
    let state = AppState::new(
        Arc::clone(&engine),
        scheduler.as_ref().map(tillsync_core::sync::SyncScheduler::state),
    );
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("tillsync-api listening on {}", config.bind_addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for shutdown signal: {error}");
            }
        })
        .await?;

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }
    tracing::info!("tillsync-api stopped");
    Ok(())
}
