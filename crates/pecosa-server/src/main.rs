use anyhow::{Context, Result};
use pecosa_server::{router, AppState, Config};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load_default().context("Failed to load configuration")?;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Database: {}", config.database.url);

    let cleanup_every = Duration::from_secs(config.sync.cleanup_interval_secs.max(60));
    let state = AppState::new(config).await?;

    // Periodic housekeeping: change log retention and expired login attempts
    let housekeeping = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cleanup_every);
        loop {
            ticker.tick().await;
            if let Err(e) = housekeeping.sync.cleanup().await {
                tracing::warn!("Change log cleanup failed: {}", e);
            }
            match housekeeping.auth.limiter().purge_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::debug!("Purged {} expired login attempts", n),
                Err(e) => tracing::warn!("Login attempt purge failed: {}", e),
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("La Pecosa listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
