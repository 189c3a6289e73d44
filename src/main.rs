use std::sync::Arc;

use huddle::{AppState, app, config::Config, store::SqliteStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store = SqliteStore::connect(&config.database_url, config.database_max_connections).await?;
    tracing::info!(url = %config.database_url, "database ready");

    let addr = config.socket_addr()?;
    let origins = config.allowed_origins.clone();
    let state = AppState::new(Arc::new(store), config);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, ?origins, "listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
