//! HTTP server bootstrap

use crate::api::{build_router, AppState};
use crate::config::Config;
use crate::storage::JsonFileStore;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Build application state backed by the JSON file store
pub async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let store = JsonFileStore::new(&config.storage.data_dir, &config.storage.uploads_dir).await?;
    Ok(AppState::from_config(config, Arc::new(store)))
}

/// Serve until `shutdown` resolves, then stop background sweeps
pub async fn serve<F>(config: Config, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let state = build_state(&config).await?;
    let app = build_router(state.clone(), config.server.max_body_size_mb * 1024 * 1024);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    state.dispose();
    info!("Server shutdown complete");
    Ok(())
}
