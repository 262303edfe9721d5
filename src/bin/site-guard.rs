//! Site Guard server binary

use site_guard::{config::Config, observability::init_observability, server, shutdown::ShutdownCoordinator};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let config = Config::from_file_with_env(&config_path)?;

    init_observability(&config.logging.level, &config.logging.format);
    info!("Starting Site Guard {}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded and validated from {}", config_path);

    let coordinator = ShutdownCoordinator::new();
    let notifier = coordinator.subscribe();
    tokio::spawn(async move {
        coordinator.wait_for_signal().await;
    });

    server::serve(config, notifier.wait()).await
}
