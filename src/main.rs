use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};
use warden::config::{load_config, WardenConfig};
use warden::engine::MonitorEngine;
use warden::world::MemoryWorld;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warden=info".into()),
        )
        .init();

    info!("Warden starting...");

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "warden.toml".to_string());
    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %config_path, error = %e, "Config not loaded, using defaults");
            WardenConfig::default()
        }
    };

    // Standalone mode runs against the in-memory world provider; an
    // embedding host supplies its own WorldProvider instead.
    let world = Arc::new(MemoryWorld::new());
    let engine = Arc::new(MonitorEngine::new(config, world));

    engine.load_records()?;

    let control = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run().await })
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutting down, saving record archive");
    control.abort();
    engine.save_records()?;

    Ok(())
}
