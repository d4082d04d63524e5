//! ==============================================================================
//! main.rs - station agent entry point
//! ==============================================================================
//!
//! usage:
//!     station-agent [path/to/agent.toml]
//!
//!     without an argument the config is read from config/agent.toml under
//!     the working directory. a missing or incomplete config is fatal.
//!
//! logging:
//!     RUST_LOG wins when set; otherwise `station_agent={logging.level}`.
//!
//! ==============================================================================

use anyhow::Result;
use station_agent::{Agent, AgentSettings};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let explicit = std::env::args().nth(1).map(PathBuf::from);
    let loaded = AgentSettings::locate_and_load(explicit.as_deref());

    let level = loaded
        .as_ref()
        .map(|(_, settings)| settings.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let app_name = env!("CARGO_PKG_NAME").replace('-', "_");
            format!("{app_name}={level}").into()
        }))
        .init();

    let (path, settings) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("cannot start without a valid configuration: {:#}", e);
            return Err(e);
        }
    };
    tracing::info!("configuration loaded from {}", path.display());
    settings.log_summary();

    Agent::new(settings)?.run().await
}
