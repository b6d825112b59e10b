//! Logging and configuration setup for the GG-DEVMEM CLI.

use std::path::Path;

use gg_devmem::config::{self, ConfigError, PoolConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` sets the filter (default `warn`).
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_target(false).with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()
    };
    if let Err(e) = result {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

/// Load pool configuration from an optional file and the environment.
pub fn load_config(path: Option<&Path>) -> Result<PoolConfig, ConfigError> {
    let config = config::load(path)?;
    tracing::debug!(
        pool_size = config.pool_size,
        page_count = config.page_count,
        alignment = ?config.alignment,
        "configuration loaded"
    );
    Ok(config)
}
