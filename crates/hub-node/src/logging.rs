//! Logging setup.
//!
//! `RUST_LOG` wins when set; otherwise `info`, or `debug` with `--debug`.

use anyhow::{anyhow, Result};
use hub_gateway::domain::config::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive when `RUST_LOG` is not set.
pub fn default_level(config: &LoggingConfig) -> &'static str {
    if config.debug {
        "debug"
    } else {
        "info"
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level(config)))
        .map_err(|e| anyhow!("invalid log filter: {}", e))?;

    if config.json {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true);
        tracing_subscriber::registry()
            .with(filter)
            .with(json_layer)
            .try_init()
            .map_err(|e| anyhow!("failed to install logger: {}", e))?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true);
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| anyhow!("failed to install logger: {}", e))?;
    }
    Ok(())
}
