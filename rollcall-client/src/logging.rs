//! Tracing subscriber setup for the binary.

use crate::config::LogConfig;
use crate::error::ClientError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over `config.filter`.
/// Output goes to stderr so stdout stays machine-readable.
pub fn init(config: &LogConfig) -> Result<(), ClientError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| ClientError::Logging(e.to_string()))?;

    let json = config
        .json
        .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr));
    let plain = (!config.json)
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json)
        .with(plain)
        .try_init()
        .map_err(|e| ClientError::Logging(e.to_string()))?;

    tracing::debug!(filter = %config.filter, json = config.json, "Logging initialized");
    Ok(())
}
