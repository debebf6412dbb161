//! Error types for the client binary.

use crate::api_client::ApiClientError;
use crate::config::ConfigError;
use rollcall_core::SyncError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiClientError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}
