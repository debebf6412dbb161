//! Error types for ROLLCALL operations

use crate::constants::DEFAULT_DISPATCH_MESSAGE;
use thiserror::Error;

/// Caller-side validation errors, raised before any network call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing on {table}: {field}")]
    RequiredFieldMissing { table: String, field: String },

    #[error("Unknown table: {table}")]
    UnknownTable { table: String },

    #[error("Empty {what} for table {table}")]
    Empty { table: String, what: &'static str },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Master error type of the sync layer.
///
/// `Clone` because one coalesced schema fetch hands the same result to
/// every waiting caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Schema fetch failed for {table}: {reason}")]
    SchemaFetch { table: String, reason: String },

    #[error("No schema contains column {column} (searched: {searched:?})")]
    SchemaResolution { column: String, searched: Vec<String> },

    #[error("Mutation on {table} rejected (HTTP {status}): {message}")]
    Dispatch {
        table: String,
        status: u16,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Action already in progress: {key}")]
    ActionInProgress { key: String },

    #[error("Schema registry has been disposed")]
    Disposed,
}

impl SyncError {
    /// Build a dispatch error, falling back to a generic message when the
    /// server gave none.
    pub fn dispatch(table: impl Into<String>, status: u16, message: Option<String>) -> Self {
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DISPATCH_MESSAGE.to_string());
        SyncError::Dispatch {
            table: table.into(),
            status,
            message,
        }
    }

    /// Errors a user can reasonably retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::SchemaFetch { .. } | SyncError::Transport(_))
    }

    /// Text suitable for showing to a person.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Dispatch { message, .. } => message.clone(),
            SyncError::ActionInProgress { .. } => "This change is already being saved".to_string(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for ROLLCALL operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// TESTS
// =============================================================================
