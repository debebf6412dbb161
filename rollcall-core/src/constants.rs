//! Constants for ROLLCALL
//!
//! Defaults shared by the registry, the dispatcher and the configuration
//! loader.

// ============================================================================
// SCHEMA CACHE
// ============================================================================

/// Default schema time-to-live in seconds (5 minutes)
pub const DEFAULT_SCHEMA_TTL_SECS: u64 = 300;

/// Default interval of the expired-entry sweep in seconds
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

// ============================================================================
// TABLES
// ============================================================================

/// Table holding the shared user record that per-role tables extend
pub const DEFAULT_BASE_TABLE: &str = "users";

/// Resolution order used when no order is configured
pub const DEFAULT_TABLE_ORDER: &[&str] = &[
    "users",
    "teachers",
    "students",
    "classes",
    "courses",
    "grades",
    "class_users",
    "payments",
    "quizzes",
];

// ============================================================================
// TRANSPORT
// ============================================================================

/// Default request timeout in milliseconds
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;

/// Default path prefix of the table read endpoint
pub const DEFAULT_READ_PATH: &str = "/api/tables";

/// Default path of the generic mutation endpoint
pub const DEFAULT_MUTATION_PATH: &str = "/api/mutate";

/// Message used when the server rejects a mutation without saying why
pub const DEFAULT_DISPATCH_MESSAGE: &str = "The server rejected the request";

// ============================================================================
// ACTION KEYS
// ============================================================================

/// Id segment used for actions that create a record not yet assigned an id
pub const NEW_ENTITY_ID: &str = "new";
