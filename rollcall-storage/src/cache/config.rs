//! Configuration for the schema registry.

use rollcall_core::constants::{DEFAULT_CLEANUP_INTERVAL_SECS, DEFAULT_SCHEMA_TTL_SECS};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a cached schema stays valid.
    pub ttl: Duration,
    /// How often the background sweep evicts expired entries.
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_SCHEMA_TTL_SECS),
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the sweep interval.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}
