//! Schema fetcher trait and cache statistics.

use async_trait::async_trait;
use rollcall_core::{Credential, SyncResult, TableSchema};
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of fresh schemas on a cache miss.
///
/// Implementations perform the underlying network work; the registry makes
/// sure at most one fetch per table runs at a time.
#[async_trait]
pub trait SchemaFetcher: Send + Sync + 'static {
    /// Build the current schema of `table`.
    async fn fetch_schema(
        &self,
        table: &str,
        credential: Option<&Credential>,
    ) -> SyncResult<TableSchema>;

    /// Every table this fetcher can describe, in name order.
    fn known_tables(&self) -> Vec<String>;
}

/// Statistics about registry usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from a valid cache entry.
    pub hits: u64,
    /// Lookups that found no valid entry.
    pub misses: u64,
    /// Misses that joined a fetch already in flight.
    pub coalesced: u64,
    /// Underlying fetches started.
    pub fetches: u64,
    /// Entries evicted because they expired.
    pub evictions: u64,
    /// Entries currently cached, expired or not.
    pub entry_count: u64,
    /// Fetches currently in flight.
    pub in_flight: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub coalesced: AtomicU64,
    pub fetches: AtomicU64,
    pub evictions: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self, entry_count: u64, in_flight: u64) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entry_count,
            in_flight,
        }
    }
}
