//! TTL cache of table schemas with request coalescing.
//!
//! Every concurrent lookup of one table shares a single underlying fetch:
//! the first miss registers a [`Shared`] future under the table name, later
//! misses clone it, and the fetch removes its own marker when it settles.
//! Markers carry a generation number so a fetch that was invalidated while
//! running can neither evict a newer fetch nor repopulate the cache.

use super::config::CacheConfig;
use super::sweep::sweep_task;
use super::traits::{CacheStats, StatsCounters};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use rollcall_core::{SyncError, SyncResult, TableSchema};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type SharedFetch = Shared<BoxFuture<'static, SyncResult<Arc<TableSchema>>>>;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Arc<TableSchema>,
    timestamp: Instant,
}

impl CacheEntry {
    fn is_valid(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.timestamp) <= ttl
    }
}

struct InFlight {
    generation: u64,
    fetch: SharedFetch,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, CacheEntry>,
    in_flight: HashMap<String, InFlight>,
    next_generation: u64,
}

pub(crate) struct RegistryInner {
    state: Mutex<RegistryState>,
    config: CacheConfig,
    stats: StatsCounters,
    disposed: AtomicBool,
}

impl RegistryInner {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Valid entry for `key`; an expired entry is evicted on the way.
    fn lookup(
        &self,
        state: &mut RegistryState,
        key: &str,
        now: Instant,
    ) -> Option<Arc<TableSchema>> {
        match state.entries.get(key) {
            Some(entry) if entry.is_valid(now, self.config.ttl) => Some(Arc::clone(&entry.value)),
            Some(_) => {
                state.entries.remove(key);
                StatsCounters::bump(&self.stats.evictions);
                None
            }
            None => None,
        }
    }

    /// Evict expired entries. In-flight fetches are left alone.
    pub(crate) fn sweep(&self) -> usize {
        let now = Instant::now();
        let ttl = self.config.ttl;
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.is_valid(now, ttl));
        let evicted = before - state.entries.len();
        StatsCounters::add(&self.stats.evictions, evicted as u64);
        evicted
    }

    fn complete(
        &self,
        key: &str,
        generation: u64,
        result: SyncResult<TableSchema>,
    ) -> SyncResult<Arc<TableSchema>> {
        let mut state = self.lock();
        let current = state
            .in_flight
            .get(key)
            .is_some_and(|pending| pending.generation == generation);
        if current {
            state.in_flight.remove(key);
        }

        match result {
            Ok(schema) => {
                let value = Arc::new(schema);
                if current && !self.disposed.load(Ordering::SeqCst) {
                    state.entries.insert(
                        key.to_string(),
                        CacheEntry {
                            value: Arc::clone(&value),
                            timestamp: Instant::now(),
                        },
                    );
                } else {
                    tracing::debug!(table = key, "Discarding schema from an invalidated fetch");
                }
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(table = key, error = %err, "Schema fetch failed");
                Err(err)
            }
        }
    }
}

/// Per-session schema cache.
///
/// Construction starts the background sweep on the current tokio runtime;
/// [`SchemaRegistry::dispose`] (or dropping the registry) stops it.
pub struct SchemaRegistry {
    inner: Arc<RegistryInner>,
    shutdown_tx: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SchemaRegistry {
    pub fn new(config: CacheConfig) -> Self {
        let period = config.cleanup_interval.max(Duration::from_millis(1));
        let inner = Arc::new(RegistryInner {
            state: Mutex::new(RegistryState::default()),
            config,
            stats: StatsCounters::default(),
            disposed: AtomicBool::new(false),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let sweeper = match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let task = sweep_task(Arc::downgrade(&inner), period, shutdown_rx);
                Some(handle.spawn(task))
            }
            Err(_) => {
                tracing::warn!("No tokio runtime; schema registry starts without its expiry sweep");
                None
            }
        };

        Self {
            inner,
            shutdown_tx,
            sweeper: Mutex::new(sweeper),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    fn ensure_live(&self) -> SyncResult<()> {
        if self.is_disposed() {
            Err(SyncError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Cached schema for `key` if present and unexpired.
    pub fn get(&self, key: &str) -> Option<Arc<TableSchema>> {
        let mut state = self.inner.lock();
        let found = self.inner.lookup(&mut state, key, Instant::now());
        if found.is_some() {
            StatsCounters::bump(&self.inner.stats.hits);
        } else {
            StatsCounters::bump(&self.inner.stats.misses);
        }
        found
    }

    /// Store `schema` under `key`, stamped with the current time.
    pub fn set(&self, key: &str, schema: TableSchema) -> Arc<TableSchema> {
        let value = Arc::new(schema);
        if self.is_disposed() {
            return value;
        }
        self.inner.lock().entries.insert(
            key.to_string(),
            CacheEntry {
                value: Arc::clone(&value),
                timestamp: Instant::now(),
            },
        );
        value
    }

    /// Cached schema, or the result of the fetch in flight for `key`, or the
    /// result of a new `fetch()`.
    ///
    /// Concurrent callers for one key observe the same `Arc`. A failed fetch
    /// is not cached; the next call starts a new one.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> SyncResult<Arc<TableSchema>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = SyncResult<TableSchema>> + Send + 'static,
    {
        self.ensure_live()?;

        let pending = {
            let mut state = self.inner.lock();
            if let Some(value) = self.inner.lookup(&mut state, key, Instant::now()) {
                StatsCounters::bump(&self.inner.stats.hits);
                tracing::trace!(table = key, "Schema cache hit");
                return Ok(value);
            }
            StatsCounters::bump(&self.inner.stats.misses);
            state.in_flight.get(key).map(|pending| pending.fetch.clone())
        };

        if let Some(pending) = pending {
            StatsCounters::bump(&self.inner.stats.coalesced);
            tracing::debug!(table = key, "Joining schema fetch in flight");
            return pending.await;
        }

        // Built outside the lock; `fetch` may be arbitrary caller code.
        let future = fetch();

        let shared = {
            let mut state = self.inner.lock();
            if let Some(value) = self.inner.lookup(&mut state, key, Instant::now()) {
                return Ok(value);
            }
            if let Some(existing) = state.in_flight.get(key) {
                StatsCounters::bump(&self.inner.stats.coalesced);
                existing.fetch.clone()
            } else {
                let generation = state.next_generation;
                state.next_generation += 1;

                let registry = Arc::downgrade(&self.inner);
                let owned_key = key.to_string();
                let shared = async move {
                    let result = future.await;
                    match registry.upgrade() {
                        Some(inner) => inner.complete(&owned_key, generation, result),
                        None => result.map(Arc::new),
                    }
                }
                .boxed()
                .shared();

                state.in_flight.insert(
                    key.to_string(),
                    InFlight {
                        generation,
                        fetch: shared.clone(),
                    },
                );
                StatsCounters::bump(&self.inner.stats.fetches);
                tracing::debug!(table = key, generation, "Starting schema fetch");
                shared
            }
        };

        shared.await
    }

    /// Drop one entry (cache and in-flight marker), or everything when
    /// `key` is `None`.
    pub fn invalidate(&self, key: Option<&str>) {
        let mut state = self.inner.lock();
        match key {
            Some(key) => {
                state.entries.remove(key);
                state.in_flight.remove(key);
                tracing::debug!(table = key, "Schema invalidated");
            }
            None => {
                state.entries.clear();
                state.in_flight.clear();
                tracing::debug!("All schemas invalidated");
            }
        }
    }

    /// Evict expired entries now. Returns how many were evicted.
    pub fn cleanup(&self) -> usize {
        self.inner.sweep()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.lock();
        self.inner
            .stats
            .snapshot(state.entries.len() as u64, state.in_flight.len() as u64)
    }

    /// Number of entries held, expired or not.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Stop the sweep and drop every entry. Later lookups fail with
    /// [`SyncError::Disposed`]. Idempotent.
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(true);
        {
            let mut state = self.inner.lock();
            state.entries.clear();
            state.in_flight.clear();
        }

        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = sweeper {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    tracing::warn!(error = %err, "Schema cache sweep ended abnormally");
                }
            }
        }
        tracing::info!("Schema registry disposed");
    }
}

impl Drop for SchemaRegistry {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self
            .sweeper
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
