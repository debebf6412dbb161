//! Background sweep of expired schema entries.
//!
//! Spawned by [`SchemaRegistry::new`](super::SchemaRegistry::new) and bound to
//! the registry's lifetime: it holds only a weak reference and exits when the
//! shutdown signal fires or the registry is gone.

use super::registry::RegistryInner;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub(crate) async fn sweep_task(
    registry: Weak<RegistryInner>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(interval_ms = period.as_millis() as u64, "Schema cache sweep started");

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            _ = ticker.tick() => {
                let Some(inner) = registry.upgrade() else {
                    break;
                };
                let evicted = inner.sweep();
                if evicted > 0 {
                    tracing::debug!(evicted, "Evicted expired schemas");
                } else {
                    tracing::trace!("Schema sweep found nothing to evict");
                }
            }
        }
    }

    tracing::info!("Schema cache sweep stopped");
}

#[cfg(test)]
mod tests {
    use crate::cache::{CacheConfig, SchemaRegistry};
    use rollcall_core::{TableConfig, TableSchema};
    use std::time::Duration;

    fn schema(table: &str) -> TableSchema {
        TableSchema::declared(table, &TableConfig::new("id", table), &["id".to_string()])
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_runs_periodically() {
        let registry = SchemaRegistry::new(
            CacheConfig::new()
                .with_ttl(Duration::from_secs(5))
                .with_cleanup_interval(Duration::from_secs(10)),
        );
        registry.set("users", schema("users"));

        // Sleeping lets the paused clock auto-advance past the first tick.
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(registry.len(), 0);
        assert_eq!(registry.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_stops_after_dispose() {
        let registry = SchemaRegistry::new(
            CacheConfig::new()
                .with_ttl(Duration::from_secs(5))
                .with_cleanup_interval(Duration::from_secs(10)),
        );
        registry.dispose().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(registry.stats().evictions, 0);
    }
}
