//! Schema cache with explicit expiry and single-flight fetches.
//!
//! The registry keeps one [`TableSchema`](rollcall_core::TableSchema) per
//! table for a configured TTL. Reads past the TTL evict and refetch; a
//! background sweep owned by the registry evicts entries nobody reads.
//! Concurrent misses for one table share a single fetch.
//!
//! # Example
//!
//! ```ignore
//! let registry = SchemaRegistry::new(CacheConfig::new().with_ttl(Duration::from_secs(300)));
//! let schema = registry
//!     .get_or_fetch("teachers", move || async move {
//!         source.fetch_schema("teachers", None).await
//!     })
//!     .await?;
//! registry.dispose().await;
//! ```

pub mod config;
pub mod registry;
mod sweep;
pub mod traits;

pub use config::CacheConfig;
pub use registry::SchemaRegistry;
pub use traits::{CacheStats, SchemaFetcher};
