//! ROLLCALL Storage - Schema Registry
//!
//! Client-held cache of remote table descriptions:
//! - [`SchemaRegistry`]: TTL cache with request coalescing and a scoped
//!   expiry sweep
//! - [`TableSchemaSource`]: builds schemas from declared columns or, as a
//!   fallback, from the first row of a live table read
//! - [`SchemaService`]: the registry and a source bundled for callers that
//!   only think in table names

pub mod cache;
pub mod service;
pub mod source;

pub use cache::{CacheConfig, CacheStats, SchemaFetcher, SchemaRegistry};
pub use service::{SchemaMap, SchemaService};
pub use source::TableSchemaSource;
