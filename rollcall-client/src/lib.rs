//! ROLLCALL client library exports.

pub mod api_client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod notifications;
pub mod orchestrator;
pub mod reconcile;
pub mod resolver;
pub mod session;
pub mod store;
pub mod tabs;
pub mod tracker;

pub use api_client::RestClient;
pub use config::{ConfigError, SyncConfig};
pub use dispatcher::{BulkCreateReport, BulkItemOutcome, BulkMode, MutationDispatcher};
pub use error::ClientError;
pub use orchestrator::{AdminOrchestrator, LoadOutcome, TabLoadState};
pub use resolver::ColumnResolver;
pub use session::{MutationOutcome, SessionOptions, SyncSession};
pub use store::CollectionStore;
pub use tabs::Tab;
pub use tracker::{ActionGuard, ActionTracker};
