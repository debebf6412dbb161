//! ROLLCALL Core - Data Types
//!
//! Pure data structures shared by every other crate in the workspace: table
//! schemas and the static table catalog, record identifiers, action keys,
//! the error taxonomy, and the traits of the two remote endpoints. No I/O
//! lives here.

pub mod action;
pub mod constants;
pub mod error;
pub mod record;
pub mod schema;
pub mod transport;

pub use action::{ActionKey, ActionTarget};
pub use error::{SyncError, SyncResult, ValidationError};
pub use record::{record_id, Collection, Record, RecordId};
pub use schema::{sample_is_heterogeneous, SchemaOrigin, TableCatalog, TableConfig, TableSchema};
pub use transport::{
    Credential, Filters, MutationKind, MutationRequest, MutationTransport, TableReader,
};

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
