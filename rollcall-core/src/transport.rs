//! Remote endpoints consumed by the sync layer.
//!
//! The layer talks to exactly two endpoints: a table read and a generic
//! mutation. Both are traits so the registry, dispatcher and orchestrator
//! can be driven by the REST adapter in production and by in-memory mocks in
//! tests.

use crate::error::SyncResult;
use crate::record::{Collection, Record, RecordId};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Optional filter parameters of a table read, sent as query parameters.
pub type Filters = BTreeMap<String, String>;

/// Bearer credential. Passed explicitly into every call that needs it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }

    /// Value of the `Authorization` header.
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    BulkCreate,
    Update,
    Delete,
}

/// Body of the generic mutation endpoint: `{ table, id?, data?, updates?, bulk? }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationRequest {
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updates: Option<Record>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub bulk: bool,
}

impl MutationRequest {
    pub fn create(table: impl Into<String>, record: Record) -> Self {
        Self {
            table: table.into(),
            id: None,
            data: Some(Value::Object(record)),
            updates: None,
            bulk: false,
        }
    }

    pub fn bulk_create(table: impl Into<String>, records: Collection) -> Self {
        Self {
            table: table.into(),
            id: None,
            data: Some(Value::Array(records.into_iter().map(Value::Object).collect())),
            updates: None,
            bulk: true,
        }
    }

    pub fn update(table: impl Into<String>, id: RecordId, patch: Record) -> Self {
        Self {
            table: table.into(),
            id: Some(id),
            data: None,
            updates: Some(patch),
            bulk: false,
        }
    }

    pub fn delete(table: impl Into<String>, id: RecordId) -> Self {
        Self {
            table: table.into(),
            id: Some(id),
            data: None,
            updates: None,
            bulk: false,
        }
    }

    pub fn kind(&self) -> MutationKind {
        match (&self.id, &self.updates, self.bulk) {
            (_, _, true) => MutationKind::BulkCreate,
            (Some(_), Some(_), false) => MutationKind::Update,
            (Some(_), None, false) => MutationKind::Delete,
            (None, _, false) => MutationKind::Create,
        }
    }
}

/// Table read endpoint.
#[async_trait]
pub trait TableReader: Send + Sync {
    /// Read the rows of `table`, in server order.
    async fn read_table(
        &self,
        table: &str,
        filters: &Filters,
        credential: Option<&Credential>,
    ) -> SyncResult<Collection>;
}

/// Generic mutation endpoint.
#[async_trait]
pub trait MutationTransport: Send + Sync {
    /// Perform one mutation. Returns the resulting record(s) on success.
    async fn mutate(&self, request: &MutationRequest, credential: &Credential) -> SyncResult<Value>;
}
