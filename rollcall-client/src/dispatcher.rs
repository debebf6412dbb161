//! Mutation dispatch against a resolved table.
//!
//! Every call validates its input against the table catalog before anything
//! goes over the wire, then performs exactly one mutation (or one per item in
//! sequential bulk mode). The credential is an explicit argument of each
//! call; the dispatcher holds none.

use rollcall_core::{
    Collection, Credential, MutationRequest, MutationTransport, Record, RecordId, SyncError,
    SyncResult, TableCatalog, TableConfig, ValidationError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// How `bulk_create` talks to the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkMode {
    /// One request with `bulk: true`; the server commits all or nothing.
    #[default]
    Atomic,
    /// One request per item; every outcome is reported.
    Sequential,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemOutcome {
    /// Position of the item in the submitted batch.
    pub index: usize,
    pub result: SyncResult<Record>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkCreateReport {
    pub table: String,
    pub mode: BulkMode,
    pub items: Vec<BulkItemOutcome>,
}

impl BulkCreateReport {
    /// Records the server confirmed, in submission order.
    pub fn created(&self) -> Vec<Record> {
        self.items
            .iter()
            .filter_map(|item| item.result.as_ref().ok().cloned())
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (usize, &SyncError)> {
        self.items
            .iter()
            .filter_map(|item| item.result.as_ref().err().map(|err| (item.index, err)))
    }

    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|item| item.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    pub fn is_complete(&self) -> bool {
        self.failed() == 0
    }
}

pub struct MutationDispatcher<T> {
    transport: Arc<T>,
    catalog: TableCatalog,
    bulk_mode: BulkMode,
}

impl<T: MutationTransport> MutationDispatcher<T> {
    pub fn new(transport: Arc<T>, catalog: TableCatalog) -> Self {
        Self {
            transport,
            catalog,
            bulk_mode: BulkMode::default(),
        }
    }

    pub fn with_bulk_mode(mut self, mode: BulkMode) -> Self {
        self.bulk_mode = mode;
        self
    }

    pub fn bulk_mode(&self) -> BulkMode {
        self.bulk_mode
    }

    pub fn catalog(&self) -> &TableCatalog {
        &self.catalog
    }

    fn table_config(&self, table: &str) -> Result<&TableConfig, ValidationError> {
        if table.trim().is_empty() {
            return Err(ValidationError::Empty {
                table: table.to_string(),
                what: "table name",
            });
        }
        self.catalog.get(table).ok_or_else(|| ValidationError::UnknownTable {
            table: table.to_string(),
        })
    }

    fn check_required(
        table: &str,
        config: &TableConfig,
        record: &Record,
    ) -> Result<(), ValidationError> {
        for field in &config.required {
            let present = record.get(field).is_some_and(|value| match value {
                Value::Null => false,
                Value::String(s) => !s.trim().is_empty(),
                _ => true,
            });
            if !present {
                return Err(ValidationError::RequiredFieldMissing {
                    table: table.to_string(),
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }

    async fn send(&self, request: MutationRequest, credential: &Credential) -> SyncResult<Value> {
        tracing::debug!(
            table = %request.table,
            kind = ?request.kind(),
            id = ?request.id,
            "Dispatching mutation"
        );
        match self.transport.mutate(&request, credential).await {
            Ok(value) => Ok(value),
            Err(err) => {
                tracing::warn!(
                    table = %request.table,
                    kind = ?request.kind(),
                    error = %err,
                    "Mutation failed"
                );
                Err(err)
            }
        }
    }

    /// Create one record. Returns the record as the server stored it, or the
    /// submitted record when the server echoes nothing.
    pub async fn create(
        &self,
        credential: &Credential,
        table: &str,
        record: Record,
    ) -> SyncResult<Record> {
        let config = self.table_config(table)?;
        Self::check_required(table, config, &record)?;
        let response = self
            .send(MutationRequest::create(table, record.clone()), credential)
            .await?;
        Ok(match response {
            Value::Object(stored) => stored,
            _ => record,
        })
    }

    pub async fn bulk_create(
        &self,
        credential: &Credential,
        table: &str,
        records: Collection,
    ) -> SyncResult<BulkCreateReport> {
        let config = self.table_config(table)?;
        if records.is_empty() {
            return Err(ValidationError::Empty {
                table: table.to_string(),
                what: "records",
            }
            .into());
        }
        match self.bulk_mode {
            BulkMode::Atomic => {
                for record in &records {
                    Self::check_required(table, config, record)?;
                }
                self.bulk_atomic(credential, table, records).await
            }
            BulkMode::Sequential => {
                Ok(self.bulk_sequential(credential, table, config, records).await)
            }
        }
    }

    async fn bulk_atomic(
        &self,
        credential: &Credential,
        table: &str,
        records: Collection,
    ) -> SyncResult<BulkCreateReport> {
        let response = self
            .send(MutationRequest::bulk_create(table, records.clone()), credential)
            .await?;
        let mut echoed: Vec<Record> = match response {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(record) => Some(record),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        if echoed.len() != records.len() {
            tracing::debug!(
                table,
                sent = records.len(),
                echoed = echoed.len(),
                "Bulk echo incomplete; keeping submitted records"
            );
            echoed = records;
        }
        Ok(BulkCreateReport {
            table: table.to_string(),
            mode: BulkMode::Atomic,
            items: echoed
                .into_iter()
                .enumerate()
                .map(|(index, record)| BulkItemOutcome {
                    index,
                    result: Ok(record),
                })
                .collect(),
        })
    }

    async fn bulk_sequential(
        &self,
        credential: &Credential,
        table: &str,
        config: &TableConfig,
        records: Collection,
    ) -> BulkCreateReport {
        let mut items = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            let result = match Self::check_required(table, config, &record) {
                Err(err) => Err(SyncError::from(err)),
                Ok(()) => self
                    .send(MutationRequest::create(table, record.clone()), credential)
                    .await
                    .map(|response| match response {
                        Value::Object(stored) => stored,
                        _ => record,
                    }),
            };
            items.push(BulkItemOutcome { index, result });
        }
        let report = BulkCreateReport {
            table: table.to_string(),
            mode: BulkMode::Sequential,
            items,
        };
        tracing::info!(
            table,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Sequential bulk create finished"
        );
        report
    }

    pub async fn update(
        &self,
        credential: &Credential,
        table: &str,
        id: RecordId,
        patch: Record,
    ) -> SyncResult<()> {
        self.table_config(table)?;
        if patch.is_empty() {
            return Err(ValidationError::Empty {
                table: table.to_string(),
                what: "patch",
            }
            .into());
        }
        self.send(MutationRequest::update(table, id, patch), credential)
            .await
            .map(|_| ())
    }

    pub async fn delete(
        &self,
        credential: &Credential,
        table: &str,
        id: RecordId,
    ) -> SyncResult<()> {
        self.table_config(table)?;
        self.send(MutationRequest::delete(table, id), credential)
            .await
            .map(|_| ())
    }
}
