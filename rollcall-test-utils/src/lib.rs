//! ROLLCALL Test Utilities
//!
//! Centralized test infrastructure for the ROLLCALL workspace:
//! - An in-memory backend implementing both remote endpoints, with call
//!   counters, latency and failure injection
//! - Fixtures for the school data used across the test suites
//! - Proptest generators for records and collections

pub use rollcall_core::{
    Collection, Credential, Filters, MutationKind, MutationRequest, MutationTransport, Record,
    RecordId, SyncError, SyncResult, TableCatalog, TableConfig, TableReader, TableSchema,
};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

// ============================================================================
// MOCK BACKEND
// ============================================================================

#[derive(Debug, Clone)]
struct RejectRule {
    table: String,
    field: Option<(String, Value)>,
    status: u16,
    message: Option<String>,
}

impl RejectRule {
    fn rejects(&self, table: &str, record: Option<&Record>) -> bool {
        if self.table != table {
            return false;
        }
        match (&self.field, record) {
            (None, _) => true,
            (Some((field, value)), Some(record)) => record.get(field) == Some(value),
            (Some(_), None) => false,
        }
    }

    fn error(&self) -> SyncError {
        SyncError::dispatch(self.table.clone(), self.status, self.message.clone())
    }
}

fn not_found(table: &str, id: &RecordId) -> SyncError {
    SyncError::dispatch(table, 404, Some(format!("{} {} not found", table, id)))
}

#[derive(Default)]
struct BackendState {
    tables: BTreeMap<String, Collection>,
    reads: HashMap<String, usize>,
    mutations: Vec<MutationRequest>,
    read_failures: HashMap<String, SyncError>,
    reject_rules: Vec<RejectRule>,
    latency: Duration,
}

/// In-memory stand-in for the remote service.
///
/// Mutations are applied to the stored tables the way the real service
/// would, so a test can assert on both the requests sent and the resulting
/// server-side state.
pub struct MockBackend {
    catalog: TableCatalog,
    state: Mutex<BackendState>,
    next_id: AtomicI64,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new(TableCatalog::builtin())
    }
}

impl MockBackend {
    pub fn new(catalog: TableCatalog) -> Self {
        Self {
            catalog,
            state: Mutex::new(BackendState::default()),
            next_id: AtomicI64::new(1000),
        }
    }

    fn state(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_rows(self, table: &str, rows: Collection) -> Self {
        self.set_rows(table, rows);
        self
    }

    pub fn set_rows(&self, table: &str, rows: Collection) {
        self.state().tables.insert(table.to_string(), rows);
    }

    pub fn rows(&self, table: &str) -> Collection {
        self.state().tables.get(table).cloned().unwrap_or_default()
    }

    /// Delay applied to every read and mutation.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    pub fn fail_reads(&self, table: &str, error: SyncError) {
        self.state().read_failures.insert(table.to_string(), error);
    }

    pub fn clear_read_failures(&self) {
        self.state().read_failures.clear();
    }

    /// Reject every mutation against `table`.
    pub fn reject_mutations(&self, table: &str, status: u16, message: Option<&str>) {
        self.state().reject_rules.push(RejectRule {
            table: table.to_string(),
            field: None,
            status,
            message: message.map(str::to_string),
        });
    }

    /// Reject creations on `table` whose record carries `field == value`.
    pub fn reject_records_where(&self, table: &str, field: &str, value: Value, message: &str) {
        self.state().reject_rules.push(RejectRule {
            table: table.to_string(),
            field: Some((field.to_string(), value)),
            status: 422,
            message: Some(message.to_string()),
        });
    }

    pub fn clear_rejections(&self) {
        self.state().reject_rules.clear();
    }

    pub fn read_count(&self, table: &str) -> usize {
        self.state().reads.get(table).copied().unwrap_or(0)
    }

    pub fn total_reads(&self) -> usize {
        self.state().reads.values().sum()
    }

    pub fn mutations(&self) -> Vec<MutationRequest> {
        self.state().mutations.clone()
    }

    pub fn last_mutation(&self) -> Option<MutationRequest> {
        self.state().mutations.last().cloned()
    }

    fn id_field(&self, table: &str) -> String {
        self.catalog
            .get(table)
            .map(|c| c.id_field.clone())
            .unwrap_or_else(|| "id".to_string())
    }

    fn assign_id(&self, table: &str, mut record: Record) -> Record {
        let id_field = self.id_field(table);
        if !record.contains_key(&id_field) {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            record.insert(id_field, Value::from(id));
        }
        record
    }

    fn apply(&self, request: &MutationRequest) -> SyncResult<Value> {
        let mut state = self.state();
        let table = request.table.as_str();
        let id_field = self.id_field(table);

        match request.kind() {
            MutationKind::Create => {
                let record = request.data.as_ref().and_then(Value::as_object).cloned();
                let Some(record) = record else {
                    return Err(SyncError::dispatch(table, 400, Some("missing data".into())));
                };
                if let Some(rule) =
                    state.reject_rules.iter().find(|r| r.rejects(table, Some(&record)))
                {
                    return Err(rule.error());
                }
                let record = self.assign_id(table, record);
                state.tables.entry(table.to_string()).or_default().push(record.clone());
                Ok(Value::Object(record))
            }
            MutationKind::BulkCreate => {
                let records: Vec<Record> = request
                    .data
                    .as_ref()
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(|v| v.as_object().cloned()).collect())
                    .unwrap_or_default();
                // All or nothing.
                for record in &records {
                    if let Some(rule) =
                        state.reject_rules.iter().find(|r| r.rejects(table, Some(record)))
                    {
                        return Err(rule.error());
                    }
                }
                let created: Vec<Record> =
                    records.into_iter().map(|r| self.assign_id(table, r)).collect();
                state
                    .tables
                    .entry(table.to_string())
                    .or_default()
                    .extend(created.iter().cloned());
                Ok(Value::Array(created.into_iter().map(Value::Object).collect()))
            }
            MutationKind::Update => {
                if let Some(rule) = state.reject_rules.iter().find(|r| r.rejects(table, None)) {
                    return Err(rule.error());
                }
                let (Some(id), Some(patch)) = (&request.id, &request.updates) else {
                    return Err(SyncError::dispatch(table, 400, Some("missing id".into())));
                };
                let rows = state.tables.entry(table.to_string()).or_default();
                let Some(row) = rows
                    .iter_mut()
                    .find(|row| row.get(&id_field).is_some_and(|v| id.matches(v)))
                else {
                    return Err(not_found(table, id));
                };
                for (k, v) in patch {
                    row.insert(k.clone(), v.clone());
                }
                Ok(Value::Object(row.clone()))
            }
            MutationKind::Delete => {
                if let Some(rule) = state.reject_rules.iter().find(|r| r.rejects(table, None)) {
                    return Err(rule.error());
                }
                let Some(id) = &request.id else {
                    return Err(SyncError::dispatch(table, 400, Some("missing id".into())));
                };
                let rows = state.tables.entry(table.to_string()).or_default();
                let before = rows.len();
                rows.retain(|row| !row.get(&id_field).is_some_and(|v| id.matches(v)));
                if rows.len() == before {
                    return Err(not_found(table, id));
                }
                Ok(Value::Null)
            }
        }
    }

    fn latency(&self) -> Duration {
        self.state().latency
    }
}

#[async_trait]
impl TableReader for MockBackend {
    async fn read_table(
        &self,
        table: &str,
        _filters: &Filters,
        _credential: Option<&Credential>,
    ) -> SyncResult<Collection> {
        *self.state().reads.entry(table.to_string()).or_default() += 1;
        let latency = self.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let state = self.state();
        if let Some(err) = state.read_failures.get(table) {
            return Err(err.clone());
        }
        Ok(state.tables.get(table).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl MutationTransport for MockBackend {
    async fn mutate(
        &self,
        request: &MutationRequest,
        _credential: &Credential,
    ) -> SyncResult<Value> {
        self.state().mutations.push(request.clone());
        let latency = self.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.apply(request)
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;
    use serde_json::json;

    /// Turn a JSON object literal into a [`Record`].
    pub fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => Record::new(),
        }
    }

    pub fn credential() -> Credential {
        Credential::bearer("test-token")
    }

    pub fn users() -> Collection {
        vec![
            record(json!({"user_id": 7, "user_name": "Sita", "email": "sita@school.test"})),
            record(json!({"user_id": 8, "user_name": "Hari", "email": "hari@school.test"})),
        ]
    }

    pub fn teachers() -> Collection {
        vec![record(json!({"user_id": 7, "experience": 4}))]
    }

    pub fn students() -> Collection {
        vec![record(json!({"user_id": 8, "grade_id": 2}))]
    }

    pub fn classes() -> Collection {
        vec![
            record(json!({"class_id": 4, "course_id": 1, "cost": 80, "teacher_id": 7})),
            record(json!({"class_id": 5, "course_id": 1, "cost": 90, "teacher_id": 7})),
            record(json!({"class_id": 6, "course_id": 2, "cost": 70, "teacher_id": 7})),
        ]
    }

    pub fn courses() -> Collection {
        vec![
            record(json!({"course_id": 1, "course_name": "Algebra", "grade_id": 2})),
            record(json!({"course_id": 2, "course_name": "Physics", "grade_id": 3})),
        ]
    }

    pub fn grades() -> Collection {
        vec![
            record(json!({"grade_id": 2, "grade_name": "Grade 9"})),
            record(json!({"grade_id": 3, "grade_name": "Grade 10"})),
        ]
    }

    pub fn class_users() -> Collection {
        vec![record(json!({"class_user_id": 1, "class_id": 4, "user_id": 8}))]
    }

    /// Backend seeded with every table the admin tabs read.
    pub fn school_backend() -> MockBackend {
        MockBackend::default()
            .with_rows("users", users())
            .with_rows("teachers", teachers())
            .with_rows("students", students())
            .with_rows("classes", classes())
            .with_rows("courses", courses())
            .with_rows("grades", grades())
            .with_rows("class_users", class_users())
            .with_rows("payments", Vec::new())
            .with_rows("quizzes", Vec::new())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod strategies {
    use super::*;
    use proptest::prelude::*;

    pub fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            "[a-z]{0,12}".prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            Just(Value::Null),
        ]
    }

    /// A patch over a handful of non-id field names.
    pub fn arb_patch() -> impl Strategy<Value = Record> {
        prop::collection::btree_map("[a-z]{1,6}", arb_scalar(), 0..4)
            .prop_map(|fields| fields.into_iter().collect())
    }

    /// A collection whose records carry unique integer ids under `id_field`.
    pub fn arb_collection(id_field: &'static str) -> impl Strategy<Value = Collection> {
        prop::collection::btree_set(0i64..500, 0..20).prop_flat_map(move |ids| {
            let ids: Vec<i64> = ids.into_iter().collect();
            let n = ids.len();
            prop::collection::vec(arb_patch(), n).prop_map(move |patches| {
                ids.iter()
                    .zip(patches)
                    .map(|(id, mut patch)| {
                        patch.remove(id_field);
                        let mut record = Record::new();
                        record.insert(id_field.to_string(), Value::from(*id));
                        record.extend(patch);
                        record
                    })
                    .collect()
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_counts_reads() {
        let backend = school_backend();
        let rows = backend.read_table("classes", &Filters::new(), None).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(backend.read_count("classes"), 1);
        assert_eq!(backend.total_reads(), 1);
    }

    #[tokio::test]
    async fn test_mock_update_applies_patch() {
        let backend = school_backend();
        let patch = record(json!({"cost": 100}));
        let req = MutationRequest::update("classes", RecordId::from(5), patch);
        let updated = backend.mutate(&req, &credential()).await.unwrap();
        assert_eq!(updated["cost"], json!(100));
        assert_eq!(backend.rows("classes")[1]["cost"], json!(100));
    }

    #[tokio::test]
    async fn test_mock_atomic_bulk_rejects_everything() {
        let backend = school_backend();
        backend.reject_records_where("grades", "grade_name", json!("bad"), "invalid grade");
        let req = MutationRequest::bulk_create(
            "grades",
            vec![record(json!({"grade_name": "ok"})), record(json!({"grade_name": "bad"}))],
        );
        assert!(backend.mutate(&req, &credential()).await.is_err());
        assert_eq!(backend.rows("grades").len(), 2);
    }
}
