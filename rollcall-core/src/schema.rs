//! Table schemas and the static table catalog.
//!
//! A [`TableSchema`] is the observed (or declared) shape of one remote table:
//! its column names, the field that identifies a row, and the name of the
//! local collection the table populates. Schemas are immutable once built and
//! are replaced wholesale when refreshed.

use crate::record::Record;
use crate::Timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where the column list of a schema came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaOrigin {
    /// Listed in the table configuration.
    Declared,
    /// Read off the first record of a live table read.
    Inferred,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    /// Column names in first-seen order, without duplicates.
    pub columns: Vec<String>,
    pub id_field: String,
    pub state_key: String,
    pub fetched_at: Timestamp,
    pub origin: SchemaOrigin,
}

impl TableSchema {
    /// Build a schema from the columns the table configuration declares.
    pub fn declared(table: &str, config: &TableConfig, columns: &[String]) -> Self {
        Self {
            table_name: table.to_string(),
            columns: dedup_columns(columns.iter().cloned()),
            id_field: config.id_field.clone(),
            state_key: config.state_key.clone(),
            fetched_at: Utc::now(),
            origin: SchemaOrigin::Declared,
        }
    }

    /// Build a schema by example: the columns are the field names of the
    /// first record. An empty sample yields an empty (unknown) schema.
    pub fn from_sample(table: &str, config: &TableConfig, records: &[Record]) -> Self {
        let columns = records
            .first()
            .map(|first| dedup_columns(first.keys().cloned()))
            .unwrap_or_default();
        Self {
            table_name: table.to_string(),
            columns,
            id_field: config.id_field.clone(),
            state_key: config.state_key.clone(),
            fetched_at: Utc::now(),
            origin: SchemaOrigin::Inferred,
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// An empty column set means "not yet observable", not "no columns".
    pub fn is_known(&self) -> bool {
        !self.columns.is_empty()
    }
}

/// Whether later records in a sample carry keys the first record lacks,
/// which makes a schema inferred from the first record unreliable.
pub fn sample_is_heterogeneous(records: &[Record]) -> bool {
    let Some(first) = records.first() else {
        return false;
    };
    records
        .iter()
        .skip(1)
        .any(|record| record.len() != first.len() || record.keys().any(|k| !first.contains_key(k)))
}

fn dedup_columns(columns: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for column in columns {
        if !out.contains(&column) {
            out.push(column);
        }
    }
    out
}

/// Static per-table configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    pub id_field: String,
    pub state_key: String,
    /// Declared column list. When present no read is needed to build the
    /// schema.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    /// Fields a new record must carry before it is sent.
    #[serde(default)]
    pub required: Vec<String>,
}

impl TableConfig {
    pub fn new(id_field: impl Into<String>, state_key: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            state_key: state_key.into(),
            columns: None,
            required: Vec::new(),
        }
    }

    pub fn with_columns(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn with_required(mut self, required: &[&str]) -> Self {
        self.required = required.iter().map(|c| c.to_string()).collect();
        self
    }
}

/// Map from table name to its [`TableConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableCatalog {
    tables: BTreeMap<String, TableConfig>,
}

impl TableCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The catalog compiled into the client.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.insert(
            "users",
            TableConfig::new("user_id", "users").with_required(&["user_name", "email"]),
        );
        catalog.insert("teachers", TableConfig::new("user_id", "teachers"));
        catalog.insert("students", TableConfig::new("user_id", "students"));
        catalog.insert(
            "classes",
            TableConfig::new("class_id", "classes").with_required(&["course_id"]),
        );
        catalog.insert(
            "courses",
            TableConfig::new("course_id", "courses").with_required(&["course_name"]),
        );
        catalog.insert("grades", TableConfig::new("grade_id", "grades"));
        catalog.insert(
            "class_users",
            TableConfig::new("class_user_id", "class_users")
                .with_required(&["class_id", "user_id"]),
        );
        catalog.insert("payments", TableConfig::new("payment_id", "payments"));
        catalog.insert("quizzes", TableConfig::new("quiz_id", "quizzes"));
        catalog
    }

    pub fn insert(&mut self, table: impl Into<String>, config: TableConfig) {
        self.tables.insert(table.into(), config);
    }

    /// Apply `overrides` on top of this catalog, replacing whole entries.
    pub fn merged(mut self, overrides: &TableCatalog) -> Self {
        for (table, config) in &overrides.tables {
            self.tables.insert(table.clone(), config.clone());
        }
        self
    }

    pub fn get(&self, table: &str) -> Option<&TableConfig> {
        self.tables.get(table)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Table names in name order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TableConfig)> {
        self.tables.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_schema_by_example_uses_first_record() {
        let config = TableConfig::new("user_id", "teachers");
        let records = vec![
            rec(json!({"user_id": 1, "experience": 4})),
            rec(json!({"user_id": 2, "experience": 9, "extra": true})),
        ];
        let schema = TableSchema::from_sample("teachers", &config, &records);
        assert_eq!(schema.columns, vec!["user_id".to_string(), "experience".to_string()]);
        assert_eq!(schema.id_field, "user_id");
        assert_eq!(schema.origin, SchemaOrigin::Inferred);
        assert!(schema.has_column("experience"));
        assert!(!schema.has_column("extra"));
    }

    #[test]
    fn test_empty_sample_is_unknown_not_an_error() {
        let config = TableConfig::new("class_id", "classes");
        let schema = TableSchema::from_sample("classes", &config, &[]);
        assert!(!schema.is_known());
        assert_eq!(schema.state_key, "classes");
    }

    #[test]
    fn test_heterogeneous_sample_detection() {
        let same = vec![rec(json!({"a": 1, "b": 2})), rec(json!({"b": 3, "a": 4}))];
        assert!(!sample_is_heterogeneous(&same));
        let mixed = vec![rec(json!({"a": 1})), rec(json!({"a": 1, "c": 2}))];
        assert!(sample_is_heterogeneous(&mixed));
        assert!(!sample_is_heterogeneous(&[]));
    }

    #[test]
    fn test_declared_schema_dedups() {
        let config = TableConfig::new("grade_id", "grades");
        let columns = vec!["grade_id".to_string(), "name".to_string(), "name".to_string()];
        let schema = TableSchema::declared("grades", &config, &columns);
        assert_eq!(schema.columns.len(), 2);
        assert_eq!(schema.origin, SchemaOrigin::Declared);
    }

    #[test]
    fn test_catalog_override_replaces_entry() {
        let mut overrides = TableCatalog::new();
        overrides.insert(
            "grades",
            TableConfig::new("id", "grade_levels").with_columns(&["id", "label"]),
        );
        let catalog = TableCatalog::builtin().merged(&overrides);
        let grades = catalog.get("grades").cloned().unwrap_or_else(|| TableConfig::new("", ""));
        assert_eq!(grades.id_field, "id");
        assert_eq!(grades.state_key, "grade_levels");
        assert!(catalog.contains("users"));
    }
}
