//! Records, collections and record identifiers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One row as returned by the table read endpoint.
pub type Record = Map<String, Value>;

/// A named, ordered array of uniform records.
pub type Collection = Vec<Record>;

/// Identifier of a record, as found under its table's `id_field`.
///
/// Servers are not consistent about whether ids travel as numbers or
/// strings, so an integer id matches its decimal string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl RecordId {
    /// Read an id out of a JSON value. Only integers and strings qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RecordId::Int),
            Value::String(s) => Some(RecordId::Text(s.clone())),
            _ => None,
        }
    }

    /// Whether a JSON value names this id.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (RecordId::Int(id), Value::Number(n)) => n.as_i64() == Some(*id),
            (RecordId::Int(id), Value::String(s)) => s.parse::<i64>().ok() == Some(*id),
            (RecordId::Text(id), Value::String(s)) => id == s,
            (RecordId::Text(id), Value::Number(n)) => n.to_string() == *id,
            _ => false,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            RecordId::Int(id) => Value::from(*id),
            RecordId::Text(id) => Value::from(id.clone()),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(id) => write!(f, "{}", id),
            RecordId::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        RecordId::Int(id)
    }
}

impl From<i32> for RecordId {
    fn from(id: i32) -> Self {
        RecordId::Int(i64::from(id))
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        RecordId::Text(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        RecordId::Text(id)
    }
}

/// Id of `record` under `id_field`, if present and usable.
pub fn record_id(record: &Record, id_field: &str) -> Option<RecordId> {
    record.get(id_field).and_then(RecordId::from_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_int_id_matches_number_and_string() {
        let id = RecordId::from(5);
        assert!(id.matches(&json!(5)));
        assert!(id.matches(&json!("5")));
        assert!(!id.matches(&json!(6)));
        assert!(!id.matches(&json!(null)));
    }

    #[test]
    fn test_text_id_matches() {
        let id = RecordId::from("abc");
        assert!(id.matches(&json!("abc")));
        assert!(!id.matches(&json!("abd")));
        assert!(RecordId::from("12").matches(&json!(12)));
    }

    #[test]
    fn test_record_id_extraction() {
        let record = json!({"class_id": 9, "name": "Math"});
        let record = record.as_object().cloned().unwrap_or_default();
        assert_eq!(record_id(&record, "class_id"), Some(RecordId::Int(9)));
        assert_eq!(record_id(&record, "name"), Some(RecordId::Text("Math".into())));
        assert_eq!(record_id(&record, "missing"), None);
    }

    #[test]
    fn test_display_and_value() {
        assert_eq!(RecordId::from(7).to_string(), "7");
        assert_eq!(RecordId::from("x-1").to_value(), json!("x-1"));
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            /// An id always matches its own JSON value and its decimal string.
            #[test]
            fn prop_int_id_matches_own_forms(n in any::<i64>()) {
                let id = RecordId::from(n);
                prop_assert!(id.matches(&id.to_value()));
                prop_assert!(id.matches(&Value::from(n.to_string())));
                prop_assert_eq!(RecordId::from_value(&id.to_value()), Some(id));
            }

            #[test]
            fn prop_distinct_ints_never_match(a in any::<i64>(), b in any::<i64>()) {
                prop_assume!(a != b);
                prop_assert!(!RecordId::from(a).matches(&Value::from(b)));
            }
        }
    }
}
