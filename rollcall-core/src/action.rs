//! Action keys identify one logical mutation while it is in flight.

use crate::constants::NEW_ENTITY_ID;
use crate::record::RecordId;
use std::fmt;

/// What part of an entity an action writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionTarget {
    Field(String),
    Multi,
    Create,
    Delete,
    BulkCreate,
}

impl ActionTarget {
    fn suffix(&self) -> &str {
        match self {
            ActionTarget::Field(field) => field,
            ActionTarget::Multi => "multi",
            ActionTarget::Create => "create",
            ActionTarget::Delete => "delete",
            ActionTarget::BulkCreate => "bulk",
        }
    }
}

/// Renders as `<entityKind>-<id>-<field|multi>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionKey {
    entity_kind: String,
    entity_id: String,
    target: ActionTarget,
}

impl ActionKey {
    pub fn new(
        entity_kind: impl Into<String>,
        entity_id: impl Into<String>,
        target: ActionTarget,
    ) -> Self {
        Self {
            entity_kind: entity_kind.into(),
            entity_id: entity_id.into(),
            target,
        }
    }

    pub fn field(entity_kind: &str, id: &RecordId, field: &str) -> Self {
        Self::new(entity_kind, id.to_string(), ActionTarget::Field(field.to_string()))
    }

    pub fn multi(entity_kind: &str, id: &RecordId) -> Self {
        Self::new(entity_kind, id.to_string(), ActionTarget::Multi)
    }

    pub fn create(entity_kind: &str) -> Self {
        Self::new(entity_kind, NEW_ENTITY_ID, ActionTarget::Create)
    }

    pub fn delete(entity_kind: &str, id: &RecordId) -> Self {
        Self::new(entity_kind, id.to_string(), ActionTarget::Delete)
    }

    pub fn bulk_create(entity_kind: &str) -> Self {
        Self::new(entity_kind, NEW_ENTITY_ID, ActionTarget::BulkCreate)
    }

    pub fn entity_kind(&self) -> &str {
        &self.entity_kind
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn target(&self) -> &ActionTarget {
        &self.target
    }

    /// Whether this action writes to the given entity.
    pub fn touches(&self, entity_kind: &str, id: &RecordId) -> bool {
        self.entity_kind == entity_kind && self.entity_id == id.to_string()
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.entity_kind, self.entity_id, self.target.suffix())
    }
}
