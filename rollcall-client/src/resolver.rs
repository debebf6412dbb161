//! Column ownership resolution.
//!
//! Related tables share ids (a teacher row and its user row both carry
//! `user_id`), so an edit shown in one table's view may belong to another
//! table. The resolver decides which table a column must be written to by
//! looking at the live schemas.

use rollcall_core::constants::{DEFAULT_BASE_TABLE, DEFAULT_TABLE_ORDER};
use rollcall_core::{Record, SyncError, SyncResult};
use rollcall_storage::SchemaMap;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnResolver {
    base_table: String,
    table_order: Vec<String>,
    pinned: BTreeMap<String, Vec<String>>,
}

impl Default for ColumnResolver {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_TABLE)
    }
}

impl ColumnResolver {
    pub fn new(base_table: impl Into<String>) -> Self {
        Self {
            base_table: base_table.into(),
            table_order: DEFAULT_TABLE_ORDER.iter().map(|t| t.to_string()).collect(),
            pinned: BTreeMap::new(),
        }
    }

    pub fn with_table_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table_order = order.into_iter().map(Into::into).collect();
        self
    }

    /// Search `tables` first, in order, whenever `column` is resolved.
    pub fn with_pinned<I, S>(mut self, column: impl Into<String>, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pinned
            .insert(column.into(), tables.into_iter().map(Into::into).collect());
        self
    }

    pub fn base_table(&self) -> &str {
        &self.base_table
    }

    pub fn table_order(&self) -> &[String] {
        &self.table_order
    }

    /// Target table for `column` edited in the view of `context_table`.
    ///
    /// The base table wins only when it has the column and the context
    /// table does not. A context whose schema is unknown (empty table) does
    /// not have the column.
    pub fn resolve_for_context(
        &self,
        column: &str,
        context_table: &str,
        schemas: &SchemaMap,
    ) -> String {
        let has = |table: &str| schemas.get(table).is_some_and(|s| s.has_column(column));
        if has(&self.base_table) && !has(context_table) {
            tracing::debug!(
                column,
                context_table,
                target = %self.base_table,
                "Column belongs to base table"
            );
            self.base_table.clone()
        } else {
            context_table.to_string()
        }
    }

    /// Tables searched for `column`, in priority order: its pinned list,
    /// then the global order, then every other known table by name.
    pub fn search_order<'a>(&'a self, column: &str, schemas: &'a SchemaMap) -> Vec<&'a str> {
        let pinned = self.pinned.get(column).into_iter().flatten();
        let mut order: Vec<&str> = Vec::new();
        for table in pinned
            .chain(self.table_order.iter())
            .chain(schemas.keys())
            .map(String::as_str)
        {
            if schemas.contains_key(table) && !order.contains(&table) {
                order.push(table);
            }
        }
        order
    }

    /// First table in [`search_order`](Self::search_order) whose schema
    /// has `column`.
    pub fn resolve_auto(&self, column: &str, schemas: &SchemaMap) -> SyncResult<String> {
        let order = self.search_order(column, schemas);
        order
            .iter()
            .find(|table| schemas.get(**table).is_some_and(|s| s.has_column(column)))
            .map(|table| table.to_string())
            .ok_or_else(|| SyncError::SchemaResolution {
                column: column.to_string(),
                searched: order.iter().map(|t| t.to_string()).collect(),
            })
    }

    /// Split `updates` into one patch per target table, targets in the
    /// order their first column appears.
    pub fn group_by_target(
        &self,
        context_table: Option<&str>,
        updates: &Record,
        schemas: &SchemaMap,
    ) -> SyncResult<Vec<(String, Record)>> {
        let mut groups: Vec<(String, Record)> = Vec::new();
        for (column, value) in updates {
            let target = match context_table {
                Some(context) => self.resolve_for_context(column, context, schemas),
                None => self.resolve_auto(column, schemas)?,
            };
            match groups.iter_mut().find(|(table, _)| *table == target) {
                Some((_, patch)) => {
                    patch.insert(column.clone(), value.clone());
                }
                None => {
                    let mut patch = Record::new();
                    patch.insert(column.clone(), value.clone());
                    groups.push((target, patch));
                }
            }
        }
        Ok(groups)
    }
}
