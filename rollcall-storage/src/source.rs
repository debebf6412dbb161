//! Schema source backed by the table read endpoint.

use crate::cache::SchemaFetcher;
use async_trait::async_trait;
use rollcall_core::{
    sample_is_heterogeneous, Credential, Filters, SyncError, SyncResult, TableCatalog, TableReader,
    TableSchema,
};
use std::sync::Arc;

/// Builds a [`TableSchema`] for any table in the catalog.
///
/// Declared columns win. Otherwise the schema is inferred from the first row
/// of a live read, which is only as reliable as the sample: an empty table
/// yields an unknown (empty) schema and a heterogeneous sample is logged.
pub struct TableSchemaSource<R> {
    reader: Arc<R>,
    catalog: TableCatalog,
}

impl<R: TableReader> TableSchemaSource<R> {
    pub fn new(reader: Arc<R>, catalog: TableCatalog) -> Self {
        Self { reader, catalog }
    }

    pub fn catalog(&self) -> &TableCatalog {
        &self.catalog
    }
}

#[async_trait]
impl<R: TableReader + 'static> SchemaFetcher for TableSchemaSource<R> {
    async fn fetch_schema(
        &self,
        table: &str,
        credential: Option<&Credential>,
    ) -> SyncResult<TableSchema> {
        let config = self.catalog.get(table).ok_or_else(|| SyncError::SchemaFetch {
            table: table.to_string(),
            reason: "table is not in the catalog".to_string(),
        })?;

        if let Some(columns) = &config.columns {
            return Ok(TableSchema::declared(table, config, columns));
        }

        let records = self
            .reader
            .read_table(table, &Filters::new(), credential)
            .await
            .map_err(|err| match err {
                err @ SyncError::SchemaFetch { .. } => err,
                other => SyncError::SchemaFetch {
                    table: table.to_string(),
                    reason: other.to_string(),
                },
            })?;

        if sample_is_heterogeneous(&records) {
            tracing::warn!(
                table,
                rows = records.len(),
                "Rows disagree on their columns; schema inferred from the first row only"
            );
        }

        let schema = TableSchema::from_sample(table, config, &records);
        if !schema.is_known() {
            tracing::debug!(table, "Table is empty; schema not yet observable");
        }
        Ok(schema)
    }

    fn known_tables(&self) -> Vec<String> {
        self.catalog.table_names().map(str::to_string).collect()
    }
}
