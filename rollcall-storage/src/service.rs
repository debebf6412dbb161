//! Table-name level access to the registry.

use crate::cache::{SchemaFetcher, SchemaRegistry};
use futures_util::future::try_join_all;
use rollcall_core::{Credential, SyncResult, TableSchema};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Schemas keyed by table name.
pub type SchemaMap = BTreeMap<String, Arc<TableSchema>>;

/// A [`SchemaRegistry`] paired with the fetcher that fills it.
pub struct SchemaService<F> {
    registry: Arc<SchemaRegistry>,
    fetcher: Arc<F>,
}

impl<F> Clone for SchemaService<F> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            fetcher: Arc::clone(&self.fetcher),
        }
    }
}

impl<F: SchemaFetcher> SchemaService<F> {
    pub fn new(registry: Arc<SchemaRegistry>, fetcher: Arc<F>) -> Self {
        Self { registry, fetcher }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn known_tables(&self) -> Vec<String> {
        self.fetcher.known_tables()
    }

    pub async fn get_schema(
        &self,
        table: &str,
        credential: Option<&Credential>,
    ) -> SyncResult<Arc<TableSchema>> {
        let fetcher = Arc::clone(&self.fetcher);
        let owned = table.to_string();
        let credential = credential.cloned();
        self.registry
            .get_or_fetch(table, move || async move {
                fetcher.fetch_schema(&owned, credential.as_ref()).await
            })
            .await
    }

    /// Schemas of `tables`, fetched concurrently. Fails if any fetch fails.
    pub async fn get_schemas(
        &self,
        tables: &[String],
        credential: Option<&Credential>,
    ) -> SyncResult<SchemaMap> {
        let lookups = tables.iter().map(|table| self.get_schema(table, credential));
        let schemas = try_join_all(lookups).await?;
        Ok(tables.iter().cloned().zip(schemas).collect())
    }

    /// Every table the fetcher knows about.
    pub async fn get_all_schemas(&self, credential: Option<&Credential>) -> SyncResult<SchemaMap> {
        let tables = self.fetcher.known_tables();
        self.get_schemas(&tables, credential).await
    }
}
