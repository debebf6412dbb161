//! Caller-facing synchronization session.
//!
//! A [`SyncSession`] wires the schema registry, column resolver, dispatcher,
//! action tracker and tab orchestrator around one backend. Every mutating
//! handler follows the same shape:
//!
//! 1. claim an action key (duplicates are rejected),
//! 2. resolve and validate,
//! 3. dispatch exactly the remote writes needed,
//! 4. reconcile the confirmed result into the local collections,
//! 5. release the key, whatever happened.
//!
//! Failures become a notification and the returned error; local state is
//! only ever advanced by confirmed writes.

use crate::config::SyncConfig;
use crate::dispatcher::{BulkCreateReport, BulkMode, MutationDispatcher};
use crate::notifications::{Notification, NotificationAction, NotificationLevel, NotificationQueue};
use crate::orchestrator::{AdminOrchestrator, LoadOutcome, TabLoadState};
use crate::reconcile::{apply_bulk_insertion, apply_insertion, apply_removal, apply_update};
use crate::resolver::ColumnResolver;
use crate::store::CollectionStore;
use crate::tabs::Tab;
use crate::tracker::{ActionGuard, ActionTracker};
use rollcall_core::{
    ActionKey, Collection, Credential, MutationTransport, Record, RecordId, SyncError, SyncResult,
    TableCatalog, TableReader, TableSchema, ValidationError,
};
use rollcall_storage::{
    CacheConfig, CacheStats, SchemaMap, SchemaRegistry, SchemaService, TableSchemaSource,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Result of a handler whose remote write succeeded.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome<T> {
    /// The write was confirmed and reconciled into local state.
    Applied(T),
    /// The write was confirmed after the session closed; local state was
    /// left alone.
    Discarded,
}

impl<T> MutationOutcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, MutationOutcome::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            MutationOutcome::Applied(value) => Some(value),
            MutationOutcome::Discarded => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub catalog: TableCatalog,
    pub cache: CacheConfig,
    pub resolver: ColumnResolver,
    pub bulk_mode: BulkMode,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            catalog: TableCatalog::builtin(),
            cache: CacheConfig::default(),
            resolver: ColumnResolver::default(),
            bulk_mode: BulkMode::default(),
        }
    }
}

impl From<&SyncConfig> for SessionOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            catalog: config.catalog(),
            cache: config.cache_config(),
            resolver: config.resolver(),
            bulk_mode: config.bulk_mode,
        }
    }
}

pub struct SyncSession<B> {
    catalog: TableCatalog,
    schemas: SchemaService<TableSchemaSource<B>>,
    resolver: ColumnResolver,
    dispatcher: MutationDispatcher<B>,
    tracker: ActionTracker,
    orchestrator: AdminOrchestrator<B>,
    store: CollectionStore,
    notifications: NotificationQueue,
    closed: AtomicBool,
}

impl<B> SyncSession<B>
where
    B: TableReader + MutationTransport + 'static,
{
    /// Must be called inside a tokio runtime for the schema cache sweep to
    /// start.
    pub fn new(backend: Arc<B>, options: SessionOptions) -> Self {
        let registry = Arc::new(SchemaRegistry::new(options.cache));
        let source = TableSchemaSource::new(Arc::clone(&backend), options.catalog.clone());
        let store = CollectionStore::new();
        Self {
            schemas: SchemaService::new(registry, Arc::new(source)),
            resolver: options.resolver,
            dispatcher: MutationDispatcher::new(Arc::clone(&backend), options.catalog.clone())
                .with_bulk_mode(options.bulk_mode),
            tracker: ActionTracker::new(),
            orchestrator: AdminOrchestrator::new(backend, options.catalog.clone(), store.clone()),
            store,
            catalog: options.catalog,
            notifications: NotificationQueue::default(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn from_config(backend: Arc<B>, config: &SyncConfig) -> Self {
        Self::new(backend, SessionOptions::from(config))
    }

    // ------------------------------------------------------------------
    // Schemas
    // ------------------------------------------------------------------

    pub async fn get_schema(
        &self,
        table: &str,
        credential: Option<&Credential>,
    ) -> SyncResult<Arc<TableSchema>> {
        self.schemas.get_schema(table, credential).await
    }

    pub async fn get_all_schemas(&self, credential: Option<&Credential>) -> SyncResult<SchemaMap> {
        self.schemas.get_all_schemas(credential).await
    }

    /// Schemas the resolver needs to place a column edited in `context`.
    async fn resolution_schemas(
        &self,
        context: Option<&str>,
        credential: &Credential,
    ) -> SyncResult<SchemaMap> {
        match context {
            Some(table) => {
                let mut tables = vec![self.resolver.base_table().to_string()];
                if table != self.resolver.base_table() {
                    tables.push(table.to_string());
                }
                self.schemas.get_schemas(&tables, Some(credential)).await
            }
            None => self.schemas.get_all_schemas(Some(credential)).await,
        }
    }

    // ------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------

    /// Save one field of one record.
    ///
    /// With a `table`, the column is written to that table unless only the
    /// base table has it. Without one, the first table in resolution order
    /// owning the column is used, and the action key names that table.
    pub async fn handle_save_data(
        &self,
        credential: &Credential,
        table: Option<&str>,
        id: RecordId,
        column: &str,
        value: Value,
    ) -> SyncResult<MutationOutcome<String>> {
        let result = self.save_data(credential, table, id, column, value).await;
        self.surface(result)
    }

    async fn save_data(
        &self,
        credential: &Credential,
        table: Option<&str>,
        id: RecordId,
        column: &str,
        value: Value,
    ) -> SyncResult<MutationOutcome<String>> {
        self.ensure_open()?;
        let (target, _guard) = match table {
            Some(context) => {
                let guard = self.begin(ActionKey::field(context, &id, column))?;
                let schemas = self.resolution_schemas(table, credential).await?;
                (self.resolver.resolve_for_context(column, context, &schemas), guard)
            }
            None => {
                let schemas = self.resolution_schemas(None, credential).await?;
                let target = self.resolver.resolve_auto(column, &schemas)?;
                let guard = self.begin(ActionKey::field(&target, &id, column))?;
                (target, guard)
            }
        };

        let mut patch = Record::new();
        patch.insert(column.to_string(), value);
        self.dispatcher
            .update(credential, &target, id.clone(), patch.clone())
            .await?;

        if self.discard_if_closed(&target) {
            return Ok(MutationOutcome::Discarded);
        }
        self.reconcile_update(&target, &id, &patch);
        if let Some(context) = table.filter(|context| *context != target) {
            self.reconcile_joined(context, &id, &patch);
        }
        Ok(MutationOutcome::Applied(target))
    }

    /// Save several fields of one record, split across the tables that own
    /// them. Groups are written in the order their first column appears;
    /// the first failure stops the rest, and groups already confirmed stay
    /// applied. Returns the tables written.
    pub async fn handle_multi_save_data(
        &self,
        credential: &Credential,
        table: &str,
        id: RecordId,
        updates: Record,
    ) -> SyncResult<MutationOutcome<Vec<String>>> {
        let result = self.multi_save_data(credential, table, id, updates).await;
        self.surface(result)
    }

    async fn multi_save_data(
        &self,
        credential: &Credential,
        table: &str,
        id: RecordId,
        updates: Record,
    ) -> SyncResult<MutationOutcome<Vec<String>>> {
        self.ensure_open()?;
        if updates.is_empty() {
            return Err(ValidationError::Empty {
                table: table.to_string(),
                what: "updates",
            }
            .into());
        }
        let _guard = self.begin(ActionKey::multi(table, &id))?;
        let schemas = self.resolution_schemas(Some(table), credential).await?;
        let groups = self.resolver.group_by_target(Some(table), &updates, &schemas)?;

        let mut written = Vec::with_capacity(groups.len());
        for (target, patch) in groups {
            self.dispatcher
                .update(credential, &target, id.clone(), patch.clone())
                .await?;
            if self.discard_if_closed(&target) {
                return Ok(MutationOutcome::Discarded);
            }
            self.reconcile_update(&target, &id, &patch);
            if target != table {
                self.reconcile_joined(table, &id, &patch);
            }
            written.push(target);
        }
        Ok(MutationOutcome::Applied(written))
    }

    /// Create one record and append it to its table's collection.
    pub async fn handle_add(
        &self,
        credential: &Credential,
        table: &str,
        record: Record,
    ) -> SyncResult<MutationOutcome<Record>> {
        let result = self.add(credential, table, record).await;
        self.surface(result)
    }

    async fn add(
        &self,
        credential: &Credential,
        table: &str,
        record: Record,
    ) -> SyncResult<MutationOutcome<Record>> {
        self.ensure_open()?;
        let _guard = self.begin(ActionKey::create(table))?;
        let created = self.dispatcher.create(credential, table, record).await?;
        if self.discard_if_closed(table) {
            return Ok(MutationOutcome::Discarded);
        }
        let id_field = self.id_field(table);
        let inserted = created.clone();
        self.store.update(self.state_key(table), |current| {
            apply_insertion(current, &id_field, inserted)
        });
        Ok(MutationOutcome::Applied(created))
    }

    pub async fn handle_delete(
        &self,
        credential: &Credential,
        table: &str,
        id: RecordId,
    ) -> SyncResult<MutationOutcome<()>> {
        let result = self.delete(credential, table, id).await;
        self.surface(result)
    }

    async fn delete(
        &self,
        credential: &Credential,
        table: &str,
        id: RecordId,
    ) -> SyncResult<MutationOutcome<()>> {
        self.ensure_open()?;
        let _guard = self.begin(ActionKey::delete(table, &id))?;
        self.dispatcher.delete(credential, table, id.clone()).await?;
        if self.discard_if_closed(table) {
            return Ok(MutationOutcome::Discarded);
        }
        let id_field = self.id_field(table);
        self.store.update_existing(self.state_key(table), |current| {
            apply_removal(current, &id_field, &id)
        });
        Ok(MutationOutcome::Applied(()))
    }

    /// Create many records. Confirmed records are appended in submission
    /// order; in sequential mode a partial failure is reported, not raised.
    pub async fn handle_bulk_add(
        &self,
        credential: &Credential,
        table: &str,
        records: Collection,
    ) -> SyncResult<MutationOutcome<BulkCreateReport>> {
        let result = self.bulk_add(credential, table, records).await;
        self.surface(result)
    }

    async fn bulk_add(
        &self,
        credential: &Credential,
        table: &str,
        records: Collection,
    ) -> SyncResult<MutationOutcome<BulkCreateReport>> {
        self.ensure_open()?;
        let _guard = self.begin(ActionKey::bulk_create(table))?;
        let report = self.dispatcher.bulk_create(credential, table, records).await?;
        if self.discard_if_closed(table) {
            return Ok(MutationOutcome::Discarded);
        }
        let id_field = self.id_field(table);
        let created = report.created();
        self.store.update(self.state_key(table), |current| {
            apply_bulk_insertion(current, &id_field, created)
        });
        if !report.is_complete() {
            self.notify(Notification::new(
                NotificationLevel::Warning,
                format!(
                    "{} of {} {} records could not be created",
                    report.failed(),
                    report.items.len(),
                    table
                ),
            ));
        }
        Ok(MutationOutcome::Applied(report))
    }

    // ------------------------------------------------------------------
    // Tabs
    // ------------------------------------------------------------------

    /// Load a tab's collections. A failure marks only that tab and raises a
    /// notification offering a retry.
    pub async fn load_tab_data(
        &self,
        tab: Tab,
        credential: Option<&Credential>,
    ) -> SyncResult<LoadOutcome> {
        self.ensure_open()?;
        match self.orchestrator.load_tab_data(tab, credential).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let message = match self.orchestrator.tab_state(tab) {
                    TabLoadState::Errored(message) => message,
                    _ => err.user_message(),
                };
                self.notify(
                    Notification::new(NotificationLevel::Error, message)
                        .with_action(NotificationAction::Retry(tab)),
                );
                Err(err)
            }
        }
    }

    pub fn reset_data(&self) {
        self.orchestrator.reset_data();
    }

    /// Stop the schema cache and refuse further work. Writes still in
    /// flight complete remotely but are not reconciled.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.schemas.registry().dispose().await;
        tracing::info!(in_flight = self.tracker.len(), "Sync session closed");
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn collection(&self, state_key: &str) -> Collection {
        self.store.get(state_key)
    }

    pub fn store(&self) -> &CollectionStore {
        &self.store
    }

    pub fn tab_state(&self, tab: Tab) -> TabLoadState {
        self.orchestrator.tab_state(tab)
    }

    pub fn tab_states(&self) -> BTreeMap<Tab, TabLoadState> {
        self.orchestrator.tab_states()
    }

    pub fn tab_error(&self) -> Option<String> {
        self.orchestrator.error()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.snapshot()
    }

    pub fn drain_notifications(&self) -> Vec<Notification> {
        self.notifications.drain()
    }

    pub fn tracker(&self) -> &ActionTracker {
        &self.tracker
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.schemas.registry().stats()
    }

    pub fn catalog(&self) -> &TableCatalog {
        &self.catalog
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_open(&self) -> SyncResult<()> {
        if self.is_closed() {
            Err(SyncError::Disposed)
        } else {
            Ok(())
        }
    }

    fn begin(&self, key: ActionKey) -> SyncResult<ActionGuard> {
        self.tracker.start(key)
    }

    fn discard_if_closed(&self, table: &str) -> bool {
        let closed = self.is_closed();
        if closed {
            tracing::warn!(
                table,
                "Session closed while the write was in flight; result not reconciled"
            );
        }
        closed
    }

    fn state_key<'a>(&'a self, table: &'a str) -> &'a str {
        self.catalog
            .get(table)
            .map(|config| config.state_key.as_str())
            .unwrap_or(table)
    }

    fn id_field(&self, table: &str) -> String {
        self.catalog
            .get(table)
            .map(|config| config.id_field.clone())
            .unwrap_or_else(|| "id".to_string())
    }

    fn reconcile_update(&self, table: &str, id: &RecordId, patch: &Record) {
        let id_field = self.id_field(table);
        self.store.update_existing(self.state_key(table), |current| {
            apply_update(current, &id_field, id, patch)
        });
    }

    /// Mirror a write to another table into the context view's record,
    /// for columns that view already shows.
    fn reconcile_joined(&self, context: &str, id: &RecordId, patch: &Record) {
        let id_field = self.id_field(context);
        self.store.update_existing(self.state_key(context), |current| {
            let shown: Record = current
                .iter()
                .find(|record| record.get(&id_field).is_some_and(|v| id.matches(v)))
                .map(|record| {
                    patch
                        .iter()
                        .filter(|(column, _)| record.contains_key(*column))
                        .map(|(column, value)| (column.clone(), value.clone()))
                        .collect()
                })
                .unwrap_or_default();
            if shown.is_empty() {
                current.to_vec()
            } else {
                apply_update(current, &id_field, id, &shown)
            }
        });
    }

    fn notify(&self, notification: Notification) {
        self.notifications.push(notification);
    }

    fn surface<T>(&self, result: SyncResult<T>) -> SyncResult<T> {
        if let Err(err) = &result {
            let level = match err {
                SyncError::ActionInProgress { .. } | SyncError::Validation(_) => {
                    NotificationLevel::Warning
                }
                _ => NotificationLevel::Error,
            };
            tracing::warn!(error = %err, "Sync operation failed");
            self.notify(Notification::new(level, err.user_message()));
        }
        result
    }
}
