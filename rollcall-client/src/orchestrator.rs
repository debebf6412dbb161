//! Lazy, per-tab loading of the collections an admin view needs.
//!
//! Each tab walks `NotLoaded -> Loading -> {Loaded, Errored}`. Only
//! [`AdminOrchestrator::reset_data`] moves a tab back to `NotLoaded`; there
//! is no automatic retry. A reset bumps a generation counter, and a load
//! that started under an older generation drops its results on arrival.

use crate::store::CollectionStore;
use crate::tabs::Tab;
use futures_util::future::try_join_all;
use rollcall_core::{Credential, Filters, SyncResult, TableCatalog, TableReader};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum TabLoadState {
    #[default]
    NotLoaded,
    Loading,
    Loaded,
    Errored(String),
}

/// What a call to [`AdminOrchestrator::load_tab_data`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    AlreadyLoaded,
    /// Another call is loading the tab.
    InProgress,
    /// Results arrived after a reset and were dropped.
    Discarded,
    /// An earlier load failed. Only a reset allows another attempt.
    Errored,
}

#[derive(Debug, Default)]
struct TabTable {
    states: BTreeMap<Tab, TabLoadState>,
    generation: u64,
    error: Option<String>,
}

impl TabTable {
    fn state(&self, tab: Tab) -> TabLoadState {
        self.states.get(&tab).cloned().unwrap_or_default()
    }
}

/// Returns a tab to `NotLoaded` if its load future is dropped before the
/// reads settle, so the next call can start over.
struct LoadingGuard<'a> {
    tabs: &'a Mutex<TabTable>,
    tab: Tab,
    generation: u64,
    armed: bool,
}

impl LoadingGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut table = self.tabs.lock().unwrap_or_else(PoisonError::into_inner);
        if table.generation == self.generation && table.state(self.tab) == TabLoadState::Loading {
            table.states.remove(&self.tab);
            tracing::debug!(tab = %self.tab, "Tab load cancelled");
        }
    }
}

pub struct AdminOrchestrator<R> {
    reader: Arc<R>,
    catalog: TableCatalog,
    store: CollectionStore,
    tabs: Mutex<TabTable>,
}

impl<R: TableReader> AdminOrchestrator<R> {
    pub fn new(reader: Arc<R>, catalog: TableCatalog, store: CollectionStore) -> Self {
        Self {
            reader,
            catalog,
            store,
            tabs: Mutex::new(TabTable::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TabTable> {
        self.tabs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn store(&self) -> &CollectionStore {
        &self.store
    }

    pub fn tab_state(&self, tab: Tab) -> TabLoadState {
        self.lock().state(tab)
    }

    /// State of every tab, in tab order.
    pub fn tab_states(&self) -> BTreeMap<Tab, TabLoadState> {
        let table = self.lock();
        Tab::all().iter().map(|tab| (*tab, table.state(*tab))).collect()
    }

    /// Message of the most recent failed load, until the next reset.
    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    fn state_key<'a>(&'a self, table: &'a str) -> &'a str {
        self.catalog
            .get(table)
            .map(|config| config.state_key.as_str())
            .unwrap_or(table)
    }

    /// Read every collection of `tab` concurrently and publish them together.
    ///
    /// On failure no collection is written, the tab becomes `Errored`, and
    /// the error is returned. Other tabs are unaffected. An `Errored` tab
    /// stays that way until [`Self::reset_data`].
    pub async fn load_tab_data(
        &self,
        tab: Tab,
        credential: Option<&Credential>,
    ) -> SyncResult<LoadOutcome> {
        let generation = {
            let mut table = self.lock();
            match table.state(tab) {
                TabLoadState::Loaded => return Ok(LoadOutcome::AlreadyLoaded),
                TabLoadState::Loading => {
                    tracing::debug!(tab = %tab, "Tab load already in progress");
                    return Ok(LoadOutcome::InProgress);
                }
                TabLoadState::Errored(_) => {
                    tracing::debug!(tab = %tab, "Tab errored; waiting for a reset");
                    return Ok(LoadOutcome::Errored);
                }
                TabLoadState::NotLoaded => {}
            }
            table.states.insert(tab, TabLoadState::Loading);
            table.generation
        };
        let mut guard = LoadingGuard {
            tabs: &self.tabs,
            tab,
            generation,
            armed: true,
        };

        tracing::info!(tab = %tab, tables = ?tab.collections(), "Loading tab");
        let filters = Filters::new();
        let reads = tab
            .collections()
            .iter()
            .map(|name| self.reader.read_table(name, &filters, credential));
        let result = try_join_all(reads).await;
        guard.disarm();

        let mut table = self.lock();
        if table.generation != generation {
            tracing::warn!(tab = %tab, "Discarding tab data loaded before a reset");
            return Ok(LoadOutcome::Discarded);
        }
        match result {
            Ok(collections) => {
                for (name, collection) in tab.collections().iter().zip(collections) {
                    self.store.replace(self.state_key(name), collection);
                }
                table.states.insert(tab, TabLoadState::Loaded);
                tracing::info!(tab = %tab, "Tab loaded");
                Ok(LoadOutcome::Loaded)
            }
            Err(err) => {
                let message =
                    format!("Failed to load {} data: {}", tab.title(), err.user_message());
                tracing::warn!(tab = %tab, error = %err, "Tab load failed");
                table.states.insert(tab, TabLoadState::Errored(message.clone()));
                table.error = Some(message);
                Err(err)
            }
        }
    }

    /// Clear the error and return every tab to `NotLoaded`. Collections
    /// keep their contents until the next load replaces them.
    pub fn reset_data(&self) {
        let mut table = self.lock();
        table.generation += 1;
        table.error = None;
        table.states.clear();
        tracing::debug!(generation = table.generation, "Tab state reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::SyncError;
    use rollcall_test_utils::fixtures::school_backend;
    use rollcall_test_utils::MockBackend;
    use std::time::Duration;

    fn orchestrator(backend: &Arc<MockBackend>) -> AdminOrchestrator<MockBackend> {
        AdminOrchestrator::new(
            Arc::clone(backend),
            TableCatalog::builtin(),
            CollectionStore::new(),
        )
    }

    #[tokio::test]
    async fn test_second_load_is_a_no_op() {
        let backend = Arc::new(school_backend());
        let orch = orchestrator(&backend);

        assert_eq!(orch.load_tab_data(Tab::Classes, None).await, Ok(LoadOutcome::Loaded));
        assert_eq!(orch.load_tab_data(Tab::Classes, None).await, Ok(LoadOutcome::AlreadyLoaded));
        for table in Tab::Classes.collections() {
            assert_eq!(backend.read_count(table), 1, "{table}");
        }
        assert_eq!(orch.store().get("classes").len(), 3);
    }

    #[tokio::test]
    async fn test_failure_marks_only_that_tab() {
        let backend = Arc::new(school_backend());
        let orch = orchestrator(&backend);
        orch.load_tab_data(Tab::Courses, None).await.unwrap();

        backend.fail_reads("payments", SyncError::Transport("timeout".into()));
        assert!(orch.load_tab_data(Tab::Payments, None).await.is_err());

        assert!(matches!(
            orch.tab_state(Tab::Payments),
            TabLoadState::Errored(ref m) if m.contains("Payments")
        ));
        assert_eq!(orch.tab_state(Tab::Courses), TabLoadState::Loaded);
        assert!(orch.error().is_some());
        assert!(!orch.store().contains("payments"));
        assert!(!orch.store().contains("users"), "partial results are not published");
    }

    #[tokio::test]
    async fn test_errored_tab_waits_for_reset() {
        let backend = Arc::new(school_backend());
        let orch = orchestrator(&backend);
        backend.fail_reads("quizzes", SyncError::Transport("timeout".into()));
        assert!(orch.load_tab_data(Tab::Quizzes, None).await.is_err());
        let reads = backend.read_count("quizzes");

        backend.clear_read_failures();
        assert_eq!(orch.load_tab_data(Tab::Quizzes, None).await, Ok(LoadOutcome::Errored));
        assert_eq!(backend.read_count("quizzes"), reads);
        assert!(matches!(orch.tab_state(Tab::Quizzes), TabLoadState::Errored(_)));

        orch.reset_data();
        assert_eq!(orch.load_tab_data(Tab::Quizzes, None).await, Ok(LoadOutcome::Loaded));
        assert_eq!(orch.tab_state(Tab::Quizzes), TabLoadState::Loaded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_load_can_be_retried() {
        let backend = Arc::new(school_backend());
        backend.set_latency(Duration::from_millis(100));
        let orch = orchestrator(&backend);

        let cancelled = tokio::time::timeout(
            Duration::from_millis(10),
            orch.load_tab_data(Tab::Classes, None),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(orch.tab_state(Tab::Classes), TabLoadState::NotLoaded);

        assert_eq!(orch.load_tab_data(Tab::Classes, None).await, Ok(LoadOutcome::Loaded));
        assert_eq!(orch.store().get("classes").len(), 3);
    }

    #[tokio::test]
    async fn test_reset_reloads_and_keeps_data() {
        let backend = Arc::new(school_backend());
        let orch = orchestrator(&backend);
        orch.load_tab_data(Tab::Teachers, None).await.unwrap();

        orch.reset_data();
        assert_eq!(orch.tab_state(Tab::Teachers), TabLoadState::NotLoaded);
        assert_eq!(orch.store().get("teachers").len(), 1);

        orch.load_tab_data(Tab::Teachers, None).await.unwrap();
        assert_eq!(backend.read_count("teachers"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_after_reset_is_discarded() {
        let backend = Arc::new(school_backend());
        backend.set_latency(Duration::from_millis(100));
        let orch = Arc::new(orchestrator(&backend));

        let pending = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.load_tab_data(Tab::Students, None).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(orch.tab_state(Tab::Students), TabLoadState::Loading);
        assert_eq!(orch.load_tab_data(Tab::Students, None).await, Ok(LoadOutcome::InProgress));

        orch.reset_data();
        assert_eq!(pending.await.unwrap(), Ok(LoadOutcome::Discarded));
        assert_eq!(orch.tab_state(Tab::Students), TabLoadState::NotLoaded);
        assert!(!orch.store().contains("students"));
    }

    #[test]
    fn test_state_serializes_with_message() {
        let value = serde_json::to_value(TabLoadState::Errored("boom".into())).unwrap();
        assert_eq!(value, serde_json::json!({"state": "errored", "message": "boom"}));
        let value = serde_json::to_value(TabLoadState::Loaded).unwrap();
        assert_eq!(value, serde_json::json!({"state": "loaded"}));
    }
}
