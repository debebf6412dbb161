//! Shared in-memory collections keyed by state key.

use rollcall_core::{Collection, Record};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Cheap to clone; every clone sees the same collections.
#[derive(Debug, Clone, Default)]
pub struct CollectionStore {
    collections: Arc<Mutex<BTreeMap<String, Collection>>>,
}

impl CollectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Collection>> {
        self.collections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the collection; empty when never loaded.
    pub fn get(&self, state_key: &str) -> Collection {
        self.lock().get(state_key).cloned().unwrap_or_default()
    }

    pub fn contains(&self, state_key: &str) -> bool {
        self.lock().contains_key(state_key)
    }

    /// Replace the collection wholesale.
    pub fn replace(&self, state_key: &str, collection: Collection) {
        self.lock().insert(state_key.to_string(), collection);
    }

    /// Swap the collection for `f(current)` under one critical section.
    pub fn update<F>(&self, state_key: &str, f: F)
    where
        F: FnOnce(&[Record]) -> Collection,
    {
        let mut collections = self.lock();
        let current = collections.get(state_key).map(Vec::as_slice).unwrap_or(&[]);
        let next = f(current);
        collections.insert(state_key.to_string(), next);
    }

    /// Like [`Self::update`], but a collection that was never loaded stays
    /// absent. Returns whether `f` ran.
    pub fn update_existing<F>(&self, state_key: &str, f: F) -> bool
    where
        F: FnOnce(&[Record]) -> Collection,
    {
        let mut collections = self.lock();
        match collections.get_mut(state_key) {
            Some(current) => {
                *current = f(current);
                true
            }
            None => false,
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Record count per collection.
    pub fn sizes(&self) -> BTreeMap<String, usize> {
        self.lock().iter().map(|(k, v)| (k.clone(), v.len())).collect()
    }
}
