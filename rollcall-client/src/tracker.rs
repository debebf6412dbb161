//! In-flight action tracking.
//!
//! [`ActionTracker::start`] hands out an [`ActionGuard`]; the key stays in
//! progress exactly as long as the guard lives. Dropping the guard ends the
//! action on every exit path, including an early `?`, a panic unwinding
//! through the caller, or the caller's future being dropped mid-await.

use rollcall_core::{ActionKey, RecordId, SyncError, SyncResult};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Default)]
pub struct ActionTracker {
    keys: Arc<Mutex<HashSet<ActionKey>>>,
}

impl ActionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<ActionKey>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `key` in progress. Fails if it already is.
    pub fn start(&self, key: ActionKey) -> SyncResult<ActionGuard> {
        if !self.lock().insert(key.clone()) {
            tracing::debug!(action = %key, "Rejected duplicate action");
            return Err(SyncError::ActionInProgress { key: key.to_string() });
        }
        tracing::trace!(action = %key, "Action started");
        Ok(ActionGuard {
            tracker: self.clone(),
            key,
        })
    }

    pub fn is_in_progress(&self, key: &ActionKey) -> bool {
        self.lock().contains(key)
    }

    /// Keys in progress, sorted by their rendered form.
    pub fn in_progress(&self) -> Vec<ActionKey> {
        let mut keys: Vec<ActionKey> = self.lock().iter().cloned().collect();
        keys.sort_by_key(|k| k.to_string());
        keys
    }

    /// Whether any action writes to this entity.
    pub fn is_entity_busy(&self, entity_kind: &str, id: &RecordId) -> bool {
        self.lock().iter().any(|key| key.touches(entity_kind, id))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn finish(&self, key: &ActionKey) {
        self.lock().remove(key);
        tracing::trace!(action = %key, "Action finished");
    }
}

/// Ends its action when dropped.
#[derive(Debug)]
#[must_use = "the action ends as soon as the guard is dropped"]
pub struct ActionGuard {
    tracker: ActionTracker,
    key: ActionKey,
}

impl ActionGuard {
    pub fn key(&self) -> &ActionKey {
        &self.key
    }
}

impl Drop for ActionGuard {
    fn drop(&mut self) {
        self.tracker.finish(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_releases_key() {
        let tracker = ActionTracker::new();
        let key = ActionKey::field("classes", &RecordId::from(5), "cost");
        {
            let guard = tracker.start(key.clone()).unwrap();
            assert_eq!(guard.key(), &key);
            assert!(tracker.is_in_progress(&key));
        }
        assert!(!tracker.is_in_progress(&key));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_duplicate_start_is_rejected() {
        let tracker = ActionTracker::new();
        let key = ActionKey::multi("teachers", &RecordId::from(7));
        let _guard = tracker.start(key.clone()).unwrap();
        let err = tracker.start(key).unwrap_err();
        assert_eq!(
            err,
            SyncError::ActionInProgress {
                key: "teachers-7-multi".into()
            }
        );
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_distinct_fields_run_together() {
        let tracker = ActionTracker::new();
        let id = RecordId::from(5);
        let _a = tracker.start(ActionKey::field("classes", &id, "cost")).unwrap();
        let _b = tracker.start(ActionKey::field("classes", &id, "teacher_id")).unwrap();
        assert_eq!(tracker.len(), 2);
        assert!(tracker.is_entity_busy("classes", &id));
        assert!(!tracker.is_entity_busy("classes", &RecordId::from(6)));
        let rendered: Vec<String> = tracker.in_progress().iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["classes-5-cost", "classes-5-teacher_id"]);
    }

    #[test]
    fn test_key_released_on_panic() {
        let tracker = ActionTracker::new();
        let key = ActionKey::delete("grades", &RecordId::from(2));
        let t = tracker.clone();
        let k = key.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = t.start(k).unwrap();
            panic!("handler blew up");
        });
        assert!(result.is_err());
        assert!(!tracker.is_in_progress(&key));
    }

    #[tokio::test]
    async fn test_key_released_when_future_is_dropped() {
        let tracker = ActionTracker::new();
        let key = ActionKey::create("classes");
        let t = tracker.clone();
        let k = key.clone();
        let task = tokio::spawn(async move {
            let _guard = t.start(k)?;
            std::future::pending::<()>().await;
            Ok::<_, SyncError>(())
        });
        tokio::task::yield_now().await;
        assert!(tracker.is_in_progress(&key));

        task.abort();
        let _ = task.await;
        assert!(!tracker.is_in_progress(&key));
    }
}
