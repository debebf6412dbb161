//! User-visible notifications raised by the session.

use crate::tabs::Tab;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    /// Reset and load the tab again.
    Retry(Tab),
    Dismiss,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub action: Option<NotificationAction>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            action: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.action = Some(action);
        self
    }
}

/// Append-only queue drained by whoever renders notifications.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    items: Mutex<Vec<Notification>>,
}

impl NotificationQueue {
    pub fn push(&self, notification: Notification) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.items.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_empties_queue() {
        let queue = NotificationQueue::default();
        queue.push(Notification::new(NotificationLevel::Error, "boom"));
        queue.push(
            Notification::new(NotificationLevel::Error, "tab failed")
                .with_action(NotificationAction::Retry(Tab::Classes)),
        );
        assert_eq!(queue.len(), 2);

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[1].action, Some(NotificationAction::Retry(Tab::Classes)));
        assert!(queue.is_empty());
    }
}
