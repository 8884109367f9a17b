//! Notification state fed by the stream and the REST snapshot.
//!
//! [`NotificationStore`] keeps the unread count and the last domain event in
//! a watch channel so UI code can render from [`NotificationStore::watch`].
//! The stream is at-most-once across reconnects; [`NotificationStore::refresh`]
//! reconciles against the API.

mod api;

pub use api::{ApiError, Notification, NotificationsApi};

use crate::stream::{EventSubscriber, StreamEvent};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Unread count and the most recent domain event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationSummary {
    /// Unread notifications
    pub unread_count: u64,
    /// Last domain event received
    pub last_event: Option<StreamEvent>,
}

/// Shared notification state.
///
/// Cloning is cheap; clones observe and mutate the same state.
#[derive(Debug, Clone)]
pub struct NotificationStore {
    state: Arc<watch::Sender<NotificationSummary>>,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (state, _) = watch::channel(NotificationSummary::default());
        Self {
            state: Arc::new(state),
        }
    }

    /// Current summary.
    pub fn summary(&self) -> NotificationSummary {
        self.state.borrow().clone()
    }

    /// Current unread count.
    pub fn unread_count(&self) -> u64 {
        self.state.borrow().unread_count
    }

    /// Last domain event.
    pub fn last_event(&self) -> Option<StreamEvent> {
        self.state.borrow().last_event.clone()
    }

    /// Watch the summary.
    pub fn watch(&self) -> watch::Receiver<NotificationSummary> {
        self.state.subscribe()
    }

    /// Set the unread count from a REST snapshot.
    pub fn hydrate(&self, unread_count: u64) {
        self.state.send_if_modified(|summary| {
            let changed = summary.unread_count != unread_count;
            summary.unread_count = unread_count;
            changed
        });
    }

    /// Apply a stream event. Returns whether the summary changed.
    ///
    /// Domain events become `last_event`. A payload carrying an integer
    /// `unread_count` sets the count; otherwise the count goes up by one.
    /// Control events are ignored.
    pub fn apply(&self, event: &StreamEvent) -> bool {
        let StreamEvent::Message { payload, .. } = event else {
            return false;
        };
        let reported = reported_unread_count(payload);
        self.state.send_modify(|summary| {
            summary.unread_count = match reported {
                Some(count) => count,
                None => summary.unread_count.saturating_add(1),
            };
            summary.last_event = Some(event.clone());
        });
        true
    }

    /// Local bookkeeping after every notification was marked read.
    pub fn acknowledge_all(&self) {
        self.hydrate(0);
    }

    /// Local bookkeeping after one unread notification was marked read or
    /// deleted.
    pub fn acknowledge_one(&self) {
        self.state.send_if_modified(|summary| {
            if summary.unread_count == 0 {
                return false;
            }
            summary.unread_count -= 1;
            true
        });
    }

    /// Re-fetch the unread count.
    pub async fn refresh(&self, api: &NotificationsApi) -> Result<u64, ApiError> {
        let count = api.unread_count().await?;
        self.hydrate(count);
        Ok(count)
    }

    /// Mark everything read through the API, then update local state.
    pub async fn mark_all_read(&self, api: &NotificationsApi) -> Result<(), ApiError> {
        api.mark_all_read().await?;
        self.acknowledge_all();
        Ok(())
    }

    /// Mark one notification read through the API, then update local state.
    pub async fn mark_read(&self, api: &NotificationsApi, id: &str) -> Result<(), ApiError> {
        api.mark_read(id).await?;
        self.acknowledge_one();
        Ok(())
    }

    /// Delete one notification through the API, then update local state.
    ///
    /// Only an unread notification lowers the count.
    pub async fn delete(
        &self,
        api: &NotificationsApi,
        id: &str,
        was_unread: bool,
    ) -> Result<(), ApiError> {
        api.delete(id).await?;
        if was_unread {
            self.acknowledge_one();
        }
        Ok(())
    }

    /// Feed stream events into the store until the client goes away.
    pub fn attach(&self, subscriber: EventSubscriber) -> JoinHandle<()> {
        let store = self.clone();
        let mut subscriber = subscriber;
        tokio::spawn(async move {
            while let Some(event) = subscriber.recv().await {
                store.apply(&event);
            }
        })
    }

    /// Like [`attach`](Self::attach), and re-fetch the count from `api`
    /// after every `connected` event to cover events missed while
    /// disconnected.
    pub fn attach_reconciling(
        &self,
        subscriber: EventSubscriber,
        api: NotificationsApi,
    ) -> JoinHandle<()> {
        let store = self.clone();
        let mut subscriber = subscriber;
        tokio::spawn(async move {
            while let Some(event) = subscriber.recv().await {
                if matches!(event, StreamEvent::Connected { .. }) {
                    if let Err(err) = store.refresh(&api).await {
                        tracing::warn!(error = %err, "Failed to reconcile unread count");
                    }
                } else {
                    store.apply(&event);
                }
            }
        })
    }
}

fn reported_unread_count(payload: &Value) -> Option<u64> {
    payload
        .get("unread_count")
        .or_else(|| payload.get("unreadCount"))
        .and_then(Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ReadyState;
    use serde_json::json;

    fn message(payload: Value) -> StreamEvent {
        StreamEvent::Message {
            event_type: "message".into(),
            payload,
        }
    }

    #[test]
    fn test_domain_event_increments() {
        let store = NotificationStore::new();
        store.hydrate(2);
        assert!(store.apply(&message(json!({"type": "comment"}))));
        assert_eq!(store.unread_count(), 3);
        assert_eq!(store.last_event(), Some(message(json!({"type": "comment"}))));
    }

    #[test]
    fn test_reported_count_replaces() {
        let store = NotificationStore::new();
        store.hydrate(10);
        store.apply(&message(json!({"unread_count": 4})));
        assert_eq!(store.unread_count(), 4);
        store.apply(&message(json!({"unreadCount": 0})));
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn test_non_integer_count_increments() {
        let store = NotificationStore::new();
        store.apply(&message(json!({"unread_count": "many"})));
        store.apply(&message(json!({"unread_count": -1})));
        assert_eq!(store.unread_count(), 2);
    }

    #[test]
    fn test_control_events_ignored() {
        let store = NotificationStore::new();
        store.hydrate(5);
        for event in [
            StreamEvent::Connected { payload: json!({}) },
            StreamEvent::Heartbeat,
            StreamEvent::ReconnectRequested,
            StreamEvent::Error {
                ready_state: ReadyState::Closed,
            },
        ] {
            assert!(!store.apply(&event));
        }
        assert_eq!(store.summary().unread_count, 5);
        assert_eq!(store.summary().last_event, None);
    }

    #[test]
    fn test_acknowledge_saturates() {
        let store = NotificationStore::new();
        store.hydrate(1);
        store.acknowledge_one();
        store.acknowledge_one();
        assert_eq!(store.unread_count(), 0);

        store.hydrate(7);
        store.acknowledge_all();
        assert_eq!(store.unread_count(), 0);
    }

    #[tokio::test]
    async fn test_attach_feeds_events() {
        let (tx, rx) = tokio::sync::broadcast::channel(8);
        let store = NotificationStore::new();
        let mut watch = store.watch();
        let task = store.attach(EventSubscriber::new(rx));

        tx.send(message(json!({"id": 1}))).unwrap();
        watch.changed().await.unwrap();
        assert_eq!(store.unread_count(), 1);

        drop(tx);
        task.await.unwrap();
    }
}
