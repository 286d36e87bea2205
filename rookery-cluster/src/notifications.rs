//! # View Notifications
//!
//! Fan-out of cluster view updates to registered listeners.
//!
//! The manager is the single writer; listeners observe events in
//! publish order through their own unbounded channel, so a slow or
//! dropped listener never blocks the others.

use std::fmt;

use parking_lot::RwLock;
use rookery_core::ClusterView;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Event delivered to subscribers.
#[derive(Debug, Clone)]
pub enum ClusterEvent {
    /// A session was established; carries the freshly computed view.
    Connected(ClusterView),
    /// The session lost contact; the last view is stale until the next
    /// `Connected`.
    Disconnected,
    /// The view was refreshed while connected. Delivered even when the
    /// refreshed view is identical, so listeners may treat it as a
    /// liveness pulse.
    NodesChanged(ClusterView),
    /// Terminal event; nothing follows it.
    Shutdown,
}

/// Unique identifier for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered listener's receiving half.
pub struct Subscription {
    pub id: ListenerId,
    pub events: mpsc::UnboundedReceiver<ClusterEvent>,
}

/// Counters over the notification fan-out.
#[derive(Debug, Clone, Default)]
pub struct NotificationStats {
    pub events_published: u64,
    pub listeners: usize,
    pub dropped_deliveries: u64,
}

struct ListenerTable {
    // registration order is part of the delivery contract
    entries: Vec<(ListenerId, mpsc::UnboundedSender<ClusterEvent>)>,
    latest: Option<ClusterView>,
    shut_down: bool,
}

/// Tracks subscribed listeners and the latest published view.
pub struct NotificationManager {
    inner: RwLock<ListenerTable>,
    stats: RwLock<NotificationStats>,
}

impl NotificationManager {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(ListenerTable {
                entries: Vec::new(),
                latest: None,
                shut_down: false,
            }),
            stats: RwLock::new(NotificationStats::default()),
        }
    }

    /// Registers a listener. If a view is currently known, a
    /// `Connected` event carrying it is queued for the new listener
    /// before this returns, so late subscribers start from the current
    /// state. After shutdown the subscription's channel is already
    /// closed.
    pub fn subscribe(&self) -> Subscription {
        let id = ListenerId::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut inner = self.inner.write();
        if !inner.shut_down {
            if let Some(view) = &inner.latest {
                let _ = tx.send(ClusterEvent::Connected(view.clone()));
            }
            inner.entries.push((id, tx));
            debug!(listener = %id, "listener registered");
        }

        Subscription { id, events: rx }
    }

    /// Removes a listener. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: ListenerId) {
        let mut inner = self.inner.write();
        let before = inner.entries.len();
        inner.entries.retain(|(listener, _)| *listener != id);
        if inner.entries.len() < before {
            debug!(listener = %id, "listener removed");
        }
    }

    /// Fans `event` out to all listeners in registration order. A
    /// closed listener channel is skipped and counted; it never stops
    /// delivery to the rest. Publishes after `Shutdown` are ignored.
    pub fn publish(&self, event: ClusterEvent) {
        let mut inner = self.inner.write();
        if inner.shut_down {
            debug!("ignoring publish after shutdown");
            return;
        }

        match &event {
            ClusterEvent::Connected(view) | ClusterEvent::NodesChanged(view) => {
                inner.latest = Some(view.clone());
            }
            ClusterEvent::Shutdown => {
                inner.shut_down = true;
            }
            ClusterEvent::Disconnected => {}
        }

        let mut dropped = 0u64;
        for (id, tx) in &inner.entries {
            if tx.send(event.clone()).is_err() {
                debug!(listener = %id, "dropping event for closed listener");
                dropped += 1;
            }
        }

        let mut stats = self.stats.write();
        stats.events_published += 1;
        stats.dropped_deliveries += dropped;
    }

    /// The most recently published view, if any.
    pub fn latest_view(&self) -> Option<ClusterView> {
        self.inner.read().latest.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn stats(&self) -> NotificationStats {
        let listeners = self.inner.read().entries.len();
        let stats = self.stats.read();
        NotificationStats {
            events_published: stats.events_published,
            listeners,
            dropped_deliveries: stats.dropped_deliveries,
        }
    }
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rookery_core::Node;
    use std::collections::HashMap;

    fn view_of(ids: &[i32]) -> ClusterView {
        let nodes: HashMap<i32, Node> = ids
            .iter()
            .map(|&id| {
                (
                    id,
                    Node::new(id, format!("localhost:{}", 31313 + id), vec![]).unwrap(),
                )
            })
            .collect();
        ClusterView::new(nodes)
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let manager = NotificationManager::new();
        let mut sub = manager.subscribe();

        manager.publish(ClusterEvent::Connected(view_of(&[1])));
        manager.publish(ClusterEvent::NodesChanged(view_of(&[1, 2])));
        manager.publish(ClusterEvent::Disconnected);

        assert!(matches!(
            sub.events.recv().await.unwrap(),
            ClusterEvent::Connected(view) if view.len() == 1
        ));
        assert!(matches!(
            sub.events.recv().await.unwrap(),
            ClusterEvent::NodesChanged(view) if view.len() == 2
        ));
        assert!(matches!(
            sub.events.recv().await.unwrap(),
            ClusterEvent::Disconnected
        ));
    }

    #[tokio::test]
    async fn late_subscriber_receives_current_view() {
        let manager = NotificationManager::new();
        manager.publish(ClusterEvent::Connected(view_of(&[1, 2])));

        let mut sub = manager.subscribe();
        assert!(matches!(
            sub.events.recv().await.unwrap(),
            ClusterEvent::Connected(view) if view.len() == 2
        ));
    }

    #[tokio::test]
    async fn subscriber_before_any_view_gets_nothing() {
        let manager = NotificationManager::new();
        let mut sub = manager.subscribe();
        assert!(sub.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_listener_does_not_block_the_rest() {
        let manager = NotificationManager::new();
        let first = manager.subscribe();
        let mut second = manager.subscribe();

        drop(first.events);
        manager.publish(ClusterEvent::Connected(view_of(&[1])));

        assert!(matches!(
            second.events.recv().await.unwrap(),
            ClusterEvent::Connected(_)
        ));
        assert_eq!(manager.stats().dropped_deliveries, 1);
    }

    #[tokio::test]
    async fn shutdown_is_terminal() {
        let manager = NotificationManager::new();
        let mut sub = manager.subscribe();

        manager.publish(ClusterEvent::Shutdown);
        manager.publish(ClusterEvent::Connected(view_of(&[1])));

        assert!(matches!(
            sub.events.recv().await.unwrap(),
            ClusterEvent::Shutdown
        ));
        assert!(sub.events.try_recv().is_err());

        // a subscription taken after shutdown is already closed
        let mut late = manager.subscribe();
        assert!(late.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let manager = NotificationManager::new();
        let sub = manager.subscribe();
        assert_eq!(manager.listener_count(), 1);

        manager.unsubscribe(sub.id);
        manager.unsubscribe(sub.id);
        assert_eq!(manager.listener_count(), 0);
    }
}
