//! Ready-made fixture wiring a cluster client to the in-memory store.

use std::time::Duration;

use bytes::Bytes;
use rookery_cluster::{ClusterClient, ClusterConfig, ClusterEvent, ClusterHandle, Subscription};
use rookery_core::store::{CreateMode, SessionState};
use rookery_core::{codec, ClusterPaths, ClusterView, Node};
use tokio::time::timeout;

use crate::store::InMemoryConnector;

/// A started cluster manager over an [`InMemoryConnector`], with the
/// path layout at hand for seeding the tree.
pub struct ClusterHarness {
    pub connector: InMemoryConnector,
    pub client: ClusterClient,
    pub handle: ClusterHandle,
    pub paths: ClusterPaths,
}

impl ClusterHarness {
    pub async fn start() -> Self {
        let config = ClusterConfig::new("search", "localhost:2181")
            .with_request_timeout(Duration::from_secs(2));
        Self::with_config(config).await
    }

    pub async fn with_config(config: ClusterConfig) -> Self {
        let connector = InMemoryConnector::new();
        let paths = ClusterPaths::new(&config.service_name).unwrap();
        let (client, handle) = ClusterClient::start(config, connector.clone())
            .await
            .unwrap();

        // the manager opens its first session asynchronously; session
        // events fired before the watcher is registered would be lost
        for _ in 0..200 {
            if connector.sessions_opened() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(connector.sessions_opened() > 0, "store session never opened");

        Self {
            connector,
            client,
            handle,
            paths,
        }
    }

    /// Writes a membership entry as if another process registered it.
    pub fn seed_member(&self, node: &Node) {
        self.connector.seed(
            &self.paths.member(node.id),
            codec::encode(node),
            CreateMode::Persistent,
        );
    }

    /// Writes an availability entry as if another process marked the
    /// node available.
    pub fn seed_available(&self, id: i32) {
        self.connector.seed(
            &self.paths.availability(id),
            Bytes::new(),
            CreateMode::Ephemeral,
        );
    }

    /// Replaces the whole availability set in one step, firing its
    /// parent watches once.
    pub fn set_available(&self, ids: &[i32]) {
        let names: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        self.connector
            .set_children(self.paths.available(), &names, CreateMode::Ephemeral);
    }

    /// Delivers a session state change to the manager.
    pub fn fire_session(&self, state: SessionState) {
        self.connector.fire_session(state);
    }

    pub async fn shutdown(self) {
        self.client.shutdown();
        let _ = self.handle.manager.await;
    }
}

/// Awaits the next event on a subscription, failing the test after two
/// seconds of silence.
pub async fn next_event(sub: &mut Subscription) -> ClusterEvent {
    timeout(Duration::from_secs(2), sub.events.recv())
        .await
        .expect("timed out waiting for a cluster event")
        .expect("event stream ended unexpectedly")
}

/// Asserts that no event is pending on the subscription.
pub async fn assert_quiet(sub: &mut Subscription) {
    tokio::time::sleep(Duration::from_millis(100)).await;
    if let Ok(event) = sub.events.try_recv() {
        panic!("unexpected event pending: {event:?}");
    }
}

/// The `(id, available)` pairs of a view, sorted by id.
pub fn availabilities(view: &ClusterView) -> Vec<(i32, bool)> {
    view.to_sorted_vec()
        .iter()
        .map(|node| (node.id, node.available))
        .collect()
}
