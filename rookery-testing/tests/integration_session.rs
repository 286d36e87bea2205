//! Session lifecycle: disconnects, expiry, reconnects, shutdown.

use std::time::Duration;

use rookery_cluster::ClusterEvent;
use rookery_core::store::SessionState;
use rookery_core::{ClusterError, Node};
use rookery_testing::{assert_quiet, availabilities, next_event, ClusterHarness, FaultPoint};
use tokio::time::sleep;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

fn n1() -> Node {
    Node::new(1, "localhost:31313", vec![1, 2]).unwrap()
}

async fn wait_for_sessions(harness: &ClusterHarness, count: u64) {
    for _ in 0..200 {
        if harness.connector.sessions_opened() >= count {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {} sessions, saw {}",
        count,
        harness.connector.sessions_opened()
    );
}

#[tokio::test]
async fn expiry_opens_a_fresh_session() {
    init_tracing();
    let harness = ClusterHarness::start().await;
    let mut sub = harness.client.subscribe();

    harness.seed_member(&n1());
    harness.seed_available(1);
    harness.fire_session(SessionState::SyncConnected);
    next_event(&mut sub).await;
    assert_eq!(harness.connector.sessions_opened(), 1);

    harness.fire_session(SessionState::Expired);
    wait_for_sessions(&harness, 2).await;

    // disconnected until the fresh session reports in
    assert!(matches!(
        harness.client.add_node(n1()).await.unwrap_err(),
        ClusterError::NotConnected
    ));

    harness.fire_session(SessionState::SyncConnected);
    let event = next_event(&mut sub).await;
    let ClusterEvent::Connected(view) = event else {
        panic!("expected Connected after re-session, got {event:?}");
    };
    assert_eq!(availabilities(&view), vec![(1, true)]);

    harness.shutdown().await;
}

#[tokio::test]
async fn expiry_drops_this_sessions_availability_entries() {
    init_tracing();
    let harness = ClusterHarness::start().await;
    let mut sub = harness.client.subscribe();

    harness.seed_member(&n1());
    harness.fire_session(SessionState::SyncConnected);
    next_event(&mut sub).await;

    harness.client.mark_available(1).await.unwrap();
    next_event(&mut sub).await;
    next_event(&mut sub).await;
    assert!(harness.connector.has_entry(&harness.paths.availability(1)));

    harness.fire_session(SessionState::Expired);
    wait_for_sessions(&harness, 2).await;
    assert!(!harness.connector.has_entry(&harness.paths.availability(1)));

    harness.fire_session(SessionState::SyncConnected);
    let event = next_event(&mut sub).await;
    let ClusterEvent::Connected(view) = event else {
        panic!("expected Connected after re-session, got {event:?}");
    };
    assert_eq!(availabilities(&view), vec![(1, false)]);

    harness.shutdown().await;
}

#[tokio::test]
async fn disconnect_is_published_once_and_recovers() {
    init_tracing();
    let harness = ClusterHarness::start().await;
    let mut sub = harness.client.subscribe();

    harness.seed_member(&n1());
    harness.seed_available(1);
    harness.fire_session(SessionState::SyncConnected);
    next_event(&mut sub).await;

    harness.fire_session(SessionState::Disconnected);
    assert!(matches!(
        next_event(&mut sub).await,
        ClusterEvent::Disconnected
    ));

    // duplicate disconnects are absorbed
    harness.fire_session(SessionState::Disconnected);
    assert_quiet(&mut sub).await;

    assert!(matches!(
        harness.client.mark_available(1).await.unwrap_err(),
        ClusterError::NotConnected
    ));

    harness.fire_session(SessionState::SyncConnected);
    let event = next_event(&mut sub).await;
    let ClusterEvent::Connected(view) = event else {
        panic!("expected Connected after recovery, got {event:?}");
    };
    assert_eq!(availabilities(&view), vec![(1, true)]);

    harness.shutdown().await;
}

#[tokio::test]
async fn repeated_connected_reverifies_and_republishes() {
    init_tracing();
    let harness = ClusterHarness::start().await;
    let mut sub = harness.client.subscribe();

    harness.seed_member(&n1());
    harness.fire_session(SessionState::SyncConnected);
    let first = next_event(&mut sub).await;
    let ClusterEvent::Connected(first_view) = first else {
        panic!("expected Connected, got {first:?}");
    };

    harness.fire_session(SessionState::SyncConnected);
    let second = next_event(&mut sub).await;
    let ClusterEvent::Connected(second_view) = second else {
        panic!("expected Connected again, got {second:?}");
    };
    assert_eq!(availabilities(&first_view), availabilities(&second_view));
    assert_eq!(harness.connector.sessions_opened(), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn failed_path_creation_defers_the_connected_state() {
    init_tracing();
    let harness = ClusterHarness::start().await;
    let mut sub = harness.client.subscribe();

    harness.connector.fail(FaultPoint::Create);
    harness.fire_session(SessionState::SyncConnected);
    assert_quiet(&mut sub).await;
    assert!(matches!(
        harness.client.add_node(n1()).await.unwrap_err(),
        ClusterError::NotConnected
    ));

    // the next Connected retries the bootstrap
    harness.connector.heal(FaultPoint::Create);
    harness.fire_session(SessionState::SyncConnected);
    let event = next_event(&mut sub).await;
    let ClusterEvent::Connected(view) = event else {
        panic!("expected Connected after retry, got {event:?}");
    };
    assert!(view.is_empty());

    harness.shutdown().await;
}

#[tokio::test]
async fn shutdown_is_terminal() {
    init_tracing();
    let harness = ClusterHarness::start().await;
    let mut sub = harness.client.subscribe();

    harness.fire_session(SessionState::SyncConnected);
    next_event(&mut sub).await;

    harness.client.mark_available(5).await.unwrap();
    next_event(&mut sub).await;
    next_event(&mut sub).await;
    assert!(harness.connector.has_entry(&harness.paths.availability(5)));

    harness.client.shutdown();
    assert!(matches!(next_event(&mut sub).await, ClusterEvent::Shutdown));

    let result = harness.handle.manager.await.unwrap();
    assert!(result.is_ok());

    // the session was closed, taking its ephemeral entries with it
    assert!(!harness.connector.has_entry(&harness.paths.availability(5)));

    // commands after shutdown fail fast, repeated shutdowns are absorbed
    assert!(matches!(
        harness.client.add_node(n1()).await.unwrap_err(),
        ClusterError::Shutdown
    ));
    harness.client.shutdown();
    assert_quiet(&mut sub).await;
}
