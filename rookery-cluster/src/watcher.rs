//! Bridges raw store watcher events into the manager mailbox.
//!
//! The store client delivers events on its own threads; handler logic
//! must never run there. The pump below only translates and forwards,
//! and the mailbox send is non-blocking, so a slow manager can never
//! stall the store client. Events the manager does not consume are
//! dropped here; a lost tree event is recovered by the next watch
//! firing.

use rookery_core::store::{SessionState, StoreEvent, StoreEventReceiver};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::messages::{ClusterMessage, ClusterMessageSender};

/// Maps one raw store event to a mailbox message, or `None` for events
/// the manager does not consume.
pub fn translate(event: StoreEvent) -> Option<ClusterMessage> {
    match event {
        StoreEvent::Session(SessionState::SyncConnected) => Some(ClusterMessage::Connected),
        StoreEvent::Session(SessionState::Disconnected) => Some(ClusterMessage::Disconnected),
        StoreEvent::Session(SessionState::Expired) => Some(ClusterMessage::Expired),
        StoreEvent::ChildrenChanged { path } => Some(ClusterMessage::ChildrenChanged { path }),
        other => {
            debug!(event = ?other, "dropping unhandled store event");
            None
        }
    }
}

/// Spawns the pump that forwards raw watcher events into the manager
/// mailbox. Ends when either side closes.
pub fn spawn(mut raw: StoreEventReceiver, sink: ClusterMessageSender) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = raw.recv().await {
            if let Some(message) = translate(event) {
                if sink.send(message).is_err() {
                    debug!("manager mailbox closed, stopping watcher pump");
                    break;
                }
            }
        }
    })
}
