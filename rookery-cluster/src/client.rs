//! Public surface of the membership layer.
//!
//! [`ClusterClient::start`] wires the watcher pump and the manager task
//! together and returns a cheap, cloneable client for commands and
//! subscriptions.

use std::sync::Arc;
use std::time::Duration;

use rookery_core::store::StoreConnector;
use rookery_core::{ClusterError, ClusterView, Node, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;

use crate::config::ClusterConfig;
use crate::manager::ClusterManager;
use crate::messages::{ClusterMessage, ClusterMessageSender};
use crate::notifications::{ListenerId, NotificationManager, Subscription};
use crate::watcher;

/// Join handles for the background tasks behind a [`ClusterClient`].
pub struct ClusterHandle {
    pub manager: JoinHandle<Result<()>>,
    pub watcher: JoinHandle<()>,
}

/// Handle for sending commands to the cluster manager and subscribing
/// to view updates.
#[derive(Clone)]
pub struct ClusterClient {
    sender: ClusterMessageSender,
    notifications: Arc<NotificationManager>,
    request_timeout: Duration,
}

impl ClusterClient {
    /// Starts the membership layer: opens the first store session,
    /// spawns the watcher pump and the manager task, and returns the
    /// client plus the background task handles.
    pub async fn start<C>(config: ClusterConfig, connector: C) -> Result<(Self, ClusterHandle)>
    where
        C: StoreConnector + 'static,
    {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let notifications = Arc::new(NotificationManager::new());

        let manager = ClusterManager::new(
            config.clone(),
            connector,
            raw_tx,
            msg_rx,
            Arc::clone(&notifications),
        )?;

        let watcher = watcher::spawn(raw_rx, msg_tx.clone());
        let manager = tokio::spawn(manager.run());

        let client = Self {
            sender: msg_tx,
            notifications,
            request_timeout: config.request_timeout,
        };
        Ok((client, ClusterHandle { manager, watcher }))
    }

    /// Creates a membership entry for `node`. Fails with
    /// [`ClusterError::DuplicateNode`] if the id is already a member.
    pub async fn add_node(&self, node: Node) -> Result<()> {
        self.ask("add_node", |reply| ClusterMessage::AddNode { node, reply })
            .await
    }

    /// Deletes the membership entry for `id`. Removing an unknown id
    /// succeeds.
    pub async fn remove_node(&self, id: i32) -> Result<()> {
        self.ask("remove_node", |reply| ClusterMessage::RemoveNode {
            id,
            reply,
        })
        .await
    }

    /// Marks `id` as accepting traffic by creating its ephemeral
    /// availability entry. Marking an already-available id succeeds
    /// without touching the store.
    pub async fn mark_available(&self, id: i32) -> Result<()> {
        self.ask("mark_available", |reply| ClusterMessage::MarkAvailable {
            id,
            reply,
        })
        .await
    }

    /// Removes the availability entry for `id`. Marking an
    /// already-unavailable id succeeds.
    pub async fn mark_unavailable(&self, id: i32) -> Result<()> {
        self.ask("mark_unavailable", |reply| {
            ClusterMessage::MarkUnavailable { id, reply }
        })
        .await
    }

    /// Registers a listener for view updates. If a view is already
    /// known, the subscription starts with a `Connected` event carrying
    /// it.
    pub fn subscribe(&self) -> Subscription {
        self.notifications.subscribe()
    }

    /// Removes a listener. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.notifications.unsubscribe(id)
    }

    /// The most recently published view, if any.
    pub fn current_view(&self) -> Option<ClusterView> {
        self.notifications.latest_view()
    }

    /// Requests shutdown. The manager closes its store session,
    /// publishes a terminal `Shutdown` event, and stops. Repeated
    /// requests are absorbed.
    pub fn shutdown(&self) {
        if self.sender.send(ClusterMessage::Shutdown).is_err() {
            debug!("cluster manager already stopped");
        }
    }

    /// Enqueues a command and awaits its reply.
    ///
    /// On timeout the caller observes [`ClusterError::Timeout`], but
    /// the command may still take effect on the store afterwards; this
    /// is inherent to the coordination store.
    async fn ask<F>(&self, operation: &str, make: F) -> Result<()>
    where
        F: FnOnce(oneshot::Sender<Result<()>>) -> ClusterMessage,
    {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .map_err(|_| ClusterError::Shutdown)?;
        match timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            // the manager dropped the reply sender while shutting down
            Ok(Err(_)) => Err(ClusterError::Shutdown),
            Err(_) => Err(ClusterError::timeout(operation)),
        }
    }
}
