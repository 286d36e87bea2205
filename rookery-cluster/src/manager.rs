//! The coordination state machine.
//!
//! One task drains the mailbox; no two messages are handled
//! concurrently. Session events move the manager between disconnected
//! and connected, mutation commands require the connected state, and
//! every transition hands an immutable view snapshot to the
//! notification manager.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use rookery_core::store::{
    Acl, CoordinationStore, CreateMode, StoreConnector, StoreEventSender, ANY_VERSION,
};
use rookery_core::{codec, ClusterError, ClusterPaths, ClusterView, Node, Result};
use tracing::{debug, info, warn};

use crate::config::ClusterConfig;
use crate::messages::{ClusterMessage, ClusterMessageReceiver, CommandReply};
use crate::notifications::{ClusterEvent, NotificationManager};

pub struct ClusterManager<C: StoreConnector> {
    config: ClusterConfig,
    paths: ClusterPaths,
    connector: C,
    watcher: StoreEventSender,
    mailbox: ClusterMessageReceiver,
    notifications: Arc<NotificationManager>,

    store: Option<C::Handle>,
    connected: bool,
    view: HashMap<i32, Node>,
    // ids present under the availability tree, members or not; the view
    // only ever shows the bit for ids that also have a membership entry
    availability: HashSet<i32>,
}

impl<C: StoreConnector> ClusterManager<C> {
    pub fn new(
        config: ClusterConfig,
        connector: C,
        watcher: StoreEventSender,
        mailbox: ClusterMessageReceiver,
        notifications: Arc<NotificationManager>,
    ) -> Result<Self> {
        let paths = ClusterPaths::new(&config.service_name)?;
        Ok(Self {
            config,
            paths,
            connector,
            watcher,
            mailbox,
            notifications,
            store: None,
            connected: false,
            view: HashMap::new(),
            availability: HashSet::new(),
        })
    }

    pub async fn run(mut self) -> Result<()> {
        info!(service = %self.config.service_name, "starting cluster manager");

        if let Err(e) = self.ensure_store().await {
            warn!("initial store session failed: {}", e);
        }

        while let Some(message) = self.mailbox.recv().await {
            match message {
                ClusterMessage::Connected => self.handle_connected().await,
                ClusterMessage::Disconnected => self.handle_disconnected(),
                ClusterMessage::Expired => self.handle_expired().await,
                ClusterMessage::ChildrenChanged { path } => {
                    self.handle_children_changed(&path).await
                }
                ClusterMessage::Shutdown => {
                    self.handle_shutdown().await;
                    break;
                }
                ClusterMessage::AddNode { node, reply } => {
                    let result = self.handle_add_node(node).await;
                    Self::send_reply(reply, result);
                }
                ClusterMessage::RemoveNode { id, reply } => {
                    let result = self.handle_remove_node(id).await;
                    Self::send_reply(reply, result);
                }
                ClusterMessage::MarkAvailable { id, reply } => {
                    let result = self.handle_mark_available(id).await;
                    Self::send_reply(reply, result);
                }
                ClusterMessage::MarkUnavailable { id, reply } => {
                    let result = self.handle_mark_unavailable(id).await;
                    Self::send_reply(reply, result);
                }
            }
        }

        info!("cluster manager stopped");
        Ok(())
    }

    fn send_reply(reply: CommandReply, result: Result<()>) {
        if reply.send(result).is_err() {
            debug!("command caller went away before the reply");
        }
    }

    async fn ensure_store(&mut self) -> Result<()> {
        if self.store.is_none() {
            let handle = self
                .connector
                .connect(
                    &self.config.store_addr,
                    self.config.session_timeout,
                    self.watcher.clone(),
                )
                .await?;
            self.store = Some(handle);
        }
        Ok(())
    }

    fn store(&self) -> Result<&C::Handle> {
        self.store.as_ref().ok_or(ClusterError::NotConnected)
    }

    async fn handle_connected(&mut self) {
        if let Err(e) = self.establish().await {
            warn!("failed to establish connected state: {}", e);
            self.connected = false;
            return;
        }
        self.connected = true;
        info!(nodes = self.view.len(), "connected to coordination store");
        self.notifications
            .publish(ClusterEvent::Connected(self.snapshot()));
    }

    async fn establish(&mut self) -> Result<()> {
        self.ensure_store().await?;
        self.verify_paths().await?;
        self.refresh().await
    }

    async fn verify_paths(&self) -> Result<()> {
        let store = self.store()?;
        for path in self.paths.well_known() {
            if store.exists(path, false).await? {
                continue;
            }
            debug!(path, "creating well-known path");
            if let Err(e) = store
                .create(path, Bytes::new(), Acl::OpenUnsafe, CreateMode::Persistent)
                .await
            {
                // another process may win the bootstrap race
                if !store.exists(path, false).await.unwrap_or(false) {
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Rebuilds the view from the store, re-arming the child watches on
    /// both well-known parents. A member that cannot be fetched or
    /// decoded is skipped; the rest of the refresh proceeds.
    async fn refresh(&mut self) -> Result<()> {
        let store = self.store()?;

        let member_names = store.get_children(self.paths.members(), true).await?;
        let mut view = HashMap::with_capacity(member_names.len());
        for name in member_names {
            let Some(id) = parse_member_id(&name) else {
                warn!(entry = %name, "ignoring member entry with a non-numeric name");
                continue;
            };
            let payload = match store.get_data(&self.paths.member(id), false).await {
                Ok(payload) => payload,
                Err(e) => {
                    // the entry may vanish between the list and the fetch
                    warn!(id, "skipping member during refresh: {}", e);
                    continue;
                }
            };
            match codec::decode(&payload) {
                Ok(node) => {
                    view.insert(node.id, node);
                }
                Err(e) => warn!(id, "skipping undecodable member payload: {}", e),
            }
        }

        let available_names = store.get_children(self.paths.available(), true).await?;
        let availability: HashSet<i32> = available_names
            .iter()
            .filter_map(|name| parse_member_id(name))
            .collect();

        for (id, node) in view.iter_mut() {
            node.available = availability.contains(id);
        }

        self.view = view;
        self.availability = availability;
        Ok(())
    }

    fn handle_disconnected(&mut self) {
        if !self.connected {
            debug!("ignoring disconnect while already disconnected");
            return;
        }
        self.connected = false;
        warn!("disconnected from coordination store");
        // the view is retained for diagnostics but commands are now
        // un-serviceable
        self.notifications.publish(ClusterEvent::Disconnected);
    }

    async fn handle_expired(&mut self) {
        warn!("coordination store session expired, opening a fresh session");
        self.connected = false;
        self.view.clear();
        self.availability.clear();

        if let Some(store) = self.store.take() {
            if let Err(e) = store.close().await {
                debug!("closing expired session: {}", e);
            }
        }
        if let Err(e) = self.ensure_store().await {
            warn!("failed to open a fresh session: {}", e);
        }
    }

    async fn handle_children_changed(&mut self, path: &str) {
        if !self.connected {
            debug!(path, "ignoring children change while disconnected");
            return;
        }
        if path != self.paths.members() && path != self.paths.available() {
            debug!(path, "ignoring children change for unrelated path");
            return;
        }
        match self.refresh().await {
            Ok(()) => {
                debug!(nodes = self.view.len(), "view refreshed");
                self.notifications
                    .publish(ClusterEvent::NodesChanged(self.snapshot()));
            }
            // the re-armed watch is the recovery path
            Err(e) => warn!("refresh failed, awaiting the next watch: {}", e),
        }
    }

    async fn handle_shutdown(&mut self) {
        info!("shutting down cluster manager");
        self.connected = false;
        if let Some(store) = self.store.take() {
            if let Err(e) = store.close().await {
                debug!("closing session on shutdown: {}", e);
            }
        }
        self.notifications.publish(ClusterEvent::Shutdown);
    }

    async fn handle_add_node(&mut self, node: Node) -> Result<()> {
        if !self.connected {
            return Err(ClusterError::NotConnected);
        }
        let path = self.paths.member(node.id);
        if self.store()?.exists(&path, false).await? {
            return Err(ClusterError::DuplicateNode { id: node.id });
        }
        self.store()?
            .create(
                &path,
                codec::encode(&node),
                Acl::OpenUnsafe,
                CreateMode::Persistent,
            )
            .await?;

        // a just-added node is only up if something already marked it
        let available = self.availability.contains(&node.id);
        info!(id = node.id, url = %node.url, available, "node added");
        self.view.insert(node.id, node.with_availability(available));
        self.publish_nodes_changed();
        Ok(())
    }

    async fn handle_remove_node(&mut self, id: i32) -> Result<()> {
        if !self.connected {
            return Err(ClusterError::NotConnected);
        }
        let path = self.paths.member(id);
        if !self.store()?.exists(&path, false).await? {
            return Ok(());
        }
        self.store()?.delete(&path, ANY_VERSION).await?;
        info!(id, "node removed");
        self.view.remove(&id);
        self.publish_nodes_changed();
        Ok(())
    }

    async fn handle_mark_available(&mut self, id: i32) -> Result<()> {
        if !self.connected {
            return Err(ClusterError::NotConnected);
        }
        let path = self.paths.availability(id);
        if self.store()?.exists(&path, false).await? {
            return Ok(());
        }
        self.store()?
            .create(&path, Bytes::new(), Acl::OpenUnsafe, CreateMode::Ephemeral)
            .await?;

        debug!(id, "node marked available");
        self.availability.insert(id);
        if let Some(node) = self.view.get_mut(&id) {
            node.available = true;
        }
        self.publish_nodes_changed();
        Ok(())
    }

    async fn handle_mark_unavailable(&mut self, id: i32) -> Result<()> {
        if !self.connected {
            return Err(ClusterError::NotConnected);
        }
        let path = self.paths.availability(id);
        if !self.store()?.exists(&path, false).await? {
            return Ok(());
        }
        self.store()?.delete(&path, ANY_VERSION).await?;

        debug!(id, "node marked unavailable");
        self.availability.remove(&id);
        if let Some(node) = self.view.get_mut(&id) {
            node.available = false;
        }
        self.publish_nodes_changed();
        Ok(())
    }

    fn snapshot(&self) -> ClusterView {
        ClusterView::new(self.view.clone())
    }

    fn publish_nodes_changed(&self) {
        self.notifications
            .publish(ClusterEvent::NodesChanged(self.snapshot()));
    }
}

fn parse_member_id(name: &str) -> Option<i32> {
    name.parse().ok()
}
