//! # Coordination-Store Seam
//!
//! Traits and event types the membership layer consumes from a
//! hierarchical coordination store (watches, sessions, ephemeral
//! entries). A real binding and the in-memory test double both
//! implement these; the cluster manager is generic over them.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::Result;

/// Delete any version of an entry.
pub const ANY_VERSION: i32 = -1;

/// Lifetime mode of a created entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// The entry outlives the session that created it.
    Persistent,
    /// The entry disappears when the creating session ends.
    Ephemeral,
}

/// Access policy attached to a created entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Acl {
    /// World-readable and world-writable.
    #[default]
    OpenUnsafe,
    /// World-readable, writable only by the creator.
    CreatorAll,
}

/// Session-level connection states reported by the store client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The session reached the store and is serviceable.
    SyncConnected,
    /// Contact with the store is lost; the session may still recover.
    Disconnected,
    /// The store discarded the session. Ephemeral entries it owned are
    /// gone and a fresh session must be established.
    Expired,
}

/// Raw asynchronous event delivered through a session's watcher.
///
/// Watches are one-shot: a tree event fires at most once per
/// registration and must be re-armed by the next read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// Session-level state change.
    Session(SessionState),
    /// The children of `path` changed.
    ChildrenChanged { path: String },
    /// The payload of `path` changed.
    DataChanged { path: String },
    /// The entry at `path` was created.
    Created { path: String },
    /// The entry at `path` was deleted.
    Deleted { path: String },
}

/// Sending half of a session's raw watcher channel. Store clients push
/// events from their own threads; the send must never block them.
pub type StoreEventSender = mpsc::UnboundedSender<StoreEvent>;

/// Receiving half of a session's raw watcher channel.
pub type StoreEventReceiver = mpsc::UnboundedReceiver<StoreEvent>;

/// One open session against the coordination store.
///
/// The handle is owned exclusively by the cluster manager and closed
/// exactly once, on shutdown or when replacing an expired session.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Returns whether `path` exists, optionally leaving a watch on it.
    async fn exists(&self, path: &str, watch: bool) -> Result<bool>;

    /// Creates an entry at `path` and returns its final path.
    async fn create(&self, path: &str, payload: Bytes, acl: Acl, mode: CreateMode)
        -> Result<String>;

    /// Deletes the entry at `path`. Pass [`ANY_VERSION`] to delete
    /// regardless of the entry's version.
    async fn delete(&self, path: &str, version: i32) -> Result<()>;

    /// Lists the child names of `path`, optionally leaving a watch for
    /// the next children change.
    async fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>>;

    /// Reads the payload of `path`, optionally leaving a watch for the
    /// next data change.
    async fn get_data(&self, path: &str, watch: bool) -> Result<Bytes>;

    /// Ends the session. Ephemeral entries owned by it disappear.
    async fn close(&self) -> Result<()>;
}

/// Opens sessions against the coordination store.
///
/// Passed to the cluster manager explicitly so that a process can wire
/// a real binding, a namespaced one, or a test double without touching
/// global state.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// The session handle this connector produces.
    type Handle: CoordinationStore + Send + Sync + 'static;

    /// Opens a fresh session against `addr`. Session and watch events
    /// are delivered through `watcher` from the store client's own
    /// threads.
    async fn connect(
        &self,
        addr: &str,
        session_timeout: Duration,
        watcher: StoreEventSender,
    ) -> Result<Self::Handle>;
}
