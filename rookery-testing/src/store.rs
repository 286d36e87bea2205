//! In-memory coordination store.
//!
//! A faithful double of the store semantics the cluster manager relies
//! on: a shared path tree across sessions, one-shot child watches that
//! must be re-armed (registered at most once per watcher channel, as
//! the real client does), ephemeral entries reaped when their owning
//! session closes, and injectable faults for the skip-on-error paths.
//!
//! Tests drive session lifecycle explicitly through
//! [`InMemoryConnector::fire_session`]; the double never synthesizes
//! session events on its own.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rookery_core::store::{
    Acl, CoordinationStore, CreateMode, SessionState, StoreConnector, StoreEvent, StoreEventSender,
};
use rookery_core::{ClusterError, Result};

/// Operations that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Exists,
    Create,
    Delete,
    GetChildren,
    GetData,
}

#[derive(Debug, Clone)]
struct Entry {
    payload: Bytes,
    mode: CreateMode,
    /// Session that created the entry; 0 marks an external writer.
    owner: u64,
}

#[derive(Default)]
struct SharedState {
    entries: HashMap<String, Entry>,
    child_watches: HashMap<String, Vec<StoreEventSender>>,
    failing: HashSet<FaultPoint>,
    failing_data_paths: HashSet<String>,
}

impl SharedState {
    fn fire_child_watches(&mut self, parent: &str) {
        if let Some(watches) = self.child_watches.remove(parent) {
            for watch in watches {
                let _ = watch.send(StoreEvent::ChildrenChanged {
                    path: parent.to_string(),
                });
            }
        }
    }

    fn children_of(&self, path: &str) -> Vec<String> {
        let prefix = format!("{path}/");
        self.entries
            .keys()
            .filter_map(|entry| {
                let rest = entry.strip_prefix(&prefix)?;
                (!rest.contains('/')).then(|| rest.to_string())
            })
            .collect()
    }
}

/// Opens [`InMemoryStore`] sessions over one shared tree.
///
/// Clones share the tree, so a test can keep one clone for seeding and
/// hand another to the cluster manager.
#[derive(Clone, Default)]
pub struct InMemoryConnector {
    shared: Arc<Mutex<SharedState>>,
    watchers: Arc<Mutex<Vec<StoreEventSender>>>,
    sessions_opened: Arc<AtomicU64>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions opened so far.
    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened.load(Ordering::SeqCst)
    }

    /// Delivers a session state change through the current session's
    /// watcher.
    pub fn fire_session(&self, state: SessionState) {
        if let Some(watcher) = self.watchers.lock().last() {
            let _ = watcher.send(StoreEvent::Session(state));
        }
    }

    /// Writes an entry as if another process created it, firing the
    /// parent's child watches.
    pub fn seed(&self, path: &str, payload: Bytes, mode: CreateMode) {
        let mut shared = self.shared.lock();
        shared.entries.insert(
            path.to_string(),
            Entry {
                payload,
                mode,
                owner: 0,
            },
        );
        let parent = parent_of(path).to_string();
        shared.fire_child_watches(&parent);
    }

    /// Removes an entry as if another process deleted it, firing the
    /// parent's child watches. Unknown paths are ignored.
    pub fn remove(&self, path: &str) {
        let mut shared = self.shared.lock();
        if shared.entries.remove(path).is_some() {
            let parent = parent_of(path).to_string();
            shared.fire_child_watches(&parent);
        }
    }

    /// Replaces the children of `parent` with empty-payload entries
    /// named `names`, firing the parent's watches exactly once.
    pub fn set_children(&self, parent: &str, names: &[String], mode: CreateMode) {
        let mut shared = self.shared.lock();
        let prefix = format!("{parent}/");
        shared.entries.retain(|path, _| !path.starts_with(&prefix));
        for name in names {
            shared.entries.insert(
                format!("{prefix}{name}"),
                Entry {
                    payload: Bytes::new(),
                    mode,
                    owner: 0,
                },
            );
        }
        shared.fire_child_watches(parent);
    }

    /// Returns the payload of an entry, if present.
    pub fn entry(&self, path: &str) -> Option<Bytes> {
        self.shared
            .lock()
            .entries
            .get(path)
            .map(|entry| entry.payload.clone())
    }

    pub fn has_entry(&self, path: &str) -> bool {
        self.shared.lock().entries.contains_key(path)
    }

    /// Makes every subsequent operation of the given kind fail.
    pub fn fail(&self, point: FaultPoint) {
        self.shared.lock().failing.insert(point);
    }

    /// Clears a previously injected fault.
    pub fn heal(&self, point: FaultPoint) {
        self.shared.lock().failing.remove(&point);
    }

    /// Makes reads of one specific path fail, leaving the rest intact.
    pub fn fail_data_at(&self, path: &str) {
        self.shared.lock().failing_data_paths.insert(path.to_string());
    }
}

#[async_trait]
impl StoreConnector for InMemoryConnector {
    type Handle = InMemoryStore;

    async fn connect(
        &self,
        _addr: &str,
        _session_timeout: Duration,
        watcher: StoreEventSender,
    ) -> Result<Self::Handle> {
        let session = self.sessions_opened.fetch_add(1, Ordering::SeqCst) + 1;
        self.watchers.lock().push(watcher.clone());
        Ok(InMemoryStore {
            session,
            shared: Arc::clone(&self.shared),
            watcher,
            closed: AtomicBool::new(false),
        })
    }
}

/// One session against the shared in-memory tree.
pub struct InMemoryStore {
    session: u64,
    shared: Arc<Mutex<SharedState>>,
    watcher: StoreEventSender,
    closed: AtomicBool,
}

impl InMemoryStore {
    fn check(&self, point: FaultPoint) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClusterError::store("session is closed"));
        }
        if self.shared.lock().failing.contains(&point) {
            return Err(ClusterError::store(format!("injected {point:?} fault")));
        }
        Ok(())
    }
}

#[async_trait]
impl CoordinationStore for InMemoryStore {
    async fn exists(&self, path: &str, _watch: bool) -> Result<bool> {
        self.check(FaultPoint::Exists)?;
        Ok(self.shared.lock().entries.contains_key(path))
    }

    async fn create(
        &self,
        path: &str,
        payload: Bytes,
        _acl: Acl,
        mode: CreateMode,
    ) -> Result<String> {
        self.check(FaultPoint::Create)?;
        let mut shared = self.shared.lock();
        if shared.entries.contains_key(path) {
            return Err(ClusterError::store(format!("entry already exists: {path}")));
        }
        shared.entries.insert(
            path.to_string(),
            Entry {
                payload,
                mode,
                owner: self.session,
            },
        );
        let parent = parent_of(path).to_string();
        shared.fire_child_watches(&parent);
        Ok(path.to_string())
    }

    async fn delete(&self, path: &str, _version: i32) -> Result<()> {
        self.check(FaultPoint::Delete)?;
        let mut shared = self.shared.lock();
        if shared.entries.remove(path).is_none() {
            return Err(ClusterError::store(format!("no entry at {path}")));
        }
        let parent = parent_of(path).to_string();
        shared.fire_child_watches(&parent);
        Ok(())
    }

    async fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>> {
        self.check(FaultPoint::GetChildren)?;
        let mut shared = self.shared.lock();
        if !shared.entries.contains_key(path) {
            return Err(ClusterError::store(format!("no entry at {path}")));
        }
        if watch {
            let watches = shared.child_watches.entry(path.to_string()).or_default();
            // the real client registers a watcher at most once per path
            if !watches.iter().any(|w| w.same_channel(&self.watcher)) {
                watches.push(self.watcher.clone());
            }
        }
        Ok(shared.children_of(path))
    }

    async fn get_data(&self, path: &str, _watch: bool) -> Result<Bytes> {
        self.check(FaultPoint::GetData)?;
        let shared = self.shared.lock();
        if shared.failing_data_paths.contains(path) {
            return Err(ClusterError::store(format!("injected read fault at {path}")));
        }
        shared
            .entries
            .get(path)
            .map(|entry| entry.payload.clone())
            .ok_or_else(|| ClusterError::store(format!("no entry at {path}")))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(ClusterError::store("session already closed"));
        }
        let mut shared = self.shared.lock();
        let reaped: Vec<String> = shared
            .entries
            .iter()
            .filter(|(_, entry)| entry.mode == CreateMode::Ephemeral && entry.owner == self.session)
            .map(|(path, _)| path.clone())
            .collect();
        let parents: HashSet<String> = reaped
            .iter()
            .map(|path| parent_of(path).to_string())
            .collect();
        for path in &reaped {
            shared.entries.remove(path);
        }
        for parent in parents {
            shared.fire_child_watches(&parent);
        }
        Ok(())
    }
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}
