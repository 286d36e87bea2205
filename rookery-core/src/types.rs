//! # Core Types
//!
//! Value types shared across the rookery membership layer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::{ClusterError, Result};

/// A member of the cluster.
///
/// Identity is the `id` alone: two `Node` values with the same id are
/// equal and hash identically regardless of their other fields. Ids are
/// unique within a cluster because the membership entry for a node is
/// named by its decimal id.
///
/// `available` is session-scoped state derived from the availability
/// tree; it is never carried in the node's wire payload.
///
/// # Examples
///
/// ```rust
/// use rookery_core::Node;
///
/// let node = Node::new(1, "localhost:31313", vec![0, 1]).unwrap();
/// assert_eq!(node.id, 1);
/// assert!(!node.available);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique node identifier within the cluster.
    pub id: i32,
    /// Address the node's RPC endpoint listens on.
    pub url: String,
    /// Partitions this node serves. Order is preserved as written.
    pub partitions: Vec<i32>,
    /// Whether the node currently holds an availability entry.
    pub available: bool,
}

impl Node {
    /// Creates a new node, initially unavailable.
    ///
    /// Fails with [`ClusterError::InvalidNode`] if `url` is empty.
    pub fn new(id: i32, url: impl Into<String>, partitions: Vec<i32>) -> Result<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(ClusterError::invalid_node("url must not be empty"));
        }
        Ok(Self {
            id,
            url,
            partitions,
            available: false,
        })
    }

    /// Returns this node with its availability bit replaced.
    pub fn with_availability(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    /// Returns whether this node serves the given partition.
    pub fn serves_partition(&self, partition: i32) -> bool {
        self.partitions.contains(&partition)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Node({}, {}, {:?}, {})",
            self.id,
            self.url,
            self.partitions,
            if self.available { "up" } else { "down" }
        )
    }
}

/// Immutable snapshot of the cluster: `id -> Node` with availability
/// bits as observed at the last reconciliation.
///
/// Snapshots are cheap to clone and hand off; listeners receive the
/// same shared map and must not assume exclusive access.
#[derive(Debug, Clone, Default)]
pub struct ClusterView {
    nodes: Arc<HashMap<i32, Node>>,
}

impl ClusterView {
    /// Wraps a reconciled node map into an immutable snapshot.
    pub fn new(nodes: HashMap<i32, Node>) -> Self {
        Self {
            nodes: Arc::new(nodes),
        }
    }

    /// Looks up a node by id.
    pub fn get(&self, id: i32) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Returns whether the view contains a node with the given id.
    pub fn contains(&self, id: i32) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of known nodes, available or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns whether the view holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates over all known nodes in unspecified order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Iterates over the nodes currently accepting traffic.
    pub fn available_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|node| node.available)
    }

    /// Available nodes serving the given partition.
    pub fn nodes_for_partition(&self, partition: i32) -> Vec<&Node> {
        self.nodes
            .values()
            .filter(|node| node.available && node.serves_partition(partition))
            .collect()
    }

    /// All nodes sorted by id. Convenient for stable display and tests.
    pub fn to_sorted_vec(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.nodes.values().cloned().collect();
        nodes.sort_by_key(|node| node.id);
        nodes
    }
}

impl fmt::Display for ClusterView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClusterView[")?;
        for (i, node) in self.to_sorted_vec().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", node)?;
        }
        write!(f, "]")
    }
}
