//! Mailbox protocol for the cluster manager.
//!
//! Session events and mutation commands travel through the same FIFO
//! mailbox, so every handler observes a serialized interleaving.
//! Mutations carry a oneshot reply sender; session events are
//! fire-and-forget.

use rookery_core::{Node, Result};
use tokio::sync::{mpsc, oneshot};

/// Reply channel for request-reply mutation commands. Success carries
/// nothing; failure carries exactly one error.
pub type CommandReply = oneshot::Sender<Result<()>>;

/// Messages drained by the cluster manager's single consumer loop.
#[derive(Debug)]
pub enum ClusterMessage {
    /// The session reached the store.
    Connected,
    /// The session lost contact with the store.
    Disconnected,
    /// The store discarded the session.
    Expired,
    /// The children of `path` changed on the store side.
    ChildrenChanged { path: String },
    /// Terminal shutdown request.
    Shutdown,

    /// Create a membership entry for `node`.
    AddNode { node: Node, reply: CommandReply },
    /// Delete the membership entry named by `id`, if any.
    RemoveNode { id: i32, reply: CommandReply },
    /// Create the ephemeral availability entry for `id`.
    MarkAvailable { id: i32, reply: CommandReply },
    /// Delete the availability entry for `id`, if any.
    MarkUnavailable { id: i32, reply: CommandReply },
}

pub type ClusterMessageSender = mpsc::UnboundedSender<ClusterMessage>;
pub type ClusterMessageReceiver = mpsc::UnboundedReceiver<ClusterMessage>;
