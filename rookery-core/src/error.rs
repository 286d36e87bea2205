//! # Error Types
//!
//! Error handling for the rookery membership layer.

use thiserror::Error;

/// Error conditions surfaced by the membership layer.
///
/// Mutation commands report at most one of these as their reply value.
/// Errors hit during a watch-driven refresh are logged and swallowed
/// instead: the next watch firing is the recovery path.
///
/// # Examples
///
/// ```rust
/// use rookery_core::ClusterError;
///
/// let error = ClusterError::store("connection refused");
/// assert!(error.is_retryable());
/// ```
#[derive(Error, Debug)]
pub enum ClusterError {
    /// A membership entry payload could not be decoded.
    #[error("malformed node payload: {details}")]
    MalformedNode { details: String },

    /// A command arrived while the manager holds no usable session.
    #[error("cluster manager is not connected to the coordination store")]
    NotConnected,

    /// `AddNode` for an id that already has a membership entry.
    #[error("node {id} already exists in the cluster")]
    DuplicateNode { id: i32 },

    /// A node value failed validation on construction.
    #[error("invalid node: {details}")]
    InvalidNode { details: String },

    /// Invalid configuration supplied by the caller.
    #[error("configuration error: {details}")]
    Configuration { details: String },

    /// Coordination-store or transport failure surfaced to a caller.
    #[error("coordination store error: {message}")]
    Store { message: String },

    /// A request-reply command exceeded its timeout. The command may
    /// still take effect on the store after the caller has given up.
    #[error("timeout waiting for {operation}")]
    Timeout { operation: String },

    /// The cluster manager has shut down and no longer serves commands.
    #[error("cluster manager has shut down")]
    Shutdown,
}

/// Type alias for Results in the rookery membership layer.
pub type Result<T> = std::result::Result<T, ClusterError>;

impl ClusterError {
    /// Creates a new malformed-payload error with the given details.
    pub fn malformed(details: impl Into<String>) -> Self {
        Self::MalformedNode {
            details: details.into(),
        }
    }

    /// Creates a new node-validation error with the given details.
    pub fn invalid_node(details: impl Into<String>) -> Self {
        Self::InvalidNode {
            details: details.into(),
        }
    }

    /// Creates a new configuration error with the given details.
    pub fn configuration(details: impl Into<String>) -> Self {
        Self::Configuration {
            details: details.into(),
        }
    }

    /// Creates a new coordination-store error with the given message.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rookery_core::ClusterError;
    ///
    /// let error = ClusterError::store("session moved");
    /// ```
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Creates a new timeout error naming the operation that timed out.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Determines whether retrying the operation may succeed.
    ///
    /// Store and timeout failures are transient; a `NotConnected`
    /// command can be retried once the session is re-established.
    /// Structural errors (malformed payloads, duplicate ids, bad
    /// configuration) are not resolved by retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Store { .. } | Self::Timeout { .. } | Self::NotConnected
        )
    }
}
