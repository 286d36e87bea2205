//! # Rookery Core - Cluster Membership Building Blocks
//!
//! Foundational types for the rookery membership layer of a
//! partitioned RPC framework:
//!
//! - **Node and ClusterView**: the value types a cluster view is made
//!   of, with availability derived from the store's ephemeral tree
//! - **Node Codec**: the stable binary wire format of a membership
//!   entry payload
//! - **Coordination-Store Seam**: traits over the hierarchical,
//!   watchable store (sessions, ephemeral entries, one-shot watches)
//!   that the cluster manager is generic over
//! - **Path Layout**: the `/service`, `/service/members`,
//!   `/service/available` tree
//! - **Error Handling**: the error vocabulary shared by every crate in
//!   the workspace
//!
//! ## Encoding a membership entry
//!
//! ```rust
//! use rookery_core::{codec, Node};
//!
//! let node = Node::new(1, "localhost:31313", vec![0, 1]).unwrap();
//! let payload = codec::encode(&node);
//! let decoded = codec::decode(&payload).unwrap();
//! assert_eq!(decoded.url, "localhost:31313");
//! assert!(!decoded.available); // availability is never on the wire
//! ```

pub mod codec;
pub mod error;
pub mod paths;
pub mod store;
pub mod types;

// Re-export commonly used types for convenience
pub use error::*;
pub use paths::*;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_and_paths_compose() {
        let paths = ClusterPaths::new("search").unwrap();
        let node = Node::new(4, "localhost:31316", vec![2]).unwrap();

        let payload = codec::encode(&node);
        let decoded = codec::decode(&payload).unwrap();

        assert_eq!(paths.member(decoded.id), "/search/members/4");
        assert_eq!(decoded, node);
    }
}
