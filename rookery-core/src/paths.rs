//! Well-known coordination-store paths for one service's cluster.

use crate::{ClusterError, Result};

/// The three well-known paths derived from a service name, plus the
/// per-id entry paths under them.
///
/// Layout for service `s`:
///
/// - `/s` — cluster root, persistent marker
/// - `/s/members/<id>` — persistent, payload is the encoded node
/// - `/s/available/<id>` — ephemeral, empty payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterPaths {
    root: String,
    members: String,
    available: String,
}

impl ClusterPaths {
    /// Derives the path layout for a service.
    ///
    /// The service name becomes a single path segment, so it must be
    /// non-empty and free of `/`.
    pub fn new(service_name: &str) -> Result<Self> {
        if service_name.is_empty() {
            return Err(ClusterError::configuration("service name must not be empty"));
        }
        if service_name.contains('/') {
            return Err(ClusterError::configuration(
                "service name must not contain '/'",
            ));
        }
        let root = format!("/{service_name}");
        Ok(Self {
            members: format!("{root}/members"),
            available: format!("{root}/available"),
            root,
        })
    }

    /// Cluster root path.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Parent of the membership entries.
    pub fn members(&self) -> &str {
        &self.members
    }

    /// Parent of the availability entries.
    pub fn available(&self) -> &str {
        &self.available
    }

    /// Membership entry path for a node id.
    pub fn member(&self, id: i32) -> String {
        format!("{}/{}", self.members, id)
    }

    /// Availability entry path for a node id.
    pub fn availability(&self, id: i32) -> String {
        format!("{}/{}", self.available, id)
    }

    /// The well-known paths in creation order.
    pub fn well_known(&self) -> [&str; 3] {
        [&self.root, &self.members, &self.available]
    }
}
