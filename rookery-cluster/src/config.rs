use std::time::Duration;

/// Configuration for the cluster manager.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Service name; becomes the cluster root path segment.
    pub service_name: String,
    /// Address of the coordination store ensemble.
    pub store_addr: String,
    /// Session timeout negotiated with the store.
    pub session_timeout: Duration,
    /// How long a caller waits for a mutation command's reply.
    pub request_timeout: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            service_name: "cluster".to_string(),
            store_addr: "localhost:2181".to_string(),
            session_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl ClusterConfig {
    pub fn new(service_name: impl Into<String>, store_addr: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            store_addr: store_addr.into(),
            ..Self::default()
        }
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
