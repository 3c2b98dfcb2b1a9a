//! DiscoveryStore trait for the shared bootstrap key/value service.
//!
//! Implementations:
//! - `HttpDiscovery` - etcd v2 keys API over HTTP
//! - `InMemoryDiscovery` - For testing
//!
//! The discovery endpoint is separate from the cluster's own storage. It is
//! only used to coordinate bootstrap: the size key written by the discovery
//! helper, and the per-node status entries written by the heartbeat.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub mod http;
pub mod memory;

pub use http::HttpDiscovery;
pub use memory::{InMemoryDiscovery, RecordedWrite};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Key already exists: {0}")]
    AlreadyExists(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unexpected response: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// A node in the discovery keyspace: either a value or a directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Node {
    /// Full key, e.g. `/deis/status/<token>/<name>`
    pub key: String,
    /// Value for leaf nodes
    #[serde(default)]
    pub value: Option<String>,
    /// Whether this node is a directory
    #[serde(default)]
    pub dir: bool,
    /// Children (directories only; nested levels only when listed recursively)
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Expiration timestamp as reported by the server
    #[serde(default)]
    pub expiration: Option<String>,
    /// Remaining time-to-live in seconds
    #[serde(default)]
    pub ttl: Option<i64>,
}

impl Node {
    /// Create a leaf node.
    pub fn leaf(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
            ..Default::default()
        }
    }

    /// Create a directory node.
    pub fn directory(key: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            key: key.into(),
            dir: true,
            nodes,
            ..Default::default()
        }
    }

    /// Last path segment of the key.
    pub fn name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// Key/value access to the discovery endpoint.
#[async_trait]
pub trait DiscoveryStore: Send + Sync {
    /// Fetch a node. Directories list their children; `recursive` includes
    /// nested levels.
    async fn get(&self, key: &str, recursive: bool) -> Result<Node>;

    /// Set a value, optionally expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Create a value; fails with `AlreadyExists` if the key is present.
    async fn create(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Layout of bootstrap keys under a namespace prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
    prefix: String,
}

impl Keyspace {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Directory holding one liveness entry per node: `/{prefix}/status/{token}`
    pub fn status_dir(&self, token: &str) -> String {
        format!("/{}/status/{}", self.prefix, token)
    }

    /// Liveness entry of one node: `/{prefix}/status/{token}/{name}`
    pub fn status_key(&self, token: &str, name: &str) -> String {
        format!("{}/{}", self.status_dir(token), name)
    }

    /// Discovery directory used by members bootstrapping a new cluster.
    pub fn discovery_dir(&self, token: &str) -> String {
        format!("/{}/discovery/{}", self.prefix, token)
    }

    /// Desired cluster size registered by the discovery helper.
    pub fn size_key(&self, token: &str) -> String {
        format!("{}/_config/size", self.discovery_dir(token))
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new("deis")
    }
}
