//! ClusterAdmin trait for the running cluster's membership API.
//!
//! Implementations:
//! - `HttpClusterAdmin` - etcd v2 members API over HTTP
//! - `InMemoryCluster` - For testing, records every call
//!
//! The cluster is the source of truth for membership. Callers re-list members
//! before every decision instead of holding on to an earlier answer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod http;
pub mod memory;

pub use http::HttpClusterAdmin;
pub use memory::{AdminCall, InMemoryCluster};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Member not found: {0}")]
    NotFound(String),

    #[error("Member conflict: {0}")]
    Conflict(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unexpected response: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, AdminError>;

/// One cluster participant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    /// Empty until the member has started and announced itself
    #[serde(default)]
    pub name: String,
    #[serde(rename = "peerURLs", default)]
    pub peer_urls: Vec<String>,
    #[serde(rename = "clientURLs", default)]
    pub client_urls: Vec<String>,
}

impl Member {
    pub fn new(id: &str, name: &str, peer_url: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            peer_urls: vec![peer_url.to_string()],
            client_urls: Vec::new(),
        }
    }
}

/// Membership administration of a running cluster.
#[async_trait]
pub trait ClusterAdmin: Send + Sync {
    /// List all members.
    async fn list_members(&self) -> Result<Vec<Member>>;

    /// Add a member by its peer URLs. Returns the record with the assigned id.
    async fn add_member(&self, peer_urls: &[String]) -> Result<Member>;

    /// Remove a member by id.
    async fn remove_member(&self, id: &str) -> Result<()>;
}
