//! Cluster identity token shared by all nodes of one cluster.

use crate::error::{BootError, Result};
use std::fmt;
use std::path::Path;

/// Where the orchestrator mounts the discovery token secret.
pub const DEFAULT_TOKEN_FILE: &str = "/var/run/secrets/deis/etcd/discovery/token";

/// Opaque token namespacing this cluster on the discovery endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryToken(String);

impl DiscoveryToken {
    /// Wrap a token value. Surrounding whitespace is dropped; blank is `None`.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Read the token from a mounted secret file.
    pub fn read(path: &Path) -> Result<Self> {
        let unavailable = |reason: String| BootError::TokenUnavailable {
            path: path.display().to_string(),
            reason,
        };

        let contents = std::fs::read_to_string(path).map_err(|e| unavailable(e.to_string()))?;
        Self::new(&contents).ok_or_else(|| unavailable("file is empty".to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DiscoveryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
