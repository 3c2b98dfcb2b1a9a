//! Join-mode decision: found a new cluster or join a running one.
//!
//! Every node that has run a member in the last heartbeat-expiration window
//! has a live entry in the status directory. Fewer live entries than the
//! desired cluster size means no cluster has formed yet.

use crate::discovery::{DiscoveryError, DiscoveryStore};
use crate::error::{BootError, ConfigParseWarning, Result};
use std::fmt;
use tracing::{debug, info, warn};

pub const DEFAULT_CLUSTER_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    /// Bootstrap a fresh cluster through the discovery endpoint
    New,
    /// Join the running cluster with an explicit initial-cluster list
    Existing,
}

impl JoinMode {
    /// Value the member binary expects for its initial cluster state.
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinMode::New => "new",
            JoinMode::Existing => "existing",
        }
    }
}

impl fmt::Display for JoinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `new` iff fewer live entries than the desired size.
pub fn decide(live_entries: usize, desired_size: usize) -> JoinMode {
    if live_entries < desired_size {
        JoinMode::New
    } else {
        JoinMode::Existing
    }
}

/// Parse a cluster size. Zero and non-integers are rejected.
pub fn parse_cluster_size(raw: &str) -> std::result::Result<usize, ConfigParseWarning> {
    match raw.trim().parse::<usize>() {
        Ok(size) if size > 0 => Ok(size),
        _ => Err(ConfigParseWarning {
            field: "cluster size",
            raw: raw.to_string(),
            fallback: DEFAULT_CLUSTER_SIZE,
        }),
    }
}

/// Parse a cluster size, logging and falling back to the default on failure.
pub fn desired_size_or_default(raw: &str) -> usize {
    parse_cluster_size(raw).unwrap_or_else(|warning| {
        warn!("{}", warning);
        warning.fallback
    })
}

/// Resolve the desired cluster size.
///
/// A configured value wins. Otherwise the size registered on the discovery
/// endpoint is used, and the default when none is registered.
pub async fn resolve_desired_size(
    store: &dyn DiscoveryStore,
    configured: Option<&str>,
    size_key: &str,
) -> Result<usize> {
    if let Some(raw) = configured {
        return Ok(desired_size_or_default(raw));
    }

    match store.get(size_key, false).await {
        Ok(node) => Ok(desired_size_or_default(node.value.as_deref().unwrap_or(""))),
        Err(DiscoveryError::NotFound(_)) => {
            debug!("No size registered at {}, using {}", size_key, DEFAULT_CLUSTER_SIZE);
            Ok(DEFAULT_CLUSTER_SIZE)
        }
        Err(e) => Err(e.into()),
    }
}

/// Count the live entries of the status directory at `path`.
///
/// A missing directory counts as empty: nothing has ever reported liveness
/// for this token.
pub async fn count_live_entries(store: &dyn DiscoveryStore, path: &str) -> Result<usize> {
    match store.get(path, true).await {
        Ok(node) if !node.dir => Err(BootError::MalformedDiscoveryState(format!(
            "expected a directory node at {}",
            path
        ))),
        Ok(node) => Ok(node.nodes.len()),
        Err(DiscoveryError::NotFound(_)) => {
            info!("No status directory at {} yet", path);
            Ok(0)
        }
        Err(e) => Err(e.into()),
    }
}

/// Read the status directory and decide the join mode.
pub async fn determine_join_mode(
    store: &dyn DiscoveryStore,
    path: &str,
    desired_size: usize,
) -> Result<JoinMode> {
    let live = count_live_entries(store, path).await?;
    let mode = decide(live, desired_size);
    info!(
        live_entries = live,
        desired_size,
        mode = mode.as_str(),
        "Join mode decided"
    );
    Ok(mode)
}
