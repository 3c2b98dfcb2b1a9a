//! Typed settings for one boot attempt.
//!
//! The binary fills these from flags and environment variables; the core
//! never reads the process environment for them.

use crate::discovery::Keyspace;
use crate::heartbeat::HeartbeatConfig;
use crate::member_env::UrlOverrides;
use crate::supervisor::MemberCommand;
use std::time::Duration;

/// Label selector matching the pods that back cluster members.
pub const DEFAULT_LABEL_SELECTOR: &str = "name=deis-etcd-1";

/// Timeout for a single request to the discovery, admin or resource APIs.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct BootSettings {
    /// Base URL of the discovery endpoint, e.g. `http://10.0.0.10:2381`
    pub discovery_url: String,
    /// Key layout on the discovery endpoint
    pub keyspace: Keyspace,
    /// Desired cluster size as configured (raw, parsed leniently)
    pub cluster_size: Option<String>,
    /// Selector scoping the live-resource query
    pub label_selector: String,
    pub urls: UrlOverrides,
    pub heartbeat: HeartbeatConfig,
    pub member: MemberCommand,
}

impl BootSettings {
    pub fn new(discovery_url: &str) -> Self {
        Self {
            discovery_url: discovery_url.trim_end_matches('/').to_string(),
            keyspace: Keyspace::default(),
            cluster_size: None,
            label_selector: DEFAULT_LABEL_SELECTOR.to_string(),
            urls: UrlOverrides::default(),
            heartbeat: HeartbeatConfig::default(),
            member: MemberCommand::default(),
        }
    }

    /// URL a founding member bootstraps through:
    /// `{discovery_url}/v2/keys/{prefix}/discovery/{token}`
    pub fn discovery_endpoint(&self, token: &str) -> String {
        format!(
            "{}/v2/keys{}",
            self.discovery_url,
            self.keyspace.discovery_dir(token)
        )
    }
}
