//! Local identity attributes of this node.
//!
//! Read from the environment the orchestrator provides (downward API
//! variables and service port variables). Values are looked up through a
//! closure so tests can supply a map instead of the process environment.

use crate::error::{BootError, Result};

pub const DEFAULT_PEER_PORT: u16 = 2380;
pub const DEFAULT_CLIENT_PORT: u16 = 2379;
pub const DEFAULT_NAMESPACE: &str = "default";

/// Who this node is and where it listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Node name; doubles as the member name and the backing resource name
    pub name: String,
    /// Address other members reach this node on
    pub ip: String,
    /// Namespace of the backing resource
    pub namespace: String,
    pub peer_port: u16,
    pub client_port: u16,
}

impl Identity {
    pub fn new(name: &str, ip: &str) -> Self {
        Self {
            name: name.to_string(),
            ip: ip.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            peer_port: DEFAULT_PEER_PORT,
            client_port: DEFAULT_CLIENT_PORT,
        }
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    /// Resolve identity from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve identity through `lookup`.
    ///
    /// Recognized variables, first non-empty wins:
    /// - name: `MY_NAME`, `HOSTNAME`
    /// - ip: `MY_IP`, `POD_IP`
    /// - namespace: `MY_NAMESPACE`, `POD_NAMESPACE` (default `default`)
    /// - peer port: `MY_PORT_PEER`, `DEIS_ETCD_1_SERVICE_PORT_PEER` (default 2380)
    /// - client port: `MY_PORT_CLIENT`, `DEIS_ETCD_1_SERVICE_PORT_CLIENT` (default 2379)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| lookup(k))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };

        let name = first(&["MY_NAME", "HOSTNAME"])
            .ok_or_else(|| BootError::IdentityUnavailable("no node name (MY_NAME, HOSTNAME)".into()))?;
        let ip = first(&["MY_IP", "POD_IP"])
            .ok_or_else(|| BootError::IdentityUnavailable("no node IP (MY_IP, POD_IP)".into()))?;
        let namespace = first(&["MY_NAMESPACE", "POD_NAMESPACE"])
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        let peer_port = parse_port(
            first(&["MY_PORT_PEER", "DEIS_ETCD_1_SERVICE_PORT_PEER"]),
            DEFAULT_PEER_PORT,
        )?;
        let client_port = parse_port(
            first(&["MY_PORT_CLIENT", "DEIS_ETCD_1_SERVICE_PORT_CLIENT"]),
            DEFAULT_CLIENT_PORT,
        )?;

        Ok(Self {
            name,
            ip,
            namespace,
            peer_port,
            client_port,
        })
    }

    /// Peer URL other members use to reach this node.
    pub fn peer_url(&self) -> String {
        format!("http://{}", host_port(&self.ip, self.peer_port))
    }

    /// Client URL clients use to reach this node.
    pub fn client_url(&self) -> String {
        format!("http://{}", host_port(&self.ip, self.client_port))
    }
}

fn parse_port(raw: Option<String>, default: u16) -> Result<u16> {
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| BootError::IdentityUnavailable(format!("invalid port '{}'", raw))),
    }
}

/// `host:port`, bracketing IPv6 literals.
pub fn host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
