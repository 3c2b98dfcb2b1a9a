//! Environment handed to the member process.
//!
//! The pipeline assembles everything the member needs into a `MemberEnv` and
//! passes it to the launch call. The coordinator's own environment is never
//! modified; the child inherits it, minus the variables belonging to the
//! other join mode, and gets these variables on top.

use crate::identity::{host_port, Identity};
use crate::join_mode::JoinMode;
use std::collections::{BTreeMap, BTreeSet};

pub const ETCD_NAME: &str = "ETCD_NAME";
pub const ETCD_INITIAL_CLUSTER_STATE: &str = "ETCD_INITIAL_CLUSTER_STATE";
pub const ETCD_INITIAL_CLUSTER: &str = "ETCD_INITIAL_CLUSTER";
pub const ETCD_DISCOVERY: &str = "ETCD_DISCOVERY";
pub const ETCD_LISTEN_PEER_URLS: &str = "ETCD_LISTEN_PEER_URLS";
pub const ETCD_INITIAL_ADVERTISE_PEER_URLS: &str = "ETCD_INITIAL_ADVERTISE_PEER_URLS";
pub const ETCD_LISTEN_CLIENT_URLS: &str = "ETCD_LISTEN_CLIENT_URLS";
pub const ETCD_ADVERTISE_CLIENT_URLS: &str = "ETCD_ADVERTISE_CLIENT_URLS";

/// Explicitly configured URL lists (comma-separated), overriding defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlOverrides {
    pub listen_peer_urls: Option<String>,
    pub advertise_peer_urls: Option<String>,
    pub listen_client_urls: Option<String>,
    pub advertise_client_urls: Option<String>,
}

/// Resolved peer and client URL lists of the local member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberUrls {
    pub listen_peer: String,
    pub advertise_peer: String,
    pub listen_client: String,
    pub advertise_client: String,
}

impl MemberUrls {
    /// Defaults derived from identity; peer traffic uses the node's own IP.
    pub fn resolve(identity: &Identity, overrides: &UrlOverrides) -> Self {
        let peer = identity.peer_url();
        let client = identity.client_url();
        let loopback = format!("http://{}", host_port("127.0.0.1", identity.client_port));

        Self {
            listen_peer: overrides.listen_peer_urls.clone().unwrap_or_else(|| peer.clone()),
            advertise_peer: overrides.advertise_peer_urls.clone().unwrap_or(peer),
            listen_client: overrides
                .listen_client_urls
                .clone()
                .unwrap_or_else(|| format!("{},{}", client, loopback)),
            advertise_client: overrides.advertise_client_urls.clone().unwrap_or(client),
        }
    }

    /// Advertised peer URLs as a list, for member registration.
    pub fn advertise_peer_list(&self) -> Vec<String> {
        split_urls(&self.advertise_peer)
    }
}

fn split_urls(urls: &str) -> Vec<String> {
    urls.split(',')
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(String::from)
        .collect()
}

/// Variables set for the member process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberEnv {
    vars: BTreeMap<String, String>,
    removed: BTreeSet<String>,
}

impl MemberEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables every member gets, whatever the join mode.
    pub fn base(name: &str, urls: &MemberUrls, mode: JoinMode) -> Self {
        let mut env = Self::new();
        env.set(ETCD_NAME, name);
        env.set(ETCD_INITIAL_CLUSTER_STATE, mode.as_str());
        env.set(ETCD_LISTEN_PEER_URLS, &urls.listen_peer);
        env.set(ETCD_INITIAL_ADVERTISE_PEER_URLS, &urls.advertise_peer);
        env.set(ETCD_LISTEN_CLIENT_URLS, &urls.listen_client);
        env.set(ETCD_ADVERTISE_CLIENT_URLS, &urls.advertise_client);
        env
    }

    /// Environment for founding a cluster through the discovery endpoint.
    pub fn for_new_cluster(name: &str, urls: &MemberUrls, discovery_url: &str) -> Self {
        let mut env = Self::base(name, urls, JoinMode::New);
        env.set(ETCD_DISCOVERY, discovery_url);
        env.unset(ETCD_INITIAL_CLUSTER);
        env
    }

    /// Environment for joining a running cluster.
    pub fn for_existing_cluster(name: &str, urls: &MemberUrls, initial_cluster: &str) -> Self {
        let mut env = Self::base(name, urls, JoinMode::Existing);
        env.set(ETCD_INITIAL_CLUSTER, initial_cluster);
        env.unset(ETCD_DISCOVERY);
        env
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.removed.remove(key);
        self.vars.insert(key.to_string(), value.to_string());
    }

    /// Keep `key` out of the child's environment, even if inherited.
    pub fn unset(&mut self, key: &str) {
        self.vars.remove(key);
        self.removed.insert(key.to_string());
    }

    /// Variables stripped from the inherited environment.
    pub fn removed(&self) -> impl Iterator<Item = &str> {
        self.removed.iter().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// `KEY=value` pairs on one line.
    pub fn render(&self) -> String {
        render_pairs(self.iter())
    }

    /// The environment the child ends up with when started from
    /// `inherited`.
    pub fn merged<I>(&self, inherited: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut merged: BTreeMap<String, String> = inherited
            .into_iter()
            .filter(|(k, _)| !self.removed.contains(k))
            .collect();
        merged.extend(self.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// [`merged`](Self::merged) as `KEY=value` pairs on one line, for the
    /// pre-launch log.
    pub fn render_over<I>(&self, inherited: I) -> String
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let merged = self.merged(inherited);
        render_pairs(merged.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}

fn render_pairs<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    pairs
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}
