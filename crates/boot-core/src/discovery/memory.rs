//! In-memory discovery store for testing.
//!
//! Keys are stored flat; directories are implied by key prefixes or created
//! explicitly. TTLs are recorded but never expire.

use super::{DiscoveryError, DiscoveryStore, Node, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

/// A successful `set` call, kept for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub key: String,
    pub value: String,
    pub ttl: Option<Duration>,
}

#[derive(Default)]
struct State {
    values: BTreeMap<String, String>,
    dirs: BTreeSet<String>,
    writes: Vec<RecordedWrite>,
    gets: usize,
    failing_writes: usize,
    unavailable: bool,
}

pub struct InMemoryDiscovery {
    state: Mutex<State>,
}

impl InMemoryDiscovery {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    fn normalize(key: &str) -> String {
        format!("/{}", key.trim_matches('/'))
    }

    /// Store a value directly, bypassing failure injection.
    pub fn insert(&self, key: &str, value: &str) {
        let mut state = self.state.lock().unwrap();
        state.values.insert(Self::normalize(key), value.to_string());
    }

    /// Create an empty directory.
    pub fn insert_dir(&self, key: &str) {
        let mut state = self.state.lock().unwrap();
        state.dirs.insert(Self::normalize(key));
    }

    /// Make every call fail as if the endpoint were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    /// Fail the next `count` calls to `set`.
    pub fn fail_next_writes(&self, count: usize) {
        self.state.lock().unwrap().failing_writes = count;
    }

    /// Successful `set` calls in order.
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.state.lock().unwrap().writes.clone()
    }

    /// Number of `get` calls made so far.
    pub fn get_count(&self) -> usize {
        self.state.lock().unwrap().gets
    }

    fn check_available(state: &State) -> Result<()> {
        if state.unavailable {
            Err(DiscoveryError::Request("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    fn is_dir(state: &State, key: &str) -> bool {
        let prefix = format!("{}/", key);
        state.dirs.contains(key)
            || state.values.keys().any(|k| k.starts_with(&prefix))
            || state.dirs.iter().any(|d| d.starts_with(&prefix))
    }

    fn build_dir(state: &State, key: &str, recursive: bool) -> Node {
        let prefix = if key == "/" {
            "/".to_string()
        } else {
            format!("{}/", key)
        };

        let children: BTreeSet<String> = state
            .values
            .keys()
            .chain(state.dirs.iter())
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .filter(|name| !name.is_empty())
            .map(|name| format!("{}{}", prefix, name))
            .collect();

        let nodes = children
            .into_iter()
            .map(|child| match state.values.get(&child) {
                Some(value) => Node::leaf(child, value.clone()),
                None if recursive => Self::build_dir(state, &child, true),
                None => Node::directory(child, Vec::new()),
            })
            .collect();

        Node::directory(key, nodes)
    }
}

impl Default for InMemoryDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiscoveryStore for InMemoryDiscovery {
    async fn get(&self, key: &str, recursive: bool) -> Result<Node> {
        let key = Self::normalize(key);
        let mut state = self.state.lock().unwrap();
        state.gets += 1;
        Self::check_available(&state)?;

        if let Some(value) = state.values.get(&key) {
            return Ok(Node::leaf(key.clone(), value.clone()));
        }
        if Self::is_dir(&state, &key) {
            return Ok(Self::build_dir(&state, &key, recursive));
        }
        Err(DiscoveryError::NotFound(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let key = Self::normalize(key);
        let mut state = self.state.lock().unwrap();
        Self::check_available(&state)?;

        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(DiscoveryError::Request(format!("injected failure on {}", key)));
        }

        state.values.insert(key.clone(), value.to_string());
        state.writes.push(RecordedWrite {
            key,
            value: value.to_string(),
            ttl,
        });
        Ok(())
    }

    async fn create(&self, key: &str, value: &str) -> Result<()> {
        let key = Self::normalize(key);
        let mut state = self.state.lock().unwrap();
        Self::check_available(&state)?;

        if state.values.contains_key(&key) {
            return Err(DiscoveryError::AlreadyExists(key));
        }
        state.values.insert(key, value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = Self::normalize(key);
        let mut state = self.state.lock().unwrap();
        Self::check_available(&state)?;

        state
            .values
            .remove(&key)
            .map(|_| ())
            .ok_or(DiscoveryError::NotFound(key))
    }
}
