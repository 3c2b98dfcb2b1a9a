//! In-memory cluster for testing.

use super::{AdminError, ClusterAdmin, Member, Result};
use async_trait::async_trait;
use std::sync::Mutex;

/// A mutating call made against the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCall {
    Add { id: String, peer_urls: Vec<String> },
    Remove { id: String },
}

#[derive(Default)]
struct State {
    members: Vec<Member>,
    calls: Vec<AdminCall>,
    lists: usize,
    next_id: u64,
    unavailable: bool,
}

pub struct InMemoryCluster {
    state: Mutex<State>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 0x100,
                ..Default::default()
            }),
        }
    }

    pub fn with_members(members: Vec<Member>) -> Self {
        let cluster = Self::new();
        cluster.state.lock().unwrap().members = members;
        cluster
    }

    /// Make every call fail as if quorum were lost.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    pub fn members(&self) -> Vec<Member> {
        self.state.lock().unwrap().members.clone()
    }

    /// Add and remove calls in order.
    pub fn calls(&self) -> Vec<AdminCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of list calls made so far.
    pub fn list_count(&self) -> usize {
        self.state.lock().unwrap().lists
    }

    fn check_available(state: &State) -> Result<()> {
        if state.unavailable {
            Err(AdminError::Request("no leader".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterAdmin for InMemoryCluster {
    async fn list_members(&self) -> Result<Vec<Member>> {
        let mut state = self.state.lock().unwrap();
        state.lists += 1;
        Self::check_available(&state)?;
        Ok(state.members.clone())
    }

    async fn add_member(&self, peer_urls: &[String]) -> Result<Member> {
        let mut state = self.state.lock().unwrap();
        Self::check_available(&state)?;

        let duplicate = state
            .members
            .iter()
            .any(|m| m.peer_urls.iter().any(|u| peer_urls.contains(u)));
        if duplicate {
            return Err(AdminError::Conflict(peer_urls.join(",")));
        }

        let id = format!("{:x}", state.next_id);
        state.next_id += 1;

        let member = Member {
            id: id.clone(),
            name: String::new(),
            peer_urls: peer_urls.to_vec(),
            client_urls: Vec::new(),
        };
        state.members.push(member.clone());
        state.calls.push(AdminCall::Add {
            id,
            peer_urls: peer_urls.to_vec(),
        });
        Ok(member)
    }

    async fn remove_member(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_available(&state)?;

        state.calls.push(AdminCall::Remove { id: id.to_string() });
        let before = state.members.len();
        state.members.retain(|m| m.id != id);
        if state.members.len() == before {
            return Err(AdminError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
