//! Membership reconciliation before an existing-cluster join.
//!
//! Two passes, in order:
//! 1. Remove any member carrying this node's name or one of its advertised
//!    peer URLs. It is a record left by an earlier instance of this node that
//!    no longer runs, possibly one that was added but never started.
//! 2. Remove every member whose backing resource is gone. A dead member keeps
//!    its vote, and enough of them make a majority of the original set
//!    unreachable, which stalls leader election.
//!
//! Both passes re-list members from the cluster, so running them again after
//! a restart only acts on what is still stale.

use crate::cluster::{AdminError, ClusterAdmin, Member};
use crate::error::{BootError, Result};
use crate::identity::Identity;
use crate::resources::ResourceLister;
use std::collections::HashSet;
use tracing::{debug, info};

/// Members removed by a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub removed_self: Vec<Member>,
    pub removed_stale: Vec<Member>,
}

/// Remove a member, treating "already gone" as done.
async fn remove(cluster: &dyn ClusterAdmin, member: &Member) -> Result<()> {
    match cluster.remove_member(&member.id).await {
        Ok(()) => Ok(()),
        Err(AdminError::NotFound(_)) => {
            debug!("Member {} ({}) was already removed", member.id, member.name);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Whether `member` is a record of this node: same name, or an overlapping
/// peer URL.
fn is_previous_self(member: &Member, name: &str, peer_urls: &[String]) -> bool {
    (!member.name.is_empty() && member.name == name)
        || member.peer_urls.iter().any(|url| peer_urls.contains(url))
}

/// Remove every member named `name` or advertising one of `peer_urls`.
/// No match is not an error.
pub async fn remove_previous_self(
    cluster: &dyn ClusterAdmin,
    name: &str,
    peer_urls: &[String],
) -> Result<Vec<Member>> {
    let members = cluster.list_members().await?;

    let mut removed = Vec::new();
    for member in members
        .into_iter()
        .filter(|m| is_previous_self(m, name, peer_urls))
    {
        remove(cluster, &member).await?;
        info!(
            id = %member.id,
            name = %member.name,
            peer_urls = %member.peer_urls.join(","),
            "Removed previous member record of this node"
        );
        removed.push(member);
    }

    if removed.is_empty() {
        debug!("No previous member record for {}", name);
    }
    Ok(removed)
}

/// Members whose name is not a live resource.
///
/// Members without a name have been added but not started yet. Once this
/// node's own records are gone, they belong to a peer that is joining right
/// now and are never stale.
pub fn stale_members(members: &[Member], live: &HashSet<String>) -> Vec<Member> {
    members
        .iter()
        .filter(|m| !m.name.is_empty() && !live.contains(&m.name))
        .cloned()
        .collect()
}

/// Remove members whose backing resource no longer exists in the scope
/// `namespace` + `selector`.
///
/// The scope must contain `local_name`. If it does not, the selector or
/// namespace points at the wrong resources, and trusting it would evict
/// healthy members.
pub async fn remove_stale_members(
    cluster: &dyn ClusterAdmin,
    resources: &dyn ResourceLister,
    namespace: &str,
    selector: &str,
    local_name: &str,
) -> Result<Vec<Member>> {
    if selector.trim().is_empty() {
        return Err(BootError::InvalidConfig(
            "label selector for member resources is empty".to_string(),
        ));
    }

    let members = cluster.list_members().await?;
    let live = resources.live_names(namespace, selector).await?;
    if !live.contains(local_name) {
        return Err(BootError::InvalidConfig(format!(
            "{} is not among the resources matching '{}' in namespace '{}'",
            local_name, selector, namespace
        )));
    }

    let stale = stale_members(&members, &live);
    for member in &stale {
        remove(cluster, member).await?;
        info!(id = %member.id, name = %member.name, "Removed stale member");
    }

    debug!(
        "{} member(s) checked against {} live resource(s), {} removed",
        members.len(),
        live.len(),
        stale.len()
    );
    Ok(stale)
}

/// Run both reconciliation passes for `identity`, which advertises
/// `peer_urls`.
pub async fn reconcile(
    cluster: &dyn ClusterAdmin,
    resources: &dyn ResourceLister,
    identity: &Identity,
    peer_urls: &[String],
    selector: &str,
) -> Result<ReconcileReport> {
    let removed_self = remove_previous_self(cluster, &identity.name, peer_urls).await?;
    let removed_stale = remove_stale_members(
        cluster,
        resources,
        &identity.namespace,
        selector,
        &identity.name,
    )
    .await?;

    info!(
        removed_self = removed_self.len(),
        removed_stale = removed_stale.len(),
        "Membership reconciled"
    );
    Ok(ReconcileReport {
        removed_self,
        removed_stale,
    })
}
