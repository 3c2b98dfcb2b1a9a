//! Member registration and the initial-cluster string.

use crate::cluster::{ClusterAdmin, Member};
use crate::error::Result;
use tracing::info;

/// Add this node to the member list by its advertised peer URLs.
pub async fn add_self(
    cluster: &dyn ClusterAdmin,
    name: &str,
    advertise_peer_urls: &[String],
) -> Result<Member> {
    let member = cluster.add_member(advertise_peer_urls).await?;
    info!(
        id = %member.id,
        name,
        peer_urls = %advertise_peer_urls.join(","),
        "Member added"
    );
    Ok(member)
}

/// Build the `name=peerURL,...` list the member needs to join.
///
/// The member with `added_id` has no name until it starts, so its pairs use
/// `local_name`. Other unstarted members keep their empty name.
pub fn initial_cluster(members: &[Member], local_name: &str, added_id: &str) -> String {
    members
        .iter()
        .flat_map(|member| {
            let name = if member.id == added_id {
                local_name
            } else {
                member.name.as_str()
            };
            member
                .peer_urls
                .iter()
                .map(move |url| format!("{}={}", name, url))
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Re-read the member list and build the initial-cluster string.
pub async fn read_initial_cluster(
    cluster: &dyn ClusterAdmin,
    local_name: &str,
    added_id: &str,
) -> Result<String> {
    let members = cluster.list_members().await?;
    Ok(initial_cluster(&members, local_name, added_id))
}
