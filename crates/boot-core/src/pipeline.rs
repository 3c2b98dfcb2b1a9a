//! The boot pipeline: decide, reconcile, register, launch, heartbeat.
//!
//! One attempt runs the stages in order and stops at the first error. A
//! failed attempt leaves no state that a rerun cannot handle: the self and
//! stale passes re-list members, and the heartbeat only runs while the
//! member process does.

use crate::cluster::ClusterAdmin;
use crate::config::BootSettings;
use crate::discovery::DiscoveryStore;
use crate::error::{BootError, Result};
use crate::heartbeat::Heartbeat;
use crate::identity::Identity;
use crate::join_mode::{determine_join_mode, resolve_desired_size, JoinMode};
use crate::member_env::{MemberEnv, MemberUrls};
use crate::reconcile::{reconcile, ReconcileReport};
use crate::registrar::{add_self, read_initial_cluster};
use crate::resources::ResourceLister;
use crate::supervisor::{MemberExit, MemberProcess};
use crate::token::DiscoveryToken;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Outcome of the decision stages, ready to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootPlan {
    pub mode: JoinMode,
    pub member_env: MemberEnv,
    /// Members removed before joining; `None` when founding a new cluster
    pub reconciled: Option<ReconcileReport>,
}

pub struct Bootstrapper {
    settings: BootSettings,
    identity: Identity,
    token: DiscoveryToken,
    discovery: Arc<dyn DiscoveryStore>,
    cluster: Arc<dyn ClusterAdmin>,
    resources: Arc<dyn ResourceLister>,
}

impl Bootstrapper {
    pub fn new(
        settings: BootSettings,
        identity: Identity,
        token: DiscoveryToken,
        discovery: Arc<dyn DiscoveryStore>,
        cluster: Arc<dyn ClusterAdmin>,
        resources: Arc<dyn ResourceLister>,
    ) -> Self {
        Self {
            settings,
            identity,
            token,
            discovery,
            cluster,
            resources,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Liveness key of this node.
    pub fn status_key(&self) -> String {
        self.settings
            .keyspace
            .status_key(self.token.as_str(), &self.identity.name)
    }

    /// Decide the join mode and prepare the member environment.
    ///
    /// Joining an existing cluster reconciles membership and registers this
    /// node before returning. Founding a new one makes no admin calls.
    pub async fn plan(&self) -> Result<BootPlan> {
        let token = self.token.as_str();
        let keys = &self.settings.keyspace;
        let name = self.identity.name.as_str();

        let desired = resolve_desired_size(
            self.discovery.as_ref(),
            self.settings.cluster_size.as_deref(),
            &keys.size_key(token),
        )
        .await?;
        let mode = determine_join_mode(self.discovery.as_ref(), &keys.status_dir(token), desired).await?;

        let urls = MemberUrls::resolve(&self.identity, &self.settings.urls);

        match mode {
            JoinMode::New => {
                let endpoint = self.settings.discovery_endpoint(token);
                info!(discovery = %endpoint, "Founding a new cluster through discovery");
                Ok(BootPlan {
                    mode,
                    member_env: MemberEnv::for_new_cluster(name, &urls, &endpoint),
                    reconciled: None,
                })
            }
            JoinMode::Existing => {
                let peer_urls = urls.advertise_peer_list();
                if peer_urls.is_empty() {
                    return Err(BootError::InvalidConfig(
                        "no advertised peer URL to register".to_string(),
                    ));
                }

                let report = reconcile(
                    self.cluster.as_ref(),
                    self.resources.as_ref(),
                    &self.identity,
                    &peer_urls,
                    &self.settings.label_selector,
                )
                .await?;
                let added = add_self(self.cluster.as_ref(), name, &peer_urls).await?;
                let initial_cluster =
                    read_initial_cluster(self.cluster.as_ref(), name, &added.id).await?;
                info!(initial_cluster = %initial_cluster, "Joining the running cluster");

                Ok(BootPlan {
                    mode,
                    member_env: MemberEnv::for_existing_cluster(name, &urls, &initial_cluster),
                    reconciled: Some(report),
                })
            }
        }
    }

    /// Start the member, keep the heartbeat going while it runs, and wait
    /// for it to exit or for `shutdown`.
    pub async fn launch<F>(&self, plan: &BootPlan, shutdown: F) -> Result<MemberExit>
    where
        F: Future<Output = ()>,
    {
        self.settings.heartbeat.validate()?;

        let process = MemberProcess::spawn(&self.settings.member, &plan.member_env)?;
        let heartbeat = Heartbeat::start(
            self.discovery.clone(),
            self.status_key(),
            self.settings.heartbeat.clone(),
        )?;

        let exit = process.wait_until(shutdown).await;
        heartbeat.stop().await;
        exit
    }

    /// Run one full boot attempt.
    pub async fn run<F>(&self, shutdown: F) -> Result<MemberExit>
    where
        F: Future<Output = ()>,
    {
        info!(
            name = %self.identity.name,
            ip = %self.identity.ip,
            namespace = %self.identity.namespace,
            "Booting cluster member"
        );
        self.settings.heartbeat.validate()?;
        let plan = self.plan().await?;
        self.launch(&plan, shutdown).await
    }
}
