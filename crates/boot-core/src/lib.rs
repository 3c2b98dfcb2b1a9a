//! boot-core: Bootstrap coordination for members of an etcd cluster.
//!
//! This crate provides:
//! - Join-mode decision from liveness entries on a discovery endpoint
//! - Membership reconciliation against live compute resources
//! - Member registration and the initial-cluster string
//! - Member process supervision with a liveness heartbeat
//! - Discovery, cluster admin and resource lister trait abstractions

pub mod cluster;
pub mod config;
pub mod discovery;
pub mod error;
pub mod heartbeat;
pub mod helper;
pub mod identity;
pub mod join_mode;
pub mod member_env;
pub mod pipeline;
pub mod reconcile;
pub mod registrar;
pub mod resources;
pub mod shutdown;
pub mod supervisor;
pub mod token;

pub use cluster::{ClusterAdmin, HttpClusterAdmin, InMemoryCluster, Member};
pub use config::BootSettings;
pub use discovery::{DiscoveryStore, HttpDiscovery, InMemoryDiscovery, Keyspace};
pub use error::{BootError, ConfigParseWarning, Result};
pub use heartbeat::{Heartbeat, HeartbeatConfig};
pub use identity::Identity;
pub use join_mode::JoinMode;
pub use member_env::{MemberEnv, MemberUrls, UrlOverrides};
pub use pipeline::{BootPlan, Bootstrapper};
pub use resources::{KubernetesPods, ResourceLister, StaticResources};
pub use supervisor::{MemberCommand, MemberExit, MemberProcess};
pub use token::DiscoveryToken;
