//! End-to-end tests for the boot pipeline.
//!
//! Runs full boot attempts against in-memory discovery, cluster and resource
//! collaborators, with `sh` standing in for the member binary.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use boot_core::cluster::AdminCall;
use boot_core::{
    BootError, BootSettings, Bootstrapper, DiscoveryToken, HeartbeatConfig, Identity,
    InMemoryCluster, InMemoryDiscovery, JoinMode, Member, MemberCommand, MemberExit,
    StaticResources,
};
use tokio::time::{sleep, timeout};

const STATUS_DIR: &str = "/deis/status/tok";
const SELF_STATUS_KEY: &str = "/deis/status/tok/etcd-new";

/// One node about to boot, with its collaborators.
struct Node {
    discovery: Arc<InMemoryDiscovery>,
    cluster: Arc<InMemoryCluster>,
    resources: Arc<StaticResources>,
    settings: BootSettings,
}

impl Node {
    fn new(members: Vec<Member>, live: &[&str]) -> Self {
        let mut settings = BootSettings::new("http://10.0.0.10:2381");
        settings.cluster_size = Some("3".to_string());
        settings.heartbeat = HeartbeatConfig {
            period: Duration::from_millis(20),
            ttl: Duration::from_secs(7200),
            write_timeout: Duration::from_millis(100),
        };

        Self {
            discovery: Arc::new(InMemoryDiscovery::new()),
            cluster: Arc::new(InMemoryCluster::with_members(members)),
            resources: Arc::new(StaticResources::new(live.iter().copied())),
            settings,
        }
    }

    /// Mark `names` as having a live status entry.
    fn with_status(self, names: &[&str]) -> Self {
        for name in names {
            self.discovery
                .insert(&format!("{}/{}", STATUS_DIR, name), "2026-01-01T00:00:00Z");
        }
        self
    }

    /// Use `sh -c script` as the member binary.
    fn member_script(mut self, script: &str) -> Self {
        self.settings.member = MemberCommand::new("sh").with_args(["-c", script]);
        self
    }

    fn bootstrapper(&self) -> Bootstrapper {
        Bootstrapper::new(
            self.settings.clone(),
            Identity::new("etcd-new", "10.0.0.9").with_namespace("deis"),
            DiscoveryToken::new("tok").unwrap(),
            self.discovery.clone(),
            self.cluster.clone(),
            self.resources.clone(),
        )
    }

    async fn boot(&self) -> Result<MemberExit, BootError> {
        timeout(
            Duration::from_secs(10),
            self.bootstrapper().run(std::future::pending::<()>()),
        )
        .await
        .expect("boot should finish")
    }

    fn heartbeat_count(&self) -> usize {
        self.discovery
            .writes()
            .iter()
            .filter(|w| w.key == SELF_STATUS_KEY)
            .count()
    }
}

fn running_members() -> Vec<Member> {
    vec![
        Member::new("a1", "etcd-a", "http://10.0.0.1:2380"),
        Member::new("b2", "etcd-b", "http://10.0.0.2:2380"),
    ]
}

// ============================================================================
// Founding a new cluster
// ============================================================================

#[tokio::test]
async fn test_too_few_live_entries_founds_new_cluster() {
    let node = Node::new(Vec::new(), &["etcd-new"])
        .with_status(&["etcd-a", "etcd-b"])
        .member_script(
            r#"[ "$ETCD_INITIAL_CLUSTER_STATE" = new ] \
            && [ "$ETCD_DISCOVERY" = http://10.0.0.10:2381/v2/keys/deis/discovery/tok ] \
            && [ -z "$ETCD_INITIAL_CLUSTER" ] \
            && sleep 0.3"#,
        );

    let exit = node.boot().await.unwrap();

    assert_eq!(exit, MemberExit::Exited);
    assert!(node.heartbeat_count() >= 1, "heartbeat should run while the member runs");
    assert!(node.cluster.calls().is_empty());
    assert_eq!(node.cluster.list_count(), 0);
}

#[tokio::test]
async fn test_missing_status_directory_founds_new_cluster() {
    let node = Node::new(Vec::new(), &["etcd-new"]);

    let plan = node.bootstrapper().plan().await.unwrap();

    assert_eq!(plan.mode, JoinMode::New);
}

// ============================================================================
// Joining a running cluster
// ============================================================================

#[tokio::test]
async fn test_rejoin_removes_previous_record_before_adding() {
    let mut members = running_members();
    members.push(Member::new("e5", "etcd-new", "http://10.0.0.7:2380"));
    let node = Node::new(members, &["etcd-a", "etcd-b", "etcd-new"])
        .with_status(&["etcd-a", "etcd-b", "etcd-new"])
        .member_script(
            r#"[ "$ETCD_INITIAL_CLUSTER_STATE" = existing ] \
            && [ "$ETCD_INITIAL_CLUSTER" = "etcd-a=http://10.0.0.1:2380,etcd-b=http://10.0.0.2:2380,etcd-new=http://10.0.0.9:2380" ]"#,
        );

    let exit = node.boot().await.unwrap();

    assert_eq!(exit, MemberExit::Exited);
    let calls = node.cluster.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], AdminCall::Remove { id: "e5".into() });
    assert!(matches!(
        &calls[1],
        AdminCall::Add { peer_urls, .. } if peer_urls == &vec!["http://10.0.0.9:2380".to_string()]
    ));
}

#[tokio::test]
async fn test_member_without_resource_is_evicted() {
    let mut members = running_members();
    members.push(Member::new("c3", "etcd-c", "http://10.0.0.3:2380"));
    let node = Node::new(members, &["etcd-a", "etcd-b", "etcd-new"])
        .with_status(&["etcd-a", "etcd-b", "etcd-c"]);

    let plan = node.bootstrapper().plan().await.unwrap();

    assert_eq!(plan.mode, JoinMode::Existing);
    let report = plan.reconciled.unwrap();
    assert!(report.removed_self.is_empty());
    assert_eq!(report.removed_stale.len(), 1);
    assert_eq!(report.removed_stale[0].name, "etcd-c");

    let names: Vec<_> = node.cluster.members().into_iter().map(|m| m.id).collect();
    assert!(names.contains(&"a1".to_string()));
    assert!(names.contains(&"b2".to_string()));
    assert!(!names.contains(&"c3".to_string()));
    assert_eq!(node.resources.queries(), vec![("deis".to_string(), "name=deis-etcd-1".to_string())]);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_malformed_status_node_aborts_before_admin_calls() {
    let node = Node::new(running_members(), &["etcd-a", "etcd-b", "etcd-new"]);
    node.discovery.insert(STATUS_DIR, "not a directory");

    let result = node.boot().await;

    assert!(matches!(result, Err(BootError::MalformedDiscoveryState(_))));
    assert_eq!(node.cluster.list_count(), 0);
    assert!(node.discovery.writes().is_empty());
}

#[tokio::test]
async fn test_member_crash_stops_heartbeat() {
    let node = Node::new(Vec::new(), &["etcd-new"]).member_script("sleep 0.1; exit 7");

    let result = node.boot().await;

    assert!(matches!(result, Err(BootError::ChildProcessFailure(_))));
    assert_eq!(result.unwrap_err().exit_code(), 2);

    let after_exit = node.heartbeat_count();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(node.heartbeat_count(), after_exit);
}

#[tokio::test]
async fn test_shutdown_interrupts_member() {
    let node = Node::new(Vec::new(), &["etcd-new"]).member_script("sleep 30");

    let exit = timeout(
        Duration::from_secs(5),
        node.bootstrapper().run(sleep(Duration::from_millis(100))),
    )
    .await
    .expect("shutdown should end the boot")
    .unwrap();

    assert_eq!(exit, MemberExit::Interrupted);
}
