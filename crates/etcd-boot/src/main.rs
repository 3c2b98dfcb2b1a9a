//! etcd-boot: Bootstrap coordinator for one etcd cluster member.
//!
//! Decides whether this node founds a new cluster or joins the running one,
//! cleans up membership before joining, then runs etcd with the resulting
//! environment and keeps the node's liveness entry fresh while it runs.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use boot_core::config::DEFAULT_LABEL_SELECTOR;
use boot_core::error::EXIT_BOOT_FAILURE;
use boot_core::shutdown::shutdown_signal;
use boot_core::identity::{host_port, DEFAULT_CLIENT_PORT};
use boot_core::token::DEFAULT_TOKEN_FILE;
use boot_core::{
    BootError, BootSettings, Bootstrapper, DiscoveryToken, HeartbeatConfig, HttpClusterAdmin,
    HttpDiscovery, Identity, Keyspace, KubernetesPods, MemberCommand, MemberExit, UrlOverrides,
};

#[derive(Parser, Debug)]
#[command(name = "etcd-boot")]
#[command(about = "Bootstrap coordinator for etcd cluster members")]
struct Args {
    /// Host of the discovery endpoint
    #[arg(long, env = "DEIS_ETCD_DISCOVERY_SERVICE_HOST")]
    discovery_host: String,

    /// Port of the discovery endpoint
    #[arg(long, default_value_t = 2381, env = "DEIS_ETCD_DISCOVERY_SERVICE_PORT")]
    discovery_port: u16,

    /// Host of the running cluster's client service
    #[arg(long, env = "DEIS_ETCD_1_SERVICE_HOST")]
    cluster_host: String,

    /// Client port of the running cluster's service
    #[arg(long, default_value_t = DEFAULT_CLIENT_PORT, env = "DEIS_ETCD_1_SERVICE_PORT_CLIENT")]
    cluster_port: u16,

    /// Desired cluster size (falls back to the registered size, then 3)
    #[arg(long, env = "DEIS_ETCD_CLUSTER_SIZE")]
    cluster_size: Option<String>,

    /// File holding the discovery token
    #[arg(long, default_value = DEFAULT_TOKEN_FILE, env = "DEIS_ETCD_TOKEN_FILE")]
    token_file: PathBuf,

    /// Label selector matching the pods that back members
    #[arg(long, default_value = DEFAULT_LABEL_SELECTOR, env = "DEIS_ETCD_LABEL_SELECTOR")]
    label_selector: String,

    /// Namespace prefix of bootstrap keys on the discovery endpoint
    #[arg(long, default_value = "deis", env = "DEIS_ETCD_KEY_PREFIX")]
    key_prefix: String,

    #[arg(long, env = "ETCD_LISTEN_PEER_URLS")]
    listen_peer_urls: Option<String>,

    #[arg(long, env = "ETCD_INITIAL_ADVERTISE_PEER_URLS")]
    advertise_peer_urls: Option<String>,

    #[arg(long, env = "ETCD_LISTEN_CLIENT_URLS")]
    listen_client_urls: Option<String>,

    #[arg(long, env = "ETCD_ADVERTISE_CLIENT_URLS")]
    advertise_client_urls: Option<String>,

    /// Seconds between liveness writes
    #[arg(long, default_value_t = 60, env = "DEIS_ETCD_HEARTBEAT_INTERVAL")]
    heartbeat_interval: u64,

    /// Seconds a liveness entry stays valid
    #[arg(long, default_value_t = 7200, env = "DEIS_ETCD_HEARTBEAT_TTL")]
    heartbeat_ttl: u64,

    /// Seconds allowed for each API request
    #[arg(long, default_value_t = 10)]
    request_timeout: u64,

    /// Member binary to run
    #[arg(long, default_value = "etcd", env = "DEIS_ETCD_BINARY")]
    member_binary: String,

    /// Extra arguments passed to the member binary (after `--`)
    #[arg(last = true)]
    member_args: Vec<String>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

impl Args {
    fn settings(&self) -> BootSettings {
        let discovery_url = format!("http://{}", host_port(&self.discovery_host, self.discovery_port));
        let mut settings = BootSettings::new(&discovery_url);

        settings.keyspace = Keyspace::new(&self.key_prefix);
        settings.cluster_size = self.cluster_size.clone();
        settings.label_selector = self.label_selector.clone();
        settings.urls = UrlOverrides {
            listen_peer_urls: self.listen_peer_urls.clone(),
            advertise_peer_urls: self.advertise_peer_urls.clone(),
            listen_client_urls: self.listen_client_urls.clone(),
            advertise_client_urls: self.advertise_client_urls.clone(),
        };
        settings.heartbeat = HeartbeatConfig {
            period: Duration::from_secs(self.heartbeat_interval),
            ttl: Duration::from_secs(self.heartbeat_ttl),
            ..HeartbeatConfig::default()
        };
        settings.member = MemberCommand::new(&self.member_binary).with_args(self.member_args.clone());
        settings
    }
}

async fn run(args: Args) -> Result<MemberExit> {
    let identity = Identity::from_env()?;
    let token = DiscoveryToken::read(&args.token_file)?;
    let settings = args.settings();
    let timeout = Duration::from_secs(args.request_timeout);

    info!("Node: {} ({}), namespace {}", identity.name, identity.ip, identity.namespace);
    info!("Discovery endpoint: {}", settings.discovery_url);

    let discovery = HttpDiscovery::new(&settings.discovery_url, timeout).map_err(BootError::from)?;
    let cluster_url = format!("http://{}", host_port(&args.cluster_host, args.cluster_port));
    let cluster = HttpClusterAdmin::new(&cluster_url, timeout).map_err(BootError::from)?;
    let resources =
        KubernetesPods::in_cluster(|key| std::env::var(key).ok(), timeout).map_err(BootError::from)?;

    let bootstrapper = Bootstrapper::new(
        settings,
        identity,
        token,
        Arc::new(discovery),
        Arc::new(cluster),
        Arc::new(resources),
    );

    Ok(bootstrapper.run(shutdown_signal()).await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,etcd_boot=debug,boot_core=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting etcd-boot");

    match run(args).await {
        Ok(MemberExit::Exited) => {
            info!("Member exited, shutting down");
            ExitCode::SUCCESS
        }
        Ok(MemberExit::Interrupted) => {
            info!("etcd-boot shut down");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Boot failed: {:#}", e);
            let code = e
                .downcast_ref::<BootError>()
                .map(BootError::exit_code)
                .unwrap_or(EXIT_BOOT_FAILURE);
            ExitCode::from(code)
        }
    }
}
