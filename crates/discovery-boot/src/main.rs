//! discovery-boot: Runs the single-node discovery endpoint for an etcd cluster.
//!
//! Starts a standalone etcd on this node's IP, waits for it to answer, and
//! registers the desired cluster size under the cluster token. Then blocks
//! on the store process.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use boot_core::error::EXIT_BOOT_FAILURE;
use boot_core::shutdown::shutdown_signal;
use boot_core::helper::{
    register_size, store_command, wait_until_reachable, RetryConfig, DEFAULT_HELPER_CLIENT_PORT,
};
use boot_core::identity::host_port;
use boot_core::join_mode::desired_size_or_default;
use boot_core::token::DEFAULT_TOKEN_FILE;
use boot_core::{BootError, DiscoveryToken, HttpDiscovery, Keyspace, MemberEnv, MemberExit, MemberProcess};

#[derive(Parser, Debug)]
#[command(name = "discovery-boot")]
#[command(about = "Discovery endpoint for bootstrapping etcd clusters")]
struct Args {
    /// Address to advertise and listen on (pod IP)
    #[arg(long, env = "POD_IP")]
    ip: Option<String>,

    /// Client port of the discovery store
    #[arg(long, default_value_t = DEFAULT_HELPER_CLIENT_PORT, env = "DEIS_ETCD_CLIENT_PORT")]
    port: u16,

    /// Cluster size to register for members
    #[arg(long, default_value = "3", env = "DEIS_ETCD_CLUSTER_SIZE")]
    cluster_size: String,

    /// File holding the discovery token
    #[arg(long, default_value = DEFAULT_TOKEN_FILE, env = "DEIS_ETCD_TOKEN_FILE")]
    token_file: PathBuf,

    /// Namespace prefix of bootstrap keys
    #[arg(long, default_value = "deis", env = "DEIS_ETCD_KEY_PREFIX")]
    key_prefix: String,

    /// Store binary to run
    #[arg(long, default_value = "etcd", env = "DEIS_ETCD_BINARY")]
    store_binary: String,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

impl Args {
    /// `MY_IP` takes precedence over the pod IP.
    fn resolve_ip(&self) -> Option<String> {
        std::env::var("MY_IP")
            .ok()
            .or_else(|| self.ip.clone())
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty())
    }
}

async fn run(args: Args) -> Result<MemberExit> {
    let ip = args
        .resolve_ip()
        .ok_or_else(|| BootError::IdentityUnavailable("no IP address (MY_IP, POD_IP)".into()))?;
    let keyspace = Keyspace::new(&args.key_prefix);
    let size = desired_size_or_default(&args.cluster_size);

    let command = store_command(&args.store_binary, &ip, args.port);
    let process = MemberProcess::spawn(&command, &MemberEnv::new())?;

    let store_url = format!("http://{}", host_port(&ip, args.port));
    let store = HttpDiscovery::new(&store_url, Duration::from_secs(5)).map_err(BootError::from)?;
    wait_until_reachable(&store, &format!("/{}", keyspace.prefix()), &RetryConfig::default()).await?;

    let token = DiscoveryToken::read(&args.token_file)?;
    register_size(&store, &keyspace, token.as_str(), size).await;

    info!("Discovery endpoint ready at {}", store_url);
    Ok(process.wait_until(shutdown_signal()).await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,discovery_boot=debug,boot_core=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting discovery-boot");

    match run(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Discovery endpoint failed: {:#}", e);
            let code = e
                .downcast_ref::<BootError>()
                .map(BootError::exit_code)
                .unwrap_or(EXIT_BOOT_FAILURE);
            ExitCode::from(code)
        }
    }
}
