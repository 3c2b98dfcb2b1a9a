//! Bring-up of the single-node discovery endpoint.
//!
//! The helper runs a standalone store process, waits until it answers, and
//! registers the desired cluster size under the cluster's token so that
//! members can read it.

use crate::discovery::{DiscoveryError, DiscoveryStore, Keyspace};
use crate::error::Result;
use crate::identity::host_port;
use crate::supervisor::MemberCommand;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Client port of the discovery endpoint.
pub const DEFAULT_HELPER_CLIENT_PORT: u16 = 2381;

/// Command line of the discovery store process listening on `ip:port` and
/// loopback.
pub fn store_command(program: &str, ip: &str, port: u16) -> MemberCommand {
    let advertise = format!("http://{}", host_port(ip, port));
    let listen = format!("{},http://{}", advertise, host_port("localhost", port));
    MemberCommand::new(program).with_args([
        "-advertise-client-urls".to_string(),
        advertise,
        "-listen-client-urls".to_string(),
        listen,
    ])
}

/// Retry behavior while waiting for the store to come up.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Attempts before giving up
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            max_attempts: 20,
        }
    }
}

/// Delay before the attempt following failed attempt number `attempt`.
pub fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let delay_secs = config.initial_delay.as_secs_f64()
        * config.backoff_factor.powi(attempt.saturating_sub(1) as i32);

    Duration::from_secs_f64(delay_secs.min(config.max_delay.as_secs_f64()))
}

/// Read `key` until the store answers. Any answer counts, "not found"
/// included; only transport failures are retried.
pub async fn wait_until_reachable(
    store: &dyn DiscoveryStore,
    key: &str,
    config: &RetryConfig,
) -> Result<()> {
    let mut attempt = 1;
    loop {
        match store.get(key, false).await {
            Ok(_) | Err(DiscoveryError::NotFound(_)) => {
                info!(attempts = attempt, "Discovery store is reachable");
                return Ok(());
            }
            Err(e) if attempt >= config.max_attempts => {
                warn!("Discovery store still unreachable after {} attempts", attempt);
                return Err(e.into());
            }
            Err(e) => {
                let delay = calculate_backoff(attempt, config);
                debug!("Discovery store not ready ({}), retrying in {:?}", e, delay);
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Register the desired cluster size for `token`. Returns whether the key
/// was created; an existing key or a failed write is logged and tolerated.
pub async fn register_size(
    store: &dyn DiscoveryStore,
    keyspace: &Keyspace,
    token: &str,
    size: usize,
) -> bool {
    let key = keyspace.size_key(token);
    match store.create(&key, &size.to_string()).await {
        Ok(()) => {
            info!(key = %key, size, "Registered cluster size");
            true
        }
        Err(DiscoveryError::AlreadyExists(_)) => {
            warn!("Cluster size already registered at {}, leaving it", key);
            false
        }
        Err(e) => {
            warn!("Could not register cluster size at {}: {}", key, e);
            false
        }
    }
}
