//! Liveness heartbeat.
//!
//! While the member process runs, a background task periodically writes a
//! timestamp to this node's status key with a time-to-live. Nodes starting
//! later count these entries to decide their join mode. The key is never
//! deleted; it expires on its own once the writes stop.
//!
//! The TTL must outlast any discovery outage a healthy node is expected to
//! ride out.

use crate::discovery::DiscoveryStore;
use crate::error::{BootError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Time between writes (default: 1 minute)
    pub period: Duration,
    /// Expiration of each write (default: 2 hours)
    pub ttl: Duration,
    /// Upper bound on a single write (default: 10s)
    pub write_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            ttl: Duration::from_secs(2 * 60 * 60),
            write_timeout: Duration::from_secs(10),
        }
    }
}

impl HeartbeatConfig {
    /// Check the period is non-zero and each entry outlives the next write.
    pub fn validate(&self) -> Result<()> {
        if self.period.is_zero() {
            return Err(BootError::InvalidConfig(
                "heartbeat period must be greater than zero".to_string(),
            ));
        }
        if self.ttl <= self.period {
            return Err(BootError::InvalidConfig(format!(
                "heartbeat TTL ({:?}) must be longer than the period ({:?})",
                self.ttl, self.period
            )));
        }
        Ok(())
    }
}

/// Write one heartbeat. Returns whether the write succeeded.
///
/// Failures are logged and swallowed: one missed beat is harmless.
pub async fn beat(store: &dyn DiscoveryStore, key: &str, config: &HeartbeatConfig) -> bool {
    let now = chrono::Utc::now().to_rfc3339();

    match timeout(config.write_timeout, store.set(key, &now, Some(config.ttl))).await {
        Ok(Ok(())) => {
            debug!("Heartbeat written to {} ({})", key, now);
            true
        }
        Ok(Err(e)) => {
            warn!("Heartbeat write to {} failed: {}", key, e);
            false
        }
        Err(_) => {
            warn!(
                "Heartbeat write to {} timed out after {:?}",
                key, config.write_timeout
            );
            false
        }
    }
}

/// Handle to a running heartbeat task.
///
/// Dropping the handle stops the task, so the heartbeat cannot outlive the
/// scope that started it on any exit path.
pub struct Heartbeat {
    key: String,
    task: Option<JoinHandle<()>>,
}

impl Heartbeat {
    /// Spawn the heartbeat loop. The first write happens one period from now.
    pub fn start(
        store: Arc<dyn DiscoveryStore>,
        key: String,
        config: HeartbeatConfig,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            key = %key,
            period_secs = config.period.as_secs_f64(),
            ttl_secs = config.ttl.as_secs(),
            "Heartbeat started"
        );

        let loop_key = key.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + config.period, config.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                beat(store.as_ref(), &loop_key, &config).await;
            }
        });

        Ok(Self {
            key,
            task: Some(task),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the loop and wait for the task to wind down.
    pub async fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            info!(key = %self.key, "Heartbeat stopped");
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Heartbeat for {} aborted on drop", self.key);
        }
    }
}
