//! Member process supervision.
//!
//! Launches the member binary with the inherited environment plus the
//! `MemberEnv`, minus the variables it strips, shares the coordinator's stdout and stderr, and waits for it
//! to exit. There is no retry here: an abnormal exit is reported and the
//! external orchestrator restarts the whole coordinator.

use crate::error::{BootError, Result};
use crate::member_env::MemberEnv;
use std::future::Future;
use std::io;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tracing::{debug, error, info};

/// Binary and arguments of the member process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl MemberCommand {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for MemberCommand {
    fn default() -> Self {
        Self::new("etcd")
    }
}

/// How a supervised member process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberExit {
    /// Exited on its own with status zero
    Exited,
    /// Killed because the coordinator was asked to shut down
    Interrupted,
}

/// A running member process.
pub struct MemberProcess {
    program: String,
    child: Child,
}

impl MemberProcess {
    /// Start the member process.
    pub fn spawn(command: &MemberCommand, env: &MemberEnv) -> Result<Self> {
        info!(
            program = %command.program,
            "Member environment: {}",
            env.render_over(inherited_env())
        );

        let child = build_command(command, env)
            .spawn()
            .map_err(|e| {
                error!("Failed to start {}: {}", command.program, e);
                BootError::ChildProcessFailure(format!("failed to start {}: {}", command.program, e))
            })?;

        info!(program = %command.program, pid = ?child.id(), "Member process started");
        Ok(Self {
            program: command.program.clone(),
            child,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the process to exit.
    pub async fn wait(self) -> Result<MemberExit> {
        self.wait_until(std::future::pending::<()>()).await
    }

    /// Wait for the process to exit, killing it if `shutdown` completes first.
    pub async fn wait_until<F>(mut self, shutdown: F) -> Result<MemberExit>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            status = self.child.wait() => self.check_exit(status),
            _ = shutdown => {
                info!("Shutdown requested, stopping {}", self.program);
                if let Err(e) = self.child.start_kill() {
                    debug!("Kill of {} failed (already exited?): {}", self.program, e);
                }
                let status = self.child.wait().await;
                debug!("{} stopped: {:?}", self.program, status);
                Ok(MemberExit::Interrupted)
            }
        }
    }

    fn check_exit(&self, status: io::Result<ExitStatus>) -> Result<MemberExit> {
        match status {
            Ok(status) if status.success() => {
                info!("{} exited cleanly", self.program);
                Ok(MemberExit::Exited)
            }
            Ok(status) => {
                error!("{} quit unexpectedly: {}", self.program, status);
                Err(BootError::ChildProcessFailure(format!(
                    "{} quit unexpectedly: {}",
                    self.program, status
                )))
            }
            Err(e) => {
                error!("Lost track of {}: {}", self.program, e);
                Err(BootError::ChildProcessFailure(format!(
                    "waiting for {}: {}",
                    self.program, e
                )))
            }
        }
    }
}

fn build_command(command: &MemberCommand, env: &MemberEnv) -> Command {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args);
    for key in env.removed() {
        cmd.env_remove(key);
    }
    cmd.envs(env.iter())
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    cmd
}

/// The coordinator's environment; non-UTF-8 entries are left out of the log.
fn inherited_env() -> impl Iterator<Item = (String, String)> {
    std::env::vars_os().filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
}
