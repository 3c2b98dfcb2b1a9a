//! Boot error taxonomy and process exit codes.
//!
//! Every variant except [`ConfigParseWarning`] aborts the boot attempt. The
//! binary maps the error to an exit code and relies on an external supervisor
//! to restart the whole process, which re-runs the pipeline from scratch.

use crate::cluster::AdminError;
use crate::discovery::DiscoveryError;
use crate::resources::ResourceError;
use thiserror::Error;

/// Exit code for a boot failure with no more specific code.
pub const EXIT_BOOT_FAILURE: u8 = 1;
/// Exit code when the member process exited abnormally or never started.
pub const EXIT_MEMBER_PROCESS: u8 = 2;
/// Exit code when the local identity cannot be determined.
pub const EXIT_IDENTITY: u8 = 3;
/// Exit code when the discovery token cannot be read.
pub const EXIT_DISCOVERY_TOKEN: u8 = 4;

#[derive(Debug, Error)]
pub enum BootError {
    #[error("Cannot determine local identity: {0}")]
    IdentityUnavailable(String),

    #[error("Cannot read discovery token from {path}: {reason}")]
    TokenUnavailable { path: String, reason: String },

    #[error("Discovery service unavailable: {0}")]
    DiscoveryUnavailable(DiscoveryError),

    #[error("Malformed discovery state: {0}")]
    MalformedDiscoveryState(String),

    #[error("Cluster administrative API unavailable: {0}")]
    ClusterAdminUnavailable(#[from] AdminError),

    #[error("Compute resource lookup failed: {0}")]
    ResourceLookupFailed(#[from] ResourceError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Member process failed: {0}")]
    ChildProcessFailure(String),
}

impl BootError {
    /// Process exit code reported for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            BootError::IdentityUnavailable(_) => EXIT_IDENTITY,
            BootError::TokenUnavailable { .. } => EXIT_DISCOVERY_TOKEN,
            BootError::ChildProcessFailure(_) => EXIT_MEMBER_PROCESS,
            _ => EXIT_BOOT_FAILURE,
        }
    }
}

impl From<DiscoveryError> for BootError {
    fn from(err: DiscoveryError) -> Self {
        match err {
            DiscoveryError::Malformed(msg) => BootError::MalformedDiscoveryState(msg),
            other => BootError::DiscoveryUnavailable(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, BootError>;

/// Non-fatal configuration problem, recovered locally with a default.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Expected integer for {field}, got '{raw}'. Defaulting to {fallback}")]
pub struct ConfigParseWarning {
    pub field: &'static str,
    pub raw: String,
    pub fallback: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let identity = BootError::IdentityUnavailable("no name".into());
        let token = BootError::TokenUnavailable {
            path: "/tmp/token".into(),
            reason: "missing".into(),
        };
        let child = BootError::ChildProcessFailure("exit status: 1".into());
        let other = BootError::InvalidConfig("bad".into());

        let codes = [
            identity.exit_code(),
            token.exit_code(),
            child.exit_code(),
            other.exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(codes.iter().all(|c| *c != 0));
    }

    #[test]
    fn test_malformed_discovery_error_maps_to_malformed_state() {
        let err: BootError = DiscoveryError::Malformed("not a directory".into()).into();
        assert!(matches!(err, BootError::MalformedDiscoveryState(_)));

        let err: BootError = DiscoveryError::Request("connection refused".into()).into();
        assert!(matches!(err, BootError::DiscoveryUnavailable(_)));
    }
}
