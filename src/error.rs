//! Custom error types for ovnmig.

use std::fmt;

use thiserror::Error;

/// Errors that can occur while driving a network migration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MigrationError {
    #[error("Command '{command}' failed: {stderr}")]
    TransientCommandFailure { command: String, stderr: String },

    #[error("Command '{command}' failed after {attempts} attempts: {stderr}")]
    CommandFailed {
        command: String,
        attempts: u32,
        stderr: String,
    },

    #[error("Failed to spawn '{program}': {details}")]
    Spawn { program: String, details: String },

    #[error("Cluster version unavailable: {0}")]
    VersionUnavailable(String),

    #[error("Unsupported cluster version: {0}")]
    UnsupportedVersion(String),

    #[error("Patch rejected for {target}: {details}")]
    PatchRejected { target: String, details: String },

    #[error("Timeout waiting for machine config rollout after {waited_secs}s: {details}")]
    RolloutTimeout { waited_secs: u64, details: String },

    #[error("Timeout waiting for cluster health after {waited_secs}s: {details}")]
    HealthTimeout { waited_secs: u64, details: String },

    #[error("Machine config of node {node} is wrong: {details}")]
    MachineConfigMismatch { node: String, details: String },

    #[error("Failed to issue reboot to node {node} after {attempts} attempts: {stderr}")]
    RebootIssuanceFailure {
        node: String,
        attempts: u32,
        stderr: String,
    },

    #[error("Failed to parse {what}: {details}")]
    Parse { what: String, details: String },

    #[error("Operation cancelled")]
    Cancelled,
}

impl MigrationError {
    /// Build a parse error for the named document.
    pub fn parse(what: &str, err: impl fmt::Display) -> Self {
        MigrationError::Parse {
            what: what.to_string(),
            details: err.to_string(),
        }
    }

    /// Raw error text captured from the cluster client, if any.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            MigrationError::TransientCommandFailure { stderr, .. }
            | MigrationError::CommandFailed { stderr, .. }
            | MigrationError::RebootIssuanceFailure { stderr, .. } => Some(stderr),
            MigrationError::PatchRejected { details, .. }
            | MigrationError::RolloutTimeout { details, .. }
            | MigrationError::HealthTimeout { details, .. }
            | MigrationError::MachineConfigMismatch { details, .. } => Some(details),
            _ => None,
        }
    }

    /// Returns true for failures that retry loops may absorb.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MigrationError::TransientCommandFailure { .. } | MigrationError::Spawn { .. }
        )
    }
}

/// Typed reason attached to a failed migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    VersionUnavailable,
    UnsupportedVersion,
    PatchRejected,
    RolloutTimeout,
    RebootFailed,
    HealthTimeout,
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::VersionUnavailable => "VersionUnavailable",
            FailureReason::UnsupportedVersion => "UnsupportedVersion",
            FailureReason::PatchRejected => "PatchRejected",
            FailureReason::RolloutTimeout => "RolloutTimeout",
            FailureReason::RebootFailed => "RebootFailed",
            FailureReason::HealthTimeout => "HealthTimeout",
            FailureReason::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_command_failed() {
        let err = MigrationError::CommandFailed {
            command: "oc get nodes -o json".to_string(),
            attempts: 3,
            stderr: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Command 'oc get nodes -o json' failed after 3 attempts: connection refused"
        );
    }

    #[test]
    fn test_error_display_reboot_issuance() {
        let err = MigrationError::RebootIssuanceFailure {
            node: "master-0".to_string(),
            attempts: 5,
            stderr: "pod not running".to_string(),
        };
        assert!(err.to_string().contains("master-0"));
        assert!(err.to_string().contains("5 attempts"));
    }

    #[test]
    fn test_raw_output_embeds_stderr() {
        let err = MigrationError::CommandFailed {
            command: "oc patch".to_string(),
            attempts: 1,
            stderr: "admission webhook denied".to_string(),
        };
        assert_eq!(err.raw_output(), Some("admission webhook denied"));
        assert_eq!(MigrationError::Cancelled.raw_output(), None);
    }

    #[test]
    fn test_is_transient() {
        let transient = MigrationError::TransientCommandFailure {
            command: "oc get".to_string(),
            stderr: "i/o timeout".to_string(),
        };
        assert!(transient.is_transient());
        assert!(!MigrationError::UnsupportedVersion("5.0".to_string()).is_transient());
    }

    #[test]
    fn test_failure_reason_display() {
        assert_eq!(FailureReason::RolloutTimeout.to_string(), "RolloutTimeout");
        assert_eq!(FailureReason::Cancelled.to_string(), "Cancelled");
    }
}
