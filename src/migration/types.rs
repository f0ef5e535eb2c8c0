//! Common types for migration runs.

use std::fmt;

use crate::cluster::nodes::NodeRole;
use crate::error::FailureReason;

/// Orchestrator state. Any state may move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Init,
    VersionChecked,
    FeaturesPatched,
    PluginPatched,
    RolloutConverged,
    NetworkTypeApplied,
    NodesRebooted,
    ClusterHealthy,
    Done,
    Failed(FailureReason),
}

impl MigrationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MigrationState::Done | MigrationState::Failed(_))
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationState::Init => f.write_str("Init"),
            MigrationState::VersionChecked => f.write_str("VersionChecked"),
            MigrationState::FeaturesPatched => f.write_str("FeaturesPatched"),
            MigrationState::PluginPatched => f.write_str("PluginPatched"),
            MigrationState::RolloutConverged => f.write_str("RolloutConverged"),
            MigrationState::NetworkTypeApplied => f.write_str("NetworkTypeApplied"),
            MigrationState::NodesRebooted => f.write_str("NodesRebooted"),
            MigrationState::ClusterHealthy => f.write_str("ClusterHealthy"),
            MigrationState::Done => f.write_str("Done"),
            MigrationState::Failed(reason) => write!(f, "Failed({})", reason),
        }
    }
}

/// Caller-facing classification of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Cluster state was mutated.
    Changed,
    /// Nothing was mutated (dry run).
    Unchanged,
    Failed(FailureReason),
}

/// Stdout of a command that changed or inspected cluster state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub step: String,
    pub command: String,
    pub stdout: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebootOutcome {
    Issued,
    AgentNotFound,
    Failed(String),
}

/// One node's entry in the reboot schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebootRecord {
    pub node: String,
    pub role: NodeRole,
    /// Minutes passed to `shutdown -r`. `None` when no command was issued.
    pub delay_minutes: Option<u32>,
    pub outcome: RebootOutcome,
}

/// Everything a caller needs to report a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: MigrationState,
    pub status: RunStatus,
    pub message: String,
    /// Raw error text of the terminal failure, if any.
    pub last_error: Option<String>,
    /// States entered, in order, starting with `Init`.
    pub transitions: Vec<MigrationState>,
    pub notes: Vec<String>,
    pub outputs: Vec<CapturedOutput>,
    pub reboots: Vec<RebootRecord>,
    pub started_at: chrono::DateTime<chrono::Local>,
    pub finished_at: Option<chrono::DateTime<chrono::Local>>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            state: MigrationState::Init,
            status: RunStatus::Unchanged,
            message: String::new(),
            last_error: None,
            transitions: vec![MigrationState::Init],
            notes: Vec::new(),
            outputs: Vec::new(),
            reboots: Vec::new(),
            started_at: chrono::Local::now(),
            finished_at: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, RunStatus::Failed(_))
    }

    pub fn duration_secs(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_seconds())
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}
