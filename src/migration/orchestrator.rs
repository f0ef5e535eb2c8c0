//! End-to-end migration state machine.
//!
//! Version gate, feature patch, plugin patch, rollout wait, node reboots and
//! the post-reboot health wait run strictly in order. The first fatal error
//! ends the run in `Failed(reason)`. Completed steps are never undone.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::health::{HealthSettings, wait_for_cluster_healthy};
use super::reboot::{NodeRebootSequencer, RebootSettings};
use super::types::{CapturedOutput, MigrationState, RunReport, RunStatus};
use crate::cluster::network::{
    MigrationFeatureSet, NetworkPatch, PluginParams, PluginType, build_migration_feature_patch,
    build_network_type_patch, build_plugin_patch,
};
use crate::cluster::machineconfig::NodesConfigured;
use crate::cluster::pools::PoolsConverged;
use crate::cluster::version::{current_version, is_migration_auto_disable_supported};
use crate::error::{FailureReason, MigrationError};
use crate::oc::{
    CommandExecutor, CommandSucceeds, Condition, OcCommand, PollConfig, PollOutcome, RetryPolicy,
    poll_until, run_with_retries,
};

/// Per-call timeout passed to each `oc wait` in the rollout predicate.
pub const DEFAULT_ROLLOUT_CHECK_TIMEOUT_SECS: u64 = 60;

const ROLLOUT_WAIT_CONDITIONS: &[&str] = &["UPDATED=True", "UPDATING=False", "DEGRADED=False"];

/// What to migrate to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRequest {
    pub plugin_type: PluginType,
    pub plugin_params: PluginParams,
    pub features: MigrationFeatureSet,
    /// Also switch `Network.config.openshift.io` once rollout has converged.
    pub trigger_network_type: bool,
}

impl MigrationRequest {
    pub fn new(plugin_type: PluginType) -> Self {
        Self {
            plugin_type,
            plugin_params: PluginParams::default(),
            features: MigrationFeatureSet::default(),
            trigger_network_type: false,
        }
    }
}

/// Timeouts, retry bounds and mode flags for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSettings {
    pub patch_retry: RetryPolicy,
    pub version_poll: PollConfig,
    pub rollout_poll: PollConfig,
    pub rollout_check_timeout_secs: u64,
    pub reboot: RebootSettings,
    pub health: HealthSettings,
    /// Mutations are recorded by the executor, waits are skipped.
    pub dry_run: bool,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            patch_retry: RetryPolicy::new(3, Duration::from_secs(5)),
            version_poll: PollConfig::from_secs(120, 5),
            rollout_poll: PollConfig::from_secs(2700, 10),
            rollout_check_timeout_secs: DEFAULT_ROLLOUT_CHECK_TIMEOUT_SECS,
            reboot: RebootSettings::default(),
            health: HealthSettings::default(),
            dry_run: false,
        }
    }
}

/// Map a terminal error to the reason reported for the run.
///
/// Errors that do not name a step themselves (listing or parse failures) are
/// attributed to the step that was running, identified by the last state
/// entered.
pub fn failure_reason(last_state: MigrationState, err: &MigrationError) -> FailureReason {
    match err {
        MigrationError::Cancelled => FailureReason::Cancelled,
        MigrationError::VersionUnavailable(_) => FailureReason::VersionUnavailable,
        MigrationError::UnsupportedVersion(_) => FailureReason::UnsupportedVersion,
        MigrationError::PatchRejected { .. } => FailureReason::PatchRejected,
        MigrationError::RolloutTimeout { .. } => FailureReason::RolloutTimeout,
        MigrationError::HealthTimeout { .. } => FailureReason::HealthTimeout,
        MigrationError::RebootIssuanceFailure { .. } => FailureReason::RebootFailed,
        _ => match last_state {
            MigrationState::Init => FailureReason::VersionUnavailable,
            MigrationState::VersionChecked | MigrationState::FeaturesPatched => {
                FailureReason::PatchRejected
            }
            MigrationState::PluginPatched => FailureReason::RolloutTimeout,
            MigrationState::RolloutConverged | MigrationState::NetworkTypeApplied => {
                FailureReason::RebootFailed
            }
            _ => FailureReason::HealthTimeout,
        },
    }
}

fn failure_guidance(reason: FailureReason) -> &'static str {
    match reason {
        FailureReason::VersionUnavailable => {
            "Could not determine the cluster version. Check API access and re-run."
        }
        FailureReason::UnsupportedVersion => {
            "Cluster version is not supported. No changes were made."
        }
        FailureReason::PatchRejected => {
            "A network operator patch was rejected. Earlier patches remain applied; re-running is safe."
        }
        FailureReason::RolloutTimeout => {
            "Machine config pools did not converge in time. Re-run once the pools have settled."
        }
        FailureReason::RebootFailed => {
            "A master reboot could not be issued. Already scheduled reboots will still happen; investigate before re-running."
        }
        FailureReason::HealthTimeout => {
            "Nodes did not become Ready after reboot. Manual investigation required; do not re-run blindly."
        }
        FailureReason::Cancelled => {
            "Migration cancelled. Already scheduled reboots are not revoked."
        }
    }
}

/// Drives one migration run against a cluster.
pub struct Orchestrator<'a> {
    executor: &'a dyn CommandExecutor,
    settings: &'a MigrationSettings,
    cancel: CancellationToken,
    report: RunReport,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        executor: &'a dyn CommandExecutor,
        settings: &'a MigrationSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            executor,
            settings,
            cancel,
            report: RunReport::new(),
        }
    }

    /// Run the whole sequence. Never returns an error: failures end up in the
    /// report as `Failed(reason)`.
    pub async fn run(mut self, request: &MigrationRequest) -> RunReport {
        info!(
            plugin = %request.plugin_type,
            dry_run = self.settings.dry_run,
            "Starting network migration"
        );

        match self.drive(request).await {
            Ok(()) => {
                self.enter(MigrationState::Done);
                if self.settings.dry_run {
                    self.report.status = RunStatus::Unchanged;
                    self.report.message =
                        format!("Dry run complete, no changes applied for migration to {}", request.plugin_type);
                } else {
                    self.report.status = RunStatus::Changed;
                    self.report.message =
                        format!("Migration to {} completed, all nodes Ready", request.plugin_type);
                }
                info!(message = %self.report.message, "Migration finished");
            }
            Err(e) => self.fail(e),
        }

        self.report.finished_at = Some(chrono::Local::now());
        self.report
    }

    async fn drive(&mut self, request: &MigrationRequest) -> Result<(), MigrationError> {
        let target = request.plugin_type;

        info!("Phase 1: checking cluster version");
        let version = current_version(self.executor, &self.settings.version_poll, &self.cancel).await?;
        let auto_disable = is_migration_auto_disable_supported(&version)?;
        self.enter(MigrationState::VersionChecked);

        info!("Phase 2: disabling automatic migration of legacy features");
        if auto_disable {
            let patch = build_migration_feature_patch(target, &request.features);
            self.apply_patch("migration-features", &patch).await?;
            self.enter(MigrationState::FeaturesPatched);
        } else {
            self.note(format!(
                "skipped: version too old ({}) to disable automatic feature migration",
                version
            ));
        }

        info!("Phase 3: patching {} configuration", target);
        let patch = build_plugin_patch(target, &request.plugin_params);
        self.apply_patch("plugin-config", &patch).await?;
        self.enter(MigrationState::PluginPatched);

        info!("Phase 4: waiting for machine config rollout");
        if self.settings.dry_run {
            self.note("dry run: rollout wait skipped".to_string());
        } else {
            self.wait_for_rollout(target).await?;
        }
        self.enter(MigrationState::RolloutConverged);

        if request.trigger_network_type {
            info!("Applying network type {} to cluster network config", target);
            let patch = build_network_type_patch(target);
            self.apply_patch("network-type", &patch).await?;
            self.note(format!("networkType set to {}", target.network_type()));
            self.enter(MigrationState::NetworkTypeApplied);
        }

        info!("Phase 5: rebooting nodes");
        let max_delay = self.reboot_nodes().await?;
        self.enter(MigrationState::NodesRebooted);

        info!("Phase 6: waiting for cluster health");
        if self.settings.dry_run {
            self.note(format!(
                "dry run: health wait skipped (would wait {}m before polling readiness)",
                max_delay
            ));
        } else {
            wait_for_cluster_healthy(self.executor, max_delay, &self.settings.health, &self.cancel)
                .await?;
        }
        self.enter(MigrationState::ClusterHealthy);

        Ok(())
    }

    /// Apply one merge patch with bounded retry, keeping its output.
    async fn apply_patch(&mut self, step: &str, patch: &NetworkPatch) -> Result<(), MigrationError> {
        let command = OcCommand::merge_patch(patch.resource, patch.name, &patch.body);
        info!(object = %patch.target(), body = %patch.body, "Applying patch");

        let stdout = run_with_retries(self.executor, &command, &self.settings.patch_retry, &self.cancel)
            .await
            .map_err(|e| match e {
                MigrationError::CommandFailed { stderr, .. } => MigrationError::PatchRejected {
                    target: patch.target(),
                    details: stderr,
                },
                other => other,
            })?;

        self.report.outputs.push(CapturedOutput {
            step: step.to_string(),
            command: command.to_string(),
            stdout,
        });
        Ok(())
    }

    async fn wait_for_rollout(&mut self, target: PluginType) -> Result<(), MigrationError> {
        let nodes_configured = NodesConfigured { plugin: target };
        let waits: Vec<CommandSucceeds> = ROLLOUT_WAIT_CONDITIONS
            .iter()
            .map(|condition| {
                CommandSucceeds(OcCommand::wait_for_all(
                    "mcp",
                    condition,
                    self.settings.rollout_check_timeout_secs,
                ))
            })
            .collect();

        let mut conditions: Vec<&dyn Condition> =
            waits.iter().map(|w| w as &dyn Condition).collect();
        conditions.push(&PoolsConverged);
        conditions.push(&nodes_configured);

        let poll = &self.settings.rollout_poll;
        match poll_until(self.executor, &conditions, poll, &self.cancel).await? {
            PollOutcome::Satisfied { iterations } => {
                info!(iterations, "All machine config pools converged");
                Ok(())
            }
            PollOutcome::TimedOut {
                iterations,
                last_error,
            } => Err(MigrationError::RolloutTimeout {
                waited_secs: poll.timeout.as_secs(),
                details: last_error.unwrap_or_else(|| {
                    format!("pools still rolling out after {} checks", iterations)
                }),
            }),
        }
    }

    async fn reboot_nodes(&mut self) -> Result<u32, MigrationError> {
        let mut sequencer =
            NodeRebootSequencer::new(self.executor, &self.settings.reboot, &self.cancel);
        let result = sequencer.run().await;
        self.report.reboots = sequencer.into_records();
        result
    }

    fn enter(&mut self, state: MigrationState) {
        info!(from = %self.report.state, to = %state, "State transition");
        self.report.state = state;
        self.report.transitions.push(state);
    }

    fn note(&mut self, note: String) {
        warn!("{}", note);
        self.report.notes.push(note);
    }

    fn fail(&mut self, err: MigrationError) {
        let reason = failure_reason(self.report.state, &err);
        error!(state = %self.report.state, reason = %reason, error = %err, "Migration failed");

        self.enter(MigrationState::Failed(reason));
        self.report.status = RunStatus::Failed(reason);
        self.report.message = format!("{}: {}", reason, failure_guidance(reason));
        self.report.last_error = Some(err.raw_output().map(str::to_string).unwrap_or_else(|| err.to_string()));
    }
}
