//! Pause or resume a MachineConfigPool.
//!
//! A paused pool stops the machine config operator from rolling rendered
//! configs onto its nodes, which is how an in-flight rollout is held back.

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cluster::pools::{MACHINE_CONFIG_POOL_RESOURCE, pause_patch};
use crate::error::MigrationError;
use crate::oc::{CommandExecutor, OcCommand, RetryPolicy, run_with_retries};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackOutcome {
    pub pool: String,
    pub paused: bool,
    pub command: String,
    pub stdout: String,
}

/// Set `spec.paused` on the named pool.
///
/// The patch is applied even when the pool is already in the requested
/// state, so a successful call always counts as a change.
pub async fn set_pool_paused(
    executor: &dyn CommandExecutor,
    pool: &str,
    paused: bool,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<RollbackOutcome, MigrationError> {
    let command = OcCommand::merge_patch(MACHINE_CONFIG_POOL_RESOURCE, pool, &pause_patch(paused));
    let action = if paused { "Pausing" } else { "Resuming" };
    info!(pool, "{} machine config pool", action);

    let stdout = run_with_retries(executor, &command, retry, cancel)
        .await
        .map_err(|e| match e {
            MigrationError::CommandFailed { stderr, .. } => MigrationError::PatchRejected {
                target: format!("{}/{}", MACHINE_CONFIG_POOL_RESOURCE, pool),
                details: stderr,
            },
            other => other,
        })?;

    Ok(RollbackOutcome {
        pool: pool.to_string(),
        paused,
        command: command.to_string(),
        stdout,
    })
}
