//! Two-phase post-reboot health wait.
//!
//! Phase one waits long enough for every scheduled reboot to have started,
//! since the API server is expected to drop away while masters go down.
//! Phase two polls until every node reports Ready.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cluster::nodes::NodesReady;
use crate::error::MigrationError;
use crate::oc::{CommandExecutor, PollConfig, PollOutcome, poll_until, sleep_or_cancel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSettings {
    /// Phase one sleeps this long per minute of the largest reboot delay.
    pub unreachable_wait_per_minute: Duration,
    /// Phase two readiness polling.
    pub readiness: PollConfig,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            unreachable_wait_per_minute: Duration::from_secs(60),
            readiness: PollConfig::from_secs(2700, 10),
        }
    }
}

impl HealthSettings {
    pub fn unreachable_wait(&self, max_delay_minutes: u32) -> Duration {
        self.unreachable_wait_per_minute * max_delay_minutes
    }
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(200));
    pb
}

/// Phase one: wait out the reboot schedule.
pub async fn wait_for_reboots_to_start(
    max_delay_minutes: u32,
    settings: &HealthSettings,
    cancel: &CancellationToken,
) -> Result<(), MigrationError> {
    let wait = settings.unreachable_wait(max_delay_minutes);
    info!(
        wait_secs = wait.as_secs(),
        max_delay_minutes, "Waiting for scheduled reboots to take the API server down"
    );

    let pb = spinner(format!(
        "Waiting {}m for scheduled reboots to start...",
        max_delay_minutes
    ));
    let result = sleep_or_cancel(wait, cancel).await;
    pb.finish_and_clear();
    result
}

/// Phase two: poll until the node list is non-empty and all nodes are Ready.
pub async fn wait_for_nodes_ready(
    executor: &dyn CommandExecutor,
    settings: &HealthSettings,
    cancel: &CancellationToken,
) -> Result<u32, MigrationError> {
    info!(
        timeout_secs = settings.readiness.timeout.as_secs(),
        interval_secs = settings.readiness.interval.as_secs(),
        "Waiting for all nodes to become Ready"
    );

    let pb = spinner("Waiting for all nodes to become Ready...".to_string());
    let outcome = poll_until(executor, &[&NodesReady], &settings.readiness, cancel).await;
    pb.finish_and_clear();

    match outcome? {
        PollOutcome::Satisfied { iterations } => {
            info!(iterations, "All nodes are Ready");
            Ok(iterations)
        }
        PollOutcome::TimedOut {
            iterations,
            last_error,
        } => Err(MigrationError::HealthTimeout {
            waited_secs: settings.readiness.timeout.as_secs(),
            details: last_error.unwrap_or_else(|| {
                format!("nodes still not Ready after {} checks", iterations)
            }),
        }),
    }
}

/// Run both phases.
pub async fn wait_for_cluster_healthy(
    executor: &dyn CommandExecutor,
    max_delay_minutes: u32,
    settings: &HealthSettings,
    cancel: &CancellationToken,
) -> Result<(), MigrationError> {
    wait_for_reboots_to_start(max_delay_minutes, settings, cancel).await?;
    wait_for_nodes_ready(executor, settings, cancel).await?;
    Ok(())
}
