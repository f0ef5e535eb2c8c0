//! Wall-clock bounded condition polling and cancellable sleeps.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::command::OcCommand;
use super::executor::CommandExecutor;
use crate::error::MigrationError;

/// Timeout and re-evaluation interval for a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollConfig {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    pub fn from_secs(timeout_secs: u64, interval_secs: u64) -> Self {
        Self::new(
            Duration::from_secs(timeout_secs),
            Duration::from_secs(interval_secs),
        )
    }
}

/// An observable cluster state evaluated on every poll iteration.
#[async_trait]
pub trait Condition: Send + Sync {
    /// Short human-readable name used in logs.
    fn describe(&self) -> String;

    /// `Ok(true)` when satisfied. `Err` is treated as "not yet" by the poller.
    async fn evaluate(&self, executor: &dyn CommandExecutor) -> Result<bool, MigrationError>;
}

/// Satisfied when the wrapped command exits successfully.
#[derive(Debug, Clone)]
pub struct CommandSucceeds(pub OcCommand);

#[async_trait]
impl Condition for CommandSucceeds {
    fn describe(&self) -> String {
        self.0.to_string()
    }

    async fn evaluate(&self, executor: &dyn CommandExecutor) -> Result<bool, MigrationError> {
        let output = executor.execute(&self.0).await?;
        if output.is_success() {
            Ok(true)
        } else {
            Err(MigrationError::TransientCommandFailure {
                command: self.0.to_string(),
                stderr: output.stderr,
            })
        }
    }
}

/// Result of a poll loop. Timing out is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Satisfied {
        iterations: u32,
    },
    TimedOut {
        iterations: u32,
        last_error: Option<String>,
    },
}

impl PollOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, PollOutcome::Satisfied { .. })
    }

    pub fn iterations(&self) -> u32 {
        match self {
            PollOutcome::Satisfied { iterations } | PollOutcome::TimedOut { iterations, .. } => {
                *iterations
            }
        }
    }
}

/// Re-evaluate `conditions` every `config.interval` until all hold at once or
/// `config.timeout` elapses.
///
/// Conditions are checked in order and an iteration stops at the first one
/// not satisfied. Command failures are logged and absorbed. The only error
/// returned is [`MigrationError::Cancelled`].
pub async fn poll_until(
    executor: &dyn CommandExecutor,
    conditions: &[&dyn Condition],
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<PollOutcome, MigrationError> {
    let start = Instant::now();
    let mut iterations = 0u32;
    let mut last_error = None;

    while start.elapsed() < config.timeout {
        if cancel.is_cancelled() {
            return Err(MigrationError::Cancelled);
        }
        iterations += 1;

        let mut all_satisfied = true;
        for condition in conditions {
            match until_cancelled(condition.evaluate(executor), cancel).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(iteration = iterations, "Condition not yet met: {}", condition.describe());
                    all_satisfied = false;
                    break;
                }
                Err(MigrationError::Cancelled) => return Err(MigrationError::Cancelled),
                Err(e) => {
                    warn!(
                        iteration = iterations,
                        error = %e,
                        "Condition check failed, will retry: {}",
                        condition.describe()
                    );
                    last_error = Some(e.to_string());
                    all_satisfied = false;
                    break;
                }
            }
        }

        if all_satisfied {
            debug!(
                iterations,
                elapsed_secs = start.elapsed().as_secs(),
                "All conditions satisfied"
            );
            return Ok(PollOutcome::Satisfied { iterations });
        }

        sleep_or_cancel(config.interval, cancel).await?;
    }

    Ok(PollOutcome::TimedOut {
        iterations,
        last_error,
    })
}

/// Drive `fut` to completion unless `cancel` fires first.
///
/// The future is dropped on cancellation, which kills a running `oc` child.
pub async fn until_cancelled<T, F>(fut: F, cancel: &CancellationToken) -> Result<T, MigrationError>
where
    F: Future<Output = Result<T, MigrationError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(MigrationError::Cancelled),
        result = fut => result,
    }
}

/// Sleep for `duration` unless `cancel` fires first.
pub async fn sleep_or_cancel(
    duration: Duration,
    cancel: &CancellationToken,
) -> Result<(), MigrationError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(MigrationError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
