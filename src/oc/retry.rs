//! Bounded retry-with-delay for single cluster commands.
//!
//! Used for merge patches, listings and reboot issuance: anything whose
//! success is the command's own exit status. Failures are retried after a
//! fixed delay up to the attempt bound, then surfaced with the last stderr.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::command::OcCommand;
use super::executor::CommandExecutor;
use super::poll::{sleep_or_cancel, until_cancelled};
use crate::error::MigrationError;

/// Attempt bound and fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// A single attempt with no retry.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

/// Run `command` until it exits successfully or the policy is exhausted.
///
/// Returns the trimmed stdout of the first successful attempt. On exhaustion
/// returns [`MigrationError::CommandFailed`] carrying the final stderr and the
/// attempt count. No delay follows the final failed attempt.
pub async fn run_with_retries(
    executor: &dyn CommandExecutor,
    command: &OcCommand,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<String, MigrationError> {
    let max_attempts = policy.max_attempts();
    let mut last_stderr = String::new();

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(MigrationError::Cancelled);
        }

        match until_cancelled(executor.execute(command), cancel).await {
            Ok(output) if output.is_success() => {
                debug!(attempt, "Command succeeded: {}", command);
                return Ok(output.stdout);
            }
            Ok(output) => {
                last_stderr = if output.stderr.is_empty() {
                    format!("exit status {:?}", output.exit_code)
                } else {
                    output.stderr
                };
            }
            Err(e) if e.is_transient() => last_stderr = e.to_string(),
            Err(e) => return Err(e),
        }

        if attempt < max_attempts {
            warn!(
                attempt,
                max_attempts,
                delay_secs = policy.delay.as_secs(),
                error = %last_stderr,
                "Command failed, retrying: {}",
                command
            );
            sleep_or_cancel(policy.delay, cancel).await?;
        }
    }

    Err(MigrationError::CommandFailed {
        command: command.to_string(),
        attempts: max_attempts,
        stderr: last_stderr,
    })
}
