//! Command executors: the real `oc` process runner and a dry-run recorder.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, info};

use super::command::{CommandOutput, OcCommand};
use crate::error::MigrationError;

/// Runs a single cluster command and captures its result. Never retries.
///
/// A non-zero exit is reported through [`CommandOutput`], not as an error;
/// `Err` is reserved for failures to run the client at all.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &OcCommand) -> Result<CommandOutput, MigrationError>;
}

/// Executes commands by spawning the `oc` binary.
#[derive(Debug, Clone)]
pub struct OcExecutor {
    binary: String,
}

impl OcExecutor {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for OcExecutor {
    fn default() -> Self {
        Self::new("oc")
    }
}

#[async_trait]
impl CommandExecutor for OcExecutor {
    async fn execute(&self, command: &OcCommand) -> Result<CommandOutput, MigrationError> {
        debug!("Running: {}", command);

        let output = tokio::process::Command::new(&self.binary)
            .args(command.args())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MigrationError::Spawn {
                program: self.binary.clone(),
                details: format!("{} (is the oc client installed and on PATH?)", e),
            })?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            exit_code: output.status.code(),
        };

        debug!(
            exit_code = ?result.exit_code,
            stdout_bytes = result.stdout.len(),
            "Command finished: {}",
            command
        );
        Ok(result)
    }
}

/// Passes read-only commands through and records mutating ones instead of running them.
pub struct DryRunExecutor<E> {
    inner: E,
    recorded: Mutex<Vec<OcCommand>>,
}

impl<E: CommandExecutor> DryRunExecutor<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            recorded: Mutex::new(Vec::new()),
        }
    }

    /// Mutating commands that would have run, in issue order.
    pub fn recorded(&self) -> Vec<OcCommand> {
        self.recorded
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl<E: CommandExecutor> CommandExecutor for DryRunExecutor<E> {
    async fn execute(&self, command: &OcCommand) -> Result<CommandOutput, MigrationError> {
        if !command.is_mutating() {
            return self.inner.execute(command).await;
        }

        info!("[DRY RUN] Would run: {}", command);
        if let Ok(mut guard) = self.recorded.lock() {
            guard.push(command.clone());
        }
        Ok(CommandOutput::success(format!("[dry-run] {}", command)))
    }
}
