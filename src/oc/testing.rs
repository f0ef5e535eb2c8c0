//! Scripted in-memory executor for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::command::{CommandOutput, OcCommand};
use super::executor::CommandExecutor;
use crate::error::MigrationError;

struct Rule {
    pattern: String,
    responses: VecDeque<CommandOutput>,
}

/// Answers commands by the most recently added rule whose pattern occurs in
/// the rendered command, so tests can override a base fixture.
///
/// Each rule replays its responses in order and then keeps repeating the last one.
/// Commands that match no rule succeed with empty output.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<OcCommand>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, pattern: &str, output: CommandOutput) -> Self {
        self.respond_seq(pattern, vec![output])
    }

    pub fn respond_seq(self, pattern: &str, outputs: Vec<CommandOutput>) -> Self {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            responses: outputs.into(),
        });
        self
    }

    pub fn calls(&self) -> Vec<OcCommand> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, pattern: &str) -> Vec<OcCommand> {
        self.calls()
            .into_iter()
            .filter(|c| c.to_string().contains(pattern))
            .collect()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, command: &OcCommand) -> Result<CommandOutput, MigrationError> {
        self.calls.lock().unwrap().push(command.clone());
        let rendered = command.to_string();

        let mut rules = self.rules.lock().unwrap();
        let Some(rule) = rules.iter_mut().rev().find(|r| rendered.contains(&r.pattern)) else {
            return Ok(CommandOutput::success(""));
        };

        let output = if rule.responses.len() > 1 {
            rule.responses.pop_front().unwrap_or_default()
        } else {
            rule.responses.front().cloned().unwrap_or_default()
        };
        Ok(output)
    }
}

/// Takes `delay` to answer every command, like an `oc wait` that blocks.
pub struct SlowExecutor {
    pub delay: std::time::Duration,
}

#[async_trait]
impl CommandExecutor for SlowExecutor {
    async fn execute(&self, _command: &OcCommand) -> Result<CommandOutput, MigrationError> {
        tokio::time::sleep(self.delay).await;
        Ok(CommandOutput::success(""))
    }
}
