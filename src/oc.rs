//! Cluster command surface built on the `oc` client.

pub mod command;
pub mod executor;
pub mod poll;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use command::{CommandOutput, OcCommand};
pub use executor::{CommandExecutor, DryRunExecutor, OcExecutor};
pub use poll::{
    CommandSucceeds, Condition, PollConfig, PollOutcome, poll_until, sleep_or_cancel,
    until_cancelled,
};
pub use retry::{RetryPolicy, run_with_retries};
