//! Migration orchestration: state machine, node reboots, health waits and rollback.

pub mod health;
pub mod orchestrator;
pub mod reboot;
pub mod rollback;
pub mod types;

pub use health::HealthSettings;
pub use orchestrator::{MigrationRequest, MigrationSettings, Orchestrator};
pub use reboot::{NodeRebootSequencer, RebootSettings};
pub use rollback::{RollbackOutcome, set_pool_paused};
pub use types::{
    CapturedOutput, MigrationState, RebootOutcome, RebootRecord, RunReport, RunStatus,
};
