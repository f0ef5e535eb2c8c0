//! MachineConfigPool rollout state.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::ItemList;
use crate::error::MigrationError;
use crate::oc::{CommandExecutor, Condition, OcCommand};

pub const MACHINE_CONFIG_POOL_RESOURCE: &str = "MachineConfigPool";

/// Per-pool convergence state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolloutState {
    pub current_config: Option<String>,
    pub desired_config: Option<String>,
    pub updated: bool,
    pub updating: bool,
    pub degraded: bool,
}

impl RolloutState {
    /// `current == desired`, updated, not updating and not degraded.
    pub fn is_converged(&self) -> bool {
        self.current_config.is_some()
            && self.current_config == self.desired_config
            && self.updated
            && !self.updating
            && !self.degraded
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfigPool {
    pub name: String,
    pub paused: bool,
    pub rollout: RolloutState,
}

#[derive(Debug, Deserialize)]
struct PoolObject {
    metadata: PoolMetadata,
    #[serde(default)]
    spec: PoolSpec,
    #[serde(default)]
    status: PoolStatus,
}

#[derive(Debug, Deserialize)]
struct PoolMetadata {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct PoolSpec {
    #[serde(default)]
    paused: bool,
    configuration: Option<ConfigurationRef>,
}

#[derive(Debug, Default, Deserialize)]
struct PoolStatus {
    configuration: Option<ConfigurationRef>,
    #[serde(default)]
    conditions: Vec<PoolCondition>,
}

#[derive(Debug, Deserialize)]
struct ConfigurationRef {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PoolCondition {
    #[serde(rename = "type")]
    type_: String,
    status: String,
}

impl From<PoolObject> for MachineConfigPool {
    fn from(obj: PoolObject) -> Self {
        let condition = |kind: &str| {
            obj.status
                .conditions
                .iter()
                .any(|c| c.type_ == kind && c.status == "True")
        };

        let rollout = RolloutState {
            current_config: obj.status.configuration.as_ref().and_then(|c| c.name.clone()),
            desired_config: obj.spec.configuration.as_ref().and_then(|c| c.name.clone()),
            updated: condition("Updated"),
            updating: condition("Updating"),
            degraded: condition("Degraded"),
        };

        Self {
            name: obj.metadata.name,
            paused: obj.spec.paused,
            rollout,
        }
    }
}

/// Parse the JSON output of `oc get mcp -o json`.
pub fn parse_pools(json: &str) -> Result<Vec<MachineConfigPool>, MigrationError> {
    let list: ItemList<PoolObject> = serde_json::from_str(json)
        .map_err(|e| MigrationError::parse("machine config pool list", e))?;
    Ok(list.items.into_iter().map(MachineConfigPool::from).collect())
}

pub fn list_pools_command() -> OcCommand {
    OcCommand::get_json("mcp", None, None)
}

/// Merge patch for `spec.paused`.
pub fn pause_patch(paused: bool) -> Value {
    json!({ "spec": { "paused": paused } })
}

/// Satisfied when every pool satisfies [`RolloutState::is_converged`].
#[derive(Debug, Clone, Default)]
pub struct PoolsConverged;

#[async_trait]
impl Condition for PoolsConverged {
    fn describe(&self) -> String {
        "all machine config pools converged".to_string()
    }

    async fn evaluate(&self, executor: &dyn CommandExecutor) -> Result<bool, MigrationError> {
        let command = list_pools_command();
        let output = executor.execute(&command).await?;
        if !output.is_success() {
            return Err(MigrationError::TransientCommandFailure {
                command: command.to_string(),
                stderr: output.stderr,
            });
        }

        let pools = parse_pools(&output.stdout)?;
        for pool in &pools {
            if pool.paused && !pool.rollout.is_converged() {
                warn!(pool = %pool.name, "Pool is paused and will not converge until unpaused");
            }
        }

        let pending: Vec<&str> = pools
            .iter()
            .filter(|p| !p.rollout.is_converged())
            .map(|p| p.name.as_str())
            .collect();
        debug!(total = pools.len(), "Pools still rolling out: {:?}", pending);

        Ok(!pools.is_empty() && pending.is_empty())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{pool, pool_list};
    use super::*;
    use crate::oc::CommandOutput;
    use crate::oc::testing::ScriptedExecutor;

    #[test]
    fn test_parse_converged_pool() {
        let json = pool_list(vec![pool("master", "rendered-master-1", "rendered-master-1", false)]);
        let pools = parse_pools(&json).unwrap();

        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].name, "master");
        assert!(!pools[0].paused);
        assert!(pools[0].rollout.is_converged());
    }

    #[test]
    fn test_config_mismatch_not_converged() {
        let json = pool_list(vec![pool("worker", "rendered-worker-1", "rendered-worker-2", true)]);
        let pools = parse_pools(&json).unwrap();
        assert!(!pools[0].rollout.is_converged());
        assert!(pools[0].rollout.updating);
    }

    #[test]
    fn test_degraded_not_converged() {
        let state = RolloutState {
            current_config: Some("a".to_string()),
            desired_config: Some("a".to_string()),
            updated: true,
            updating: false,
            degraded: true,
        };
        assert!(!state.is_converged());
    }

    #[test]
    fn test_missing_status_not_converged() {
        let json = pool_list(vec![serde_json::json!({"metadata": {"name": "infra"}})]);
        let pools = parse_pools(&json).unwrap();
        assert_eq!(pools[0].rollout, RolloutState::default());
        assert!(!pools[0].rollout.is_converged());
    }

    #[test]
    fn test_paused_flag_parsed() {
        let json = pool_list(vec![serde_json::json!({
            "metadata": {"name": "worker"},
            "spec": {"paused": true}
        })]);
        assert!(parse_pools(&json).unwrap()[0].paused);
    }

    #[test]
    fn test_pause_patch() {
        assert_eq!(pause_patch(true).to_string(), r#"{"spec":{"paused":true}}"#);
        assert_eq!(pause_patch(false).to_string(), r#"{"spec":{"paused":false}}"#);
    }

    #[tokio::test]
    async fn test_pools_converged_condition() {
        let executor = ScriptedExecutor::new().respond_seq(
            "get mcp",
            vec![
                CommandOutput::success(pool_list(vec![
                    pool("master", "m-1", "m-1", false),
                    pool("worker", "w-1", "w-2", true),
                ])),
                CommandOutput::success(pool_list(vec![
                    pool("master", "m-1", "m-1", false),
                    pool("worker", "w-2", "w-2", false),
                ])),
            ],
        );

        assert!(!PoolsConverged.evaluate(&executor).await.unwrap());
        assert!(PoolsConverged.evaluate(&executor).await.unwrap());
    }

    #[tokio::test]
    async fn test_no_pools_is_not_converged() {
        let executor =
            ScriptedExecutor::new().respond("get mcp", CommandOutput::success(pool_list(vec![])));
        assert!(!PoolsConverged.evaluate(&executor).await.unwrap());
    }
}
