//! Per-node machine config verification.
//!
//! Pool convergence says the rollout finished. This checks what it finished
//! with: every node must be `Done` on its desired rendered config, and that
//! config must start `configure-ovs.sh` for the target plugin.

use std::collections::HashMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use serde::Deserialize;
use tracing::debug;

use super::ItemList;
use super::network::PluginType;
use super::nodes::list_nodes_command;
use crate::error::MigrationError;
use crate::oc::{CommandExecutor, Condition, OcCommand};

const CURRENT_CONFIG_ANNOTATION: &str = "machineconfiguration.openshift.io/currentConfig";
const DESIRED_CONFIG_ANNOTATION: &str = "machineconfiguration.openshift.io/desiredConfig";
const STATE_ANNOTATION: &str = "machineconfiguration.openshift.io/state";
const STATE_DONE: &str = "Done";
const CONFIGURE_OVS_EXEC: &str = "ExecStart=/usr/local/bin/configure-ovs.sh";

/// Machine config daemon annotations of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMachineConfig {
    pub node: String,
    pub current_config: Option<String>,
    pub desired_config: Option<String>,
    pub state: Option<String>,
}

impl NodeMachineConfig {
    /// Why this node has not settled, or `None` if it has.
    pub fn pending_reason(&self) -> Option<String> {
        match (&self.current_config, &self.state) {
            (None, _) => Some(format!("node {} has no current machine config", self.node)),
            (_, state) if state.as_deref() != Some(STATE_DONE) => Some(format!(
                "node {} machine config state is {}, not {}",
                self.node,
                state.as_deref().unwrap_or("unset"),
                STATE_DONE
            )),
            (current, _) if *current != self.desired_config => Some(format!(
                "node {} currentConfig ({}) does not match desiredConfig ({})",
                self.node,
                current.as_deref().unwrap_or("unset"),
                self.desired_config.as_deref().unwrap_or("unset")
            )),
            _ => None,
        }
    }
}

/// Parse the machine config annotations out of `oc get nodes -o json`.
pub fn parse_node_machine_configs(json: &str) -> Result<Vec<NodeMachineConfig>, MigrationError> {
    let list: ItemList<Node> =
        serde_json::from_str(json).map_err(|e| MigrationError::parse("node list", e))?;

    Ok(list
        .items
        .into_iter()
        .map(|node| {
            let annotations = node.metadata.annotations.unwrap_or_default();
            NodeMachineConfig {
                node: node.metadata.name.unwrap_or_default(),
                current_config: annotations.get(CURRENT_CONFIG_ANNOTATION).cloned(),
                desired_config: annotations.get(DESIRED_CONFIG_ANNOTATION).cloned(),
                state: annotations.get(STATE_ANNOTATION).cloned(),
            }
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct MachineConfigObject {
    #[serde(default)]
    spec: MachineConfigSpec,
}

#[derive(Debug, Default, Deserialize)]
struct MachineConfigSpec {
    #[serde(default)]
    config: IgnitionConfig,
}

#[derive(Debug, Default, Deserialize)]
struct IgnitionConfig {
    #[serde(default)]
    systemd: Systemd,
}

#[derive(Debug, Default, Deserialize)]
struct Systemd {
    #[serde(default)]
    units: Vec<SystemdUnit>,
}

#[derive(Debug, Deserialize)]
struct SystemdUnit {
    #[serde(default)]
    contents: Option<String>,
    #[serde(default)]
    dropins: Vec<SystemdDropin>,
}

#[derive(Debug, Deserialize)]
struct SystemdDropin {
    #[serde(default)]
    contents: Option<String>,
}

pub fn machine_config_command(name: &str) -> OcCommand {
    OcCommand::get_json("machineconfig", Some(name), None)
}

/// Plugin argument of the `configure-ovs.sh` systemd unit, if any unit runs it.
pub fn configured_plugin(json: &str) -> Result<Option<String>, MigrationError> {
    let config: MachineConfigObject =
        serde_json::from_str(json).map_err(|e| MigrationError::parse("machine config", e))?;

    let contents = config.spec.config.systemd.units.iter().flat_map(|unit| {
        unit.contents
            .iter()
            .chain(unit.dropins.iter().filter_map(|d| d.contents.as_ref()))
    });

    for text in contents {
        for line in text.lines() {
            if let Some(args) = line.trim().strip_prefix(CONFIGURE_OVS_EXEC) {
                if let Some(plugin) = args.split_whitespace().next() {
                    return Ok(Some(plugin.to_string()));
                }
            }
        }
    }
    Ok(None)
}

/// Satisfied when every node is `Done` on its desired config and that
/// rendered config configures the target plugin.
///
/// A node on a config for the wrong plugin is reported as an error so the
/// poller keeps it as the last failure.
#[derive(Debug, Clone)]
pub struct NodesConfigured {
    pub plugin: PluginType,
}

#[async_trait]
impl Condition for NodesConfigured {
    fn describe(&self) -> String {
        format!("all nodes rendered for {}", self.plugin)
    }

    async fn evaluate(&self, executor: &dyn CommandExecutor) -> Result<bool, MigrationError> {
        let stdout = run_checked(executor, &list_nodes_command()).await?;
        let nodes = parse_node_machine_configs(&stdout)?;
        if nodes.is_empty() {
            return Ok(false);
        }

        if let Some(reason) = nodes.iter().find_map(NodeMachineConfig::pending_reason) {
            debug!("Machine config not settled: {}", reason);
            return Ok(false);
        }

        let expected = self.plugin.network_type();
        let mut verified: HashMap<&str, Option<String>> = HashMap::new();
        for node in &nodes {
            let Some(config_name) = node.current_config.as_deref() else {
                return Ok(false);
            };
            if !verified.contains_key(config_name) {
                let json = run_checked(executor, &machine_config_command(config_name)).await?;
                verified.insert(config_name, configured_plugin(&json)?);
            }

            let found = verified.get(config_name).cloned().flatten();
            if found.as_deref() != Some(expected) {
                return Err(MigrationError::MachineConfigMismatch {
                    node: node.node.clone(),
                    details: format!(
                        "rendered config {} runs configure-ovs.sh for {}, expected {}",
                        config_name,
                        found.as_deref().unwrap_or("no plugin"),
                        expected
                    ),
                });
            }
        }

        debug!(nodes = nodes.len(), plugin = expected, "All node machine configs verified");
        Ok(true)
    }
}

async fn run_checked(
    executor: &dyn CommandExecutor,
    command: &OcCommand,
) -> Result<String, MigrationError> {
    let output = executor.execute(command).await?;
    if output.is_success() {
        Ok(output.stdout)
    } else {
        Err(MigrationError::TransientCommandFailure {
            command: command.to_string(),
            stderr: output.stderr,
        })
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::{Value, json};

    /// A rendered MachineConfig whose ovs-configuration unit targets `network_type`.
    pub fn rendered_config(name: &str, network_type: &str) -> String {
        json!({
            "apiVersion": "machineconfiguration.openshift.io/v1",
            "kind": "MachineConfig",
            "metadata": {"name": name},
            "spec": {"config": {
                "ignition": {"version": "3.2.0"},
                "systemd": {"units": [
                    {"name": "kubelet.service", "enabled": true, "contents": "[Service]\nExecStart=/usr/bin/kubelet"},
                    {
                        "name": "ovs-configuration.service",
                        "enabled": true,
                        "contents": format!(
                            "[Unit]\nDescription=Configures OVS with proper host networking configuration\n\n[Service]\nType=oneshot\nExecStart=/usr/local/bin/configure-ovs.sh {}\n",
                            network_type
                        )
                    }
                ]}
            }}
        })
        .to_string()
    }

    /// Override the machine config annotations of a node fixture.
    pub fn with_machine_config(mut node: Value, current: &str, desired: &str, state: &str) -> Value {
        node["metadata"]["annotations"] = json!({
            "machineconfiguration.openshift.io/currentConfig": current,
            "machineconfiguration.openshift.io/desiredConfig": desired,
            "machineconfiguration.openshift.io/state": state,
        });
        node
    }
}
