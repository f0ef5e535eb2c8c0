//! Node-local management agent pods (machine-config-daemon).

use k8s_openapi::api::core::v1::Pod;

use super::ItemList;
use crate::error::MigrationError;
use crate::oc::OcCommand;

/// The agent instance scheduled on a node; reboot commands run through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentPod {
    pub name: String,
    pub node_name: String,
}

pub fn list_agent_pods_command(namespace: &str) -> OcCommand {
    OcCommand::get_json("pods", None, Some(namespace))
}

/// Parse `oc get pods -n <namespace> -o json`, keeping pods of `daemonset_name`
/// that are assigned to a node.
pub fn parse_agent_pods(json: &str, daemonset_name: &str) -> Result<Vec<AgentPod>, MigrationError> {
    let list: ItemList<Pod> =
        serde_json::from_str(json).map_err(|e| MigrationError::parse("pod list", e))?;

    Ok(list
        .items
        .into_iter()
        .filter_map(|pod| {
            let name = pod.metadata.name?;
            let node_name = pod.spec?.node_name?;
            name.contains(daemonset_name)
                .then_some(AgentPod { name, node_name })
        })
        .collect())
}

/// Resolve the agent co-located with `node_name`.
pub fn agent_for_node<'a>(pods: &'a [AgentPod], node_name: &str) -> Option<&'a AgentPod> {
    pods.iter().find(|p| p.node_name == node_name)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::{Value, json};

    pub fn pod(name: &str, node: &str) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": name, "namespace": "openshift-machine-config-operator"},
            "spec": {"nodeName": node, "containers": []}
        })
    }

    pub fn pod_list(items: Vec<Value>) -> String {
        json!({"apiVersion": "v1", "kind": "List", "items": items}).to_string()
    }
}
