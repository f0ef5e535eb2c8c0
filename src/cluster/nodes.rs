//! Node listing, role classification and readiness.

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use tracing::debug;

use super::ItemList;
use crate::error::MigrationError;
use crate::oc::{CommandExecutor, Condition, OcCommand};

const MASTER_ROLE_LABELS: &[&str] = &[
    "node-role.kubernetes.io/master",
    "node-role.kubernetes.io/control-plane",
];
const WORKER_ROLE_LABEL: &str = "node-role.kubernetes.io/worker";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Master,
    Worker,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Master => f.write_str("master"),
            NodeRole::Worker => f.write_str("worker"),
        }
    }
}

/// Observed node. Re-fetched on every poll, never cached across waits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNode {
    pub name: String,
    /// `None` for nodes carrying neither a master nor a worker role label.
    pub role: Option<NodeRole>,
    pub ready: bool,
}

/// Classify a node by its role labels. A node labelled both master and worker
/// (compact clusters) is a master.
fn role_of(node: &Node) -> Option<NodeRole> {
    let labels = node.metadata.labels.as_ref()?;
    if MASTER_ROLE_LABELS.iter().any(|l| labels.contains_key(*l)) {
        Some(NodeRole::Master)
    } else if labels.contains_key(WORKER_ROLE_LABEL) {
        Some(NodeRole::Worker)
    } else {
        None
    }
}

fn is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conds| conds.iter().find(|c| c.type_ == "Ready"))
        .is_some_and(|c| c.status == "True")
}

/// Parse the JSON output of `oc get nodes -o json`.
pub fn parse_node_list(json: &str) -> Result<Vec<ClusterNode>, MigrationError> {
    let list: ItemList<Node> =
        serde_json::from_str(json).map_err(|e| MigrationError::parse("node list", e))?;

    Ok(list
        .items
        .iter()
        .map(|node| ClusterNode {
            name: node.metadata.name.clone().unwrap_or_default(),
            role: role_of(node),
            ready: is_ready(node),
        })
        .collect())
}

/// Nodes with the given role, in listing order.
pub fn nodes_with_role(nodes: &[ClusterNode], role: NodeRole) -> Vec<&ClusterNode> {
    nodes.iter().filter(|n| n.role == Some(role)).collect()
}

pub fn list_nodes_command() -> OcCommand {
    OcCommand::get_json("nodes", None, None)
}

/// Satisfied when the node list is non-empty and every node reports `Ready=True`.
#[derive(Debug, Clone, Default)]
pub struct NodesReady;

#[async_trait]
impl Condition for NodesReady {
    fn describe(&self) -> String {
        "all nodes Ready".to_string()
    }

    async fn evaluate(&self, executor: &dyn CommandExecutor) -> Result<bool, MigrationError> {
        let command = list_nodes_command();
        let output = executor.execute(&command).await?;
        if !output.is_success() {
            return Err(MigrationError::TransientCommandFailure {
                command: command.to_string(),
                stderr: output.stderr,
            });
        }

        let nodes = parse_node_list(&output.stdout)?;
        let not_ready: Vec<&str> = nodes
            .iter()
            .filter(|n| !n.ready)
            .map(|n| n.name.as_str())
            .collect();

        debug!(
            total = nodes.len(),
            not_ready = not_ready.len(),
            "Node readiness: {:?}",
            not_ready
        );
        Ok(!nodes.is_empty() && not_ready.is_empty())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::{Value, json};

    /// One node item as `oc get nodes -o json` renders it, settled on
    /// `rendered-<first role>-2`.
    pub fn node(name: &str, roles: &[&str], ready: bool) -> Value {
        let rendered = format!("rendered-{}-2", roles.first().copied().unwrap_or("worker"));
        let mut labels = serde_json::Map::new();
        labels.insert("kubernetes.io/hostname".to_string(), json!(name));
        for role in roles {
            labels.insert(format!("node-role.kubernetes.io/{}", role), json!(""));
        }
        json!({
            "apiVersion": "v1",
            "kind": "Node",
            "metadata": {
                "name": name,
                "labels": labels,
                "annotations": {
                    "machineconfiguration.openshift.io/currentConfig": rendered,
                    "machineconfiguration.openshift.io/desiredConfig": rendered,
                    "machineconfiguration.openshift.io/state": "Done"
                }
            },
            "status": {"conditions": [
                {"type": "MemoryPressure", "status": "False"},
                {"type": "Ready", "status": if ready { "True" } else { "False" }}
            ]}
        })
    }

    pub fn node_list(items: Vec<Value>) -> String {
        json!({"apiVersion": "v1", "kind": "List", "items": items}).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{node, node_list};
    use super::*;
    use crate::oc::CommandOutput;
    use crate::oc::testing::ScriptedExecutor;

    #[test]
    fn test_parse_roles_and_readiness() {
        let json = node_list(vec![
            node("master-0", &["master"], true),
            node("worker-0", &["worker"], false),
            node("infra-0", &["infra"], true),
        ]);
        let nodes = parse_node_list(&json).unwrap();

        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].role, Some(NodeRole::Master));
        assert!(nodes[0].ready);
        assert_eq!(nodes[1].role, Some(NodeRole::Worker));
        assert!(!nodes[1].ready);
        assert_eq!(nodes[2].role, None);
    }

    #[test]
    fn test_compact_node_is_master_only() {
        let json = node_list(vec![node("compact-0", &["master", "worker"], true)]);
        let nodes = parse_node_list(&json).unwrap();

        assert_eq!(nodes_with_role(&nodes, NodeRole::Master).len(), 1);
        assert!(nodes_with_role(&nodes, NodeRole::Worker).is_empty());
    }

    #[test]
    fn test_control_plane_label_is_master() {
        let json = node_list(vec![node("cp-0", &["control-plane"], true)]);
        let nodes = parse_node_list(&json).unwrap();
        assert_eq!(nodes[0].role, Some(NodeRole::Master));
    }

    #[test]
    fn test_missing_ready_condition_is_not_ready() {
        let json = node_list(vec![serde_json::json!({
            "apiVersion": "v1",
            "kind": "Node",
            "metadata": {"name": "booting-0"}
        })]);
        let nodes = parse_node_list(&json).unwrap();
        assert!(!nodes[0].ready);
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(matches!(
            parse_node_list("not json"),
            Err(MigrationError::Parse { .. })
        ));
    }

    #[test]
    fn test_nodes_with_role_keeps_order() {
        let json = node_list(vec![
            node("m-2", &["master"], true),
            node("w-0", &["worker"], true),
            node("m-0", &["master"], true),
        ]);
        let nodes = parse_node_list(&json).unwrap();
        let masters: Vec<&str> = nodes_with_role(&nodes, NodeRole::Master)
            .iter()
            .map(|n| n.name.as_str())
            .collect();
        assert_eq!(masters, vec!["m-2", "m-0"]);
    }

    #[tokio::test]
    async fn test_nodes_ready_condition() {
        let executor = ScriptedExecutor::new().respond_seq(
            "get nodes",
            vec![
                CommandOutput::success(node_list(vec![
                    node("m-0", &["master"], true),
                    node("w-0", &["worker"], false),
                ])),
                CommandOutput::success(node_list(vec![
                    node("m-0", &["master"], true),
                    node("w-0", &["worker"], true),
                ])),
            ],
        );

        assert!(!NodesReady.evaluate(&executor).await.unwrap());
        assert!(NodesReady.evaluate(&executor).await.unwrap());
    }

    #[tokio::test]
    async fn test_nodes_ready_empty_list_is_not_ready() {
        let executor =
            ScriptedExecutor::new().respond("get nodes", CommandOutput::success(node_list(vec![])));
        assert!(!NodesReady.evaluate(&executor).await.unwrap());
    }

    #[tokio::test]
    async fn test_nodes_ready_api_unreachable_is_error() {
        let executor = ScriptedExecutor::new().respond(
            "get nodes",
            CommandOutput::failure(1, "The connection to the server was refused"),
        );
        let err = NodesReady.evaluate(&executor).await.unwrap_err();
        assert!(err.is_transient());
    }
}
