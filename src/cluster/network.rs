//! Network operator merge-patch builders.
//!
//! Every builder is a pure function of its inputs. Optional parameters that
//! are unset, or not recognised for the target plugin, are left out of the
//! document entirely rather than written as `null`.

use std::fmt;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

/// Operator-level network configuration object (`oc patch` target).
pub const NETWORK_OPERATOR_RESOURCE: &str = "Network.operator.openshift.io";
/// Cluster-level network configuration object (`oc patch` target).
pub const NETWORK_CONFIG_RESOURCE: &str = "Network.config.openshift.io";
/// Both network objects are cluster singletons with this name.
pub const NETWORK_OBJECT_NAME: &str = "cluster";

/// Cluster network plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum PluginType {
    #[value(name = "OVNKubernetes")]
    OvnKubernetes,
    #[value(name = "OpenShiftSDN")]
    OpenShiftSdn,
}

impl PluginType {
    /// Value of `networkType` as the operator expects it.
    pub fn network_type(&self) -> &'static str {
        match self {
            PluginType::OvnKubernetes => "OVNKubernetes",
            PluginType::OpenShiftSdn => "OpenShiftSDN",
        }
    }

    /// Key of this plugin's block under `spec.defaultNetwork`.
    pub fn config_key(&self) -> &'static str {
        match self {
            PluginType::OvnKubernetes => "ovnKubernetesConfig",
            PluginType::OpenShiftSdn => "openshiftSDNConfig",
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.network_type())
    }
}

/// Tunables exposed for the plugin configuration block.
///
/// `tunnel_port` maps to `genevePort` (OVN-Kubernetes) or `vxlanPort` (OpenShift SDN).
/// `internal_subnet` only exists for OVN-Kubernetes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginParams {
    pub mtu: Option<u32>,
    pub tunnel_port: Option<u16>,
    pub internal_subnet: Option<String>,
}

impl PluginParams {
    pub fn is_empty(&self) -> bool {
        self.mtu.is_none() && self.tunnel_port.is_none() && self.internal_subnet.is_none()
    }
}

/// Legacy SDN features whose automatic migration should be disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationFeatureSet {
    #[serde(rename = "egressIP")]
    pub egress_ip: bool,
    pub egress_firewall: bool,
    pub multicast: bool,
}

impl MigrationFeatureSet {
    /// Unspecified features default to `true`.
    pub fn from_overrides(
        egress_ip: Option<bool>,
        egress_firewall: Option<bool>,
        multicast: Option<bool>,
    ) -> Self {
        Self {
            egress_ip: egress_ip.unwrap_or(true),
            egress_firewall: egress_firewall.unwrap_or(true),
            multicast: multicast.unwrap_or(true),
        }
    }
}

impl Default for MigrationFeatureSet {
    fn default() -> Self {
        Self::from_overrides(None, None, None)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OvnKubernetesConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    mtu: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    geneve_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    v4_internal_subnet: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OpenShiftSdnConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    mtu: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vxlan_port: Option<u16>,
}

/// A partial document for one cluster-scoped network object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPatch {
    pub resource: &'static str,
    pub name: &'static str,
    pub body: Value,
}

impl NetworkPatch {
    fn operator(body: Value) -> Self {
        Self {
            resource: NETWORK_OPERATOR_RESOURCE,
            name: NETWORK_OBJECT_NAME,
            body,
        }
    }

    /// `resource/name` label used in logs and errors.
    pub fn target(&self) -> String {
        format!("{}/{}", self.resource, self.name)
    }
}

/// Build the `spec.defaultNetwork.<plugin>Config` patch for the operator object.
pub fn build_plugin_patch(plugin: PluginType, params: &PluginParams) -> NetworkPatch {
    let config = match plugin {
        PluginType::OvnKubernetes => serde_json::to_value(OvnKubernetesConfig {
            mtu: params.mtu,
            geneve_port: params.tunnel_port,
            v4_internal_subnet: params.internal_subnet.as_deref(),
        }),
        PluginType::OpenShiftSdn => {
            if params.internal_subnet.is_some() {
                debug!("internal subnet is not a {} parameter, omitting", plugin);
            }
            serde_json::to_value(OpenShiftSdnConfig {
                mtu: params.mtu,
                vxlan_port: params.tunnel_port,
            })
        }
    }
    .unwrap_or_else(|_| json!({}));

    let mut default_network = serde_json::Map::new();
    default_network.insert(plugin.config_key().to_string(), config);

    NetworkPatch::operator(json!({ "spec": { "defaultNetwork": default_network } }))
}

/// Build the `spec.migration` patch declaring which features must not be auto-migrated.
pub fn build_migration_feature_patch(
    target: PluginType,
    features: &MigrationFeatureSet,
) -> NetworkPatch {
    NetworkPatch::operator(json!({
        "spec": {
            "migration": {
                "networkType": target.network_type(),
                "features": features,
            }
        }
    }))
}

/// Build the `spec.networkType` patch that switches the cluster network object.
pub fn build_network_type_patch(target: PluginType) -> NetworkPatch {
    NetworkPatch {
        resource: NETWORK_CONFIG_RESOURCE,
        name: NETWORK_OBJECT_NAME,
        body: json!({ "spec": { "networkType": target.network_type() } }),
    }
}
