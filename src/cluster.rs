//! Cluster objects observed and patched by the migration.

pub mod agent;
pub mod machineconfig;
pub mod network;
pub mod nodes;
pub mod pools;
pub mod version;

use serde::Deserialize;

/// Generic `items` envelope returned by `oc get <kind> -o json`.
#[derive(Debug, Deserialize)]
pub(crate) struct ItemList<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}
