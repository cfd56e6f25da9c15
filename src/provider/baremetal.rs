//! Baremetal provider: no cloud API to page through, the fabric topology
//! comes from a static inventory handed in via `params.inventory`
//! (spec §4.E "baremetal" builtin).

use super::{Provider, ProviderContext};
use crate::error::Error;
use crate::graph::{to_three_tier, InstanceRecord, Vertex};
use crate::model::ComputeInstanceSet;
use futures::future::BoxFuture;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
struct InventoryEntry {
    instance_id: String,
    node_name: String,
    switches: [String; 3],
}

pub struct BaremetalProvider;

impl BaremetalProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BaremetalProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for BaremetalProvider {
    fn name(&self) -> &str {
        "baremetal"
    }

    fn generate_topology_config<'a>(
        &'a self,
        ctx: &'a ProviderContext,
        _instances: &'a ComputeInstanceSet,
    ) -> BoxFuture<'a, Result<Vertex, Error>> {
        Box::pin(async move {
            let inventory = ctx
                .params
                .get("inventory")
                .cloned()
                .ok_or_else(|| Error::user("baremetal provider requires params.inventory"))?;
            let entries: Vec<InventoryEntry> =
                serde_json::from_value(inventory).map_err(|e| Error::user(e.to_string()))?;

            let instance_records: Vec<InstanceRecord> = entries
                .into_iter()
                .map(|e| InstanceRecord {
                    instance_id: e.instance_id,
                    switches: e.switches,
                    node_name: e.node_name,
                })
                .collect();

            to_three_tier("baremetal", &instance_records, &[], false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_tree_from_inventory_param() {
        let inventory = serde_json::json!([
            {"instance_id": "h1", "node_name": "node1", "switches": ["sw1", "sw2", "sw3"]},
            {"instance_id": "h2", "node_name": "node2", "switches": ["sw1", "sw2", "sw3"]},
        ]);
        let ctx = ProviderContext::new(serde_json::Value::Null, serde_json::json!({"inventory": inventory}));
        let provider = BaremetalProvider::new();
        let root = provider.generate_topology_config(&ctx, &vec![]).await.unwrap();
        let tree = root.tree().unwrap();
        let sw1 = tree.children.get("sw1").unwrap();
        let sw2 = sw1.children.get("sw2").unwrap();
        let sw3 = sw2.children.get("sw3").unwrap();
        assert_eq!(sw3.children.len(), 2);
    }

    #[tokio::test]
    async fn missing_inventory_param_is_user_error() {
        let ctx = ProviderContext::new(serde_json::Value::Null, serde_json::json!({}));
        let provider = BaremetalProvider::new();
        let err = provider.generate_topology_config(&ctx, &vec![]).await.unwrap_err();
        assert!(matches!(err, Error::User(_)));
    }
}
