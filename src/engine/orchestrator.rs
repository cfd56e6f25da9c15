//! Orchestrator engine: translates the tree directly into labels on
//! Kubernetes `Node` objects, writing no file (spec §4.F "orchestrator
//! engine"), grounded on the teacher's `controller.rs` patch pattern.

use super::{Engine, EngineContext};
use crate::error::Error;
use crate::graph::Vertex;
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, Patch, PatchParams};
use serde_json::json;

const LABEL_PREFIX: &str = "topology.topograph.io/switch";

pub struct OrchestratorEngine;

impl OrchestratorEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OrchestratorEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Walks the tree sub-root collecting `(node_name, [ancestor switch ids
/// top-down])` pairs, used to derive the per-node labels written below.
fn leaf_paths(vertex: &Vertex, path: &mut Vec<String>, out: &mut Vec<(String, Vec<String>)>) {
    if vertex.is_leaf() {
        let name = vertex.name.clone().unwrap_or_else(|| vertex.id.clone());
        out.push((name, path.clone()));
        return;
    }
    for child in vertex.children.values() {
        path.push(vertex.id.clone());
        leaf_paths(child, path, out);
        path.pop();
    }
}

impl Engine for OrchestratorEngine {
    fn name(&self) -> &str {
        "orchestrator"
    }

    fn generate_output<'a>(
        &'a self,
        ctx: &'a EngineContext,
        root: &'a Vertex,
        _params: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<Vec<u8>, Error>> {
        Box::pin(async move {
            let client = ctx
                .kube_client
                .clone()
                .ok_or_else(|| Error::fatal("orchestrator engine requires an in-cluster kube client"))?;
            let tree = root
                .tree()
                .ok_or_else(|| Error::user("orchestrator engine requires a tree sub-root"))?;

            let mut leaves = Vec::new();
            for top in tree.children.values() {
                leaf_paths(top, &mut Vec::new(), &mut leaves);
            }

            let nodes: Api<Node> = Api::all(client);
            for (node_name, ancestors) in &leaves {
                // ancestors are root-first: ancestors[0] is the top switch id.
                let mut labels = serde_json::Map::new();
                for (depth, switch_id) in ancestors.iter().enumerate() {
                    labels.insert(format!("{LABEL_PREFIX}-{depth}"), json!(switch_id));
                }
                let patch = json!({
                    "metadata": {
                        "labels": labels,
                    }
                });
                nodes
                    .patch(node_name, &PatchParams::apply("topograph"), &Patch::Merge(&patch))
                    .await
                    .map_err(Error::from)?;
            }
            Ok(Vec::new())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_paths_collects_ancestor_chain() {
        let mut top = Vertex::new("sw1");
        let mut mid = Vertex::new("sw2");
        mid.add_child(Vertex::leaf("node1"));
        top.add_child(mid);

        let mut out = Vec::new();
        leaf_paths(&top, &mut Vec::new(), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, "node1");
        assert_eq!(out[0].1, vec!["sw1".to_string(), "sw2".to_string()]);
    }

    #[test]
    fn leaf_paths_three_levels_deep_has_no_duplicate_top_id() {
        let mut top = Vertex::new("sw1");
        let mut mid = Vertex::new("sw2");
        let mut leaf_switch = Vertex::new("sw3");
        leaf_switch.add_child(Vertex::leaf("node1"));
        mid.add_child(leaf_switch);
        top.add_child(mid);

        let mut out = Vec::new();
        leaf_paths(&top, &mut Vec::new(), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, "node1");
        assert_eq!(
            out[0].1,
            vec!["sw1".to_string(), "sw2".to_string(), "sw3".to_string()]
        );
    }
}
