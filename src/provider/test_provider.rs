//! Deterministic `test` simulator: loads a YAML topology model instead of
//! calling out to a cloud, used for scenario tests and local development
//! (spec §4.E, §8 end-to-end scenarios #1-3).

use super::{Provider, ProviderContext};
use crate::error::Error;
use crate::graph::{NO_TOPOLOGY, Vertex};
use crate::model::ComputeInstanceSet;
use futures::future::BoxFuture;
use serde::Deserialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Deserialize, Default)]
struct ModelSwitch {
    id: String,
    #[serde(default)]
    switches: Vec<ModelSwitch>,
    #[serde(default)]
    nodes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ModelBlock {
    id: String,
    nodes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct TopologyModel {
    #[serde(default)]
    tree: Vec<ModelSwitch>,
    #[serde(default)]
    blocks: Vec<ModelBlock>,
}

fn build_switch(model: &ModelSwitch) -> Vertex {
    let mut vertex = Vertex::new(model.id.clone());
    for child in &model.switches {
        vertex.add_child(build_switch(child));
    }
    for node in &model.nodes {
        vertex.add_child(Vertex::leaf(node.clone()));
    }
    vertex
}

fn model_root(model: &TopologyModel) -> Vertex {
    let mut root = Vertex::root();
    if !model.tree.is_empty() {
        let tree = root.tree_mut();
        for switch in &model.tree {
            tree.add_child(build_switch(switch));
        }
    }
    if !model.blocks.is_empty() {
        let block = root.block_mut();
        for b in &model.blocks {
            let mut bvertex = Vertex::new(b.id.clone());
            for node in &b.nodes {
                bvertex.add_child(Vertex::leaf(node.clone()));
            }
            block.add_child(bvertex);
        }
    }
    root
}

/// The single YAML payload the scenario table calls "no nodes in payload"
/// (spec §8 scenario #1): `S1` fanning out to `S2`/`S3`.
const DEFAULT_MODEL_YAML: &str = r#"
tree:
  - id: S1
    switches:
      - id: S2
        nodes: [Node201, Node202, Node205]
      - id: S3
        nodes: [Node304, Node305, Node306]
"#;

/// `medium.yaml`: one top switch fanning into two mid switches, each with
/// its own leaf switches, plus one instance with no reported topology.
const MEDIUM_MODEL_YAML: &str = r#"
tree:
  - id: sw3
    switches:
      - id: sw21
        switches:
          - id: sw211
            nodes: [n-1101, n-1102]
          - id: sw212
            nodes: [n-1201, n-1202]
      - id: sw22
        switches:
          - id: sw221
            nodes: [n-1301, n-1302]
          - id: sw222
            nodes: [n-1401, n-1402]
"#;

/// `large.yaml`: twelve accelerator blocks of 32 nodes each, used with
/// the block renderer plugin (spec §8 scenario #3). 32 nodes per block
/// keeps the renderer's natural minimum block size at 32, the smallest
/// value the documented admin override `block_sizes: 8,16,32` can
/// validate against (`validate_admin_sizes` rejects any admin size
/// greater than the natural minimum).
fn large_model_yaml() -> String {
    let mut out = String::from("blocks:\n");
    for block in 1..=12u32 {
        let base = (block - 1) * 32 + 1;
        let nodes = (0..32u32)
            .map(|i| format!("n-{:04}", base + i))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!("  - id: block{block:03}\n    nodes: [{nodes}]\n"));
    }
    out
}

pub struct TestProvider {
    model: TopologyModel,
}

impl TestProvider {
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        let model: TopologyModel = serde_yaml::from_str(yaml).map_err(Error::from)?;
        Ok(Self { model })
    }

    pub fn default_model() -> Self {
        Self::from_yaml(DEFAULT_MODEL_YAML).expect("embedded default model is valid")
    }

    /// Resolves a named built-in model (`medium`, `large`) or, absent a
    /// `model` param, the default scenario-#1 model. `model_yaml` takes
    /// precedence when set, letting tests inject an arbitrary payload
    /// without touching the filesystem.
    fn resolve(ctx: &ProviderContext) -> Result<TopologyModel, Error> {
        if let Some(yaml) = ctx.param_str("model_yaml") {
            return serde_yaml::from_str(&yaml).map_err(Error::from);
        }
        let yaml = match ctx.param_str("model").as_deref() {
            Some("medium") => MEDIUM_MODEL_YAML.to_string(),
            Some("large") => large_model_yaml(),
            Some(other) => {
                return Err(Error::user(format!("unknown test model: {other}")));
            }
            None => DEFAULT_MODEL_YAML.to_string(),
        };
        serde_yaml::from_str(&yaml).map_err(Error::from)
    }
}

impl Default for TestProvider {
    fn default() -> Self {
        Self::default_model()
    }
}

/// Restricts `vertex` to the subtree touching `wanted`, returning `None`
/// when nothing underneath is wanted (spec §4.D per-partition pruning,
/// reused here to filter the model down to the requested instance set).
fn prune<'a>(vertex: &Vertex, wanted: &HashSet<&'a str>) -> Option<Vertex> {
    if vertex.is_leaf() {
        return if wanted.contains(vertex.id.as_str()) {
            Some(vertex.clone())
        } else {
            None
        };
    }
    let mut kept = Vertex::new(vertex.id.clone());
    kept.name = vertex.name.clone();
    kept.metadata = vertex.metadata.clone();
    for child in vertex.children.values() {
        if let Some(pruned) = prune(child, wanted) {
            kept.add_child(pruned);
        }
    }
    if kept.children.is_empty() {
        None
    } else {
        Some(kept)
    }
}

impl Provider for TestProvider {
    fn name(&self) -> &str {
        "test"
    }

    fn generate_topology_config<'a>(
        &'a self,
        ctx: &'a ProviderContext,
        instances: &'a ComputeInstanceSet,
    ) -> BoxFuture<'a, Result<Vertex, Error>> {
        Box::pin(async move {
            let model = Self::resolve(ctx)?;
            let full = model_root(&model);
            let requested = super::flatten_instances(instances);

            if requested.is_empty() {
                return Ok(full);
            }

            let mut known = HashSet::new();
            full.collect_ids(&mut Vec::new()); // validates no panics on malformed model
            for (_, name) in &requested {
                known.insert(name.as_str());
            }

            let mut root = Vertex::root();
            if let Some(tree) = full.tree() {
                if let Some(pruned) = prune(tree, &known) {
                    root.add_child(pruned);
                } else {
                    root.add_child(Vertex::new(crate::graph::TREE_ROOT));
                }
            }
            if let Some(block) = full.block() {
                if let Some(pruned) = prune(block, &known) {
                    root.add_child(pruned);
                }
            }

            let mut present = HashSet::new();
            if let Some(tree) = root.tree() {
                let mut ids = Vec::new();
                tree.collect_ids(&mut ids);
                present.extend(ids);
            }
            if let Some(block) = root.block() {
                let mut ids = Vec::new();
                block.collect_ids(&mut ids);
                present.extend(ids);
            }

            let missing: Vec<(String, String)> = requested
                .into_iter()
                .filter(|(_, name)| !present.contains(name.as_str()))
                .collect();
            if !missing.is_empty() {
                let tree = root.tree_mut();
                let bucket = tree
                    .children
                    .entry(NO_TOPOLOGY.to_string())
                    .or_insert_with(|| Vertex::new(NO_TOPOLOGY));
                for (_, name) in missing {
                    bucket.add_child(Vertex::leaf(name));
                }
            }

            Ok(root)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ComputeInstanceGroup;
    use std::collections::BTreeMap;

    fn ctx_with_params(params: serde_json::Value) -> ProviderContext {
        ProviderContext::new(serde_json::Value::Null, params)
    }

    #[tokio::test]
    async fn scenario_one_no_nodes_in_payload_returns_full_default_model() {
        let provider = TestProvider::default_model();
        let ctx = ctx_with_params(serde_json::json!({}));
        let root = provider.generate_topology_config(&ctx, &vec![]).await.unwrap();
        let tree = root.tree().unwrap();
        let s1 = tree.children.get("S1").unwrap();
        assert_eq!(s1.children.len(), 2);
        let s2 = s1.children.get("S2").unwrap();
        assert_eq!(s2.children.len(), 3);
    }

    #[tokio::test]
    async fn scenario_two_medium_model_buckets_missing_instance() {
        let provider = TestProvider::default_model();
        let ctx = ctx_with_params(serde_json::json!({"model": "medium"}));
        let mut instances = BTreeMap::new();
        for n in ["n-1101", "n-1102", "n-1201", "n-1202", "n-1301", "n-1302", "n-1401", "n-1402"] {
            instances.insert(n.to_string(), n.to_string());
        }
        instances.insert("n-CPU".to_string(), "n-CPU".to_string());
        let nodes: ComputeInstanceSet = vec![ComputeInstanceGroup {
            region: "test".into(),
            instances,
        }];
        let root = provider.generate_topology_config(&ctx, &nodes).await.unwrap();
        let tree = root.tree().unwrap();
        assert!(tree.children.contains_key("sw3"));
        let no_topology = tree.children.get(NO_TOPOLOGY).unwrap();
        assert!(no_topology.children.contains_key("n-CPU"));
    }

    #[tokio::test]
    async fn scenario_three_large_model_has_twelve_blocks() {
        let provider = TestProvider::default_model();
        let ctx = ctx_with_params(serde_json::json!({"model": "large"}));
        let root = provider.generate_topology_config(&ctx, &vec![]).await.unwrap();
        let block = root.block().unwrap();
        assert_eq!(block.children.len(), 12);
    }

    #[tokio::test]
    async fn scenario_three_admin_block_sizes_survive_rendering() {
        let provider = TestProvider::default_model();
        let ctx = ctx_with_params(serde_json::json!({"model": "large"}));
        let root = provider.generate_topology_config(&ctx, &vec![]).await.unwrap();

        let config = crate::render::RendererConfig {
            plugin: Some(crate::render::Plugin::Block),
            block_sizes: vec![8, 16, 32],
            ..Default::default()
        };
        let metrics = crate::metrics::Metrics::new("test");
        let rendered = crate::render::render(&root, &config, &metrics).unwrap();
        let text = String::from_utf8(rendered).unwrap();
        assert!(text.contains("BlockSizes=8,16,32\n"));
    }

    #[tokio::test]
    async fn unknown_model_name_is_user_error() {
        let provider = TestProvider::default_model();
        let ctx = ctx_with_params(serde_json::json!({"model": "nonexistent"}));
        let err = provider.generate_topology_config(&ctx, &vec![]).await.unwrap_err();
        assert!(matches!(err, Error::User(_)));
    }
}
