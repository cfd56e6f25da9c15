//! Topology renderer (spec §4.D): turns a [`Vertex`] tree into
//! scheduler-consumable bytes, either hierarchical `tree` text, flat
//! `block` text, or a per-partition YAML sequence.

use crate::error::Error;
use crate::graph::Vertex;
use crate::metrics::Metrics;
use crate::model::fnv1a_hex;
use crate::nodeset;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};

/// Downstream orchestrator label-value limit (spec §4.D).
const MAX_LABEL_BYTES: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plugin {
    #[default]
    Tree,
    Block,
    Flat,
}

impl Plugin {
    pub fn parse(name: &str) -> Plugin {
        match name {
            "block" => Plugin::Block,
            "flat" => Plugin::Flat,
            _ => Plugin::Tree,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartitionSpec {
    #[serde(default)]
    pub plugin: Plugin,
    #[serde(default)]
    pub cluster_default: bool,
    #[serde(default)]
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RendererConfig {
    #[serde(default)]
    pub plugin: Option<Plugin>,
    #[serde(default)]
    pub block_sizes: Vec<u64>,
    #[serde(default)]
    pub fake_node_pool: Option<String>,
    #[serde(default)]
    pub topologies: BTreeMap<String, PartitionSpec>,
}

/// Validates a config against a built root before rendering (spec §4.D
/// Validation).
pub fn validate(root: &Vertex, config: &RendererConfig) -> Result<(), Error> {
    if !config.topologies.is_empty() {
        if config.plugin.is_some() {
            return Err(Error::user(
                "`topologies` and `plugin` are mutually exclusive",
            ));
        }
        for (name, spec) in &config.topologies {
            if spec.plugin != Plugin::Flat && spec.nodes.is_empty() {
                return Err(Error::user(format!(
                    "partition {name} must specify a non-empty node list"
                )));
            }
        }
        return Ok(());
    }

    match config.plugin.unwrap_or_default() {
        Plugin::Tree => {
            if root.tree().is_none() {
                return Err(Error::user("tree plugin requires a `tree` sub-root"));
            }
        }
        Plugin::Block => {
            if root.block().is_none() {
                return Err(Error::user("block plugin requires a `block` sub-root"));
            }
        }
        Plugin::Flat => {}
    }
    Ok(())
}

pub fn render(root: &Vertex, config: &RendererConfig, metrics: &Metrics) -> Result<Vec<u8>, Error> {
    validate(root, config)?;
    if !config.topologies.is_empty() {
        return render_partitions(root, config);
    }
    let text = match config.plugin.unwrap_or_default() {
        Plugin::Tree => render_tree(root)?,
        Plugin::Block => render_block(root, config, metrics)?,
        Plugin::Flat => String::new(),
    };
    Ok(text.into_bytes())
}

/// Caches long-id -> short-id mappings so the same input always maps to
/// the same shortened form (spec §4.D Label-length mitigation).
#[derive(Default)]
pub struct ShortNameCache {
    map: BTreeMap<String, String>,
}

impl ShortNameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the display id to use and, if shortened, the `# long=short`
    /// comment line that must precede its use.
    pub fn shorten(&mut self, id: &str) -> (String, Option<String>) {
        if id.len() <= MAX_LABEL_BYTES {
            return (id.to_string(), None);
        }
        let short = self
            .map
            .entry(id.to_string())
            .or_insert_with(|| format!("x{}", fnv1a_hex(id)))
            .clone();
        (short.clone(), Some(format!("# {id}={short}")))
    }
}

fn render_tree(root: &Vertex) -> Result<String, Error> {
    let tree = root
        .tree()
        .ok_or_else(|| Error::fatal("render_tree called without a tree sub-root"))?;
    let mut out = String::new();
    let mut shortener = ShortNameCache::new();
    let mut queue: VecDeque<&Vertex> = tree.children.values().collect();

    while let Some(vertex) = queue.pop_front() {
        if vertex.is_leaf() {
            continue;
        }
        let leaf_parent = vertex.children.values().all(Vertex::is_leaf);
        let (display_id, comment) = shortener.shorten(&vertex.id);
        if let Some(comment) = comment {
            out.push_str(&comment);
            out.push('\n');
        }
        if leaf_parent {
            let names: Vec<String> = vertex
                .children
                .values()
                .map(|c| c.name.clone().unwrap_or_else(|| c.id.clone()))
                .collect();
            let compacted = nodeset::compact(&names).join(",");
            out.push_str(&format!("SwitchName={display_id} Nodes={compacted}\n"));
        } else {
            let ids: Vec<String> = vertex.children.keys().cloned().collect();
            let compacted = nodeset::compact(&ids).join(",");
            out.push_str(&format!("SwitchName={display_id} Switches={compacted}\n"));
            for child in vertex.children.values() {
                queue.push_back(child);
            }
        }
    }
    Ok(out)
}

/// A monotonically advancing cursor over an expanded fake-node name pool.
pub struct FakeNodePool {
    names: Vec<String>,
    cursor: usize,
}

impl FakeNodePool {
    pub fn new(expr: Option<&str>) -> Self {
        let names = expr.map(nodeset::expand_list).unwrap_or_default();
        Self { names, cursor: 0 }
    }

    pub fn take(&mut self, n: usize) -> Result<Vec<String>, Error> {
        if n == 0 {
            return Ok(Vec::new());
        }
        if self.cursor + n > self.names.len() {
            return Err(Error::fatal("NotEnoughFakeNodes"));
        }
        let slice = self.names[self.cursor..self.cursor + n].to_vec();
        self.cursor += n;
        Ok(slice)
    }
}

/// Validates admin-requested block sizes per the spec §4.D rule: the
/// first entry must fall in `(0, m]` and every entry must equal
/// `2^k * first` for `k` in `[0, K]`.
pub fn validate_admin_sizes(admin: &[u64], m: u64, k: u32) -> bool {
    if admin.is_empty() || admin[0] == 0 || admin[0] > m {
        return false;
    }
    if admin.len() as u32 > k + 1 {
        return false;
    }
    admin
        .iter()
        .enumerate()
        .all(|(idx, &size)| size == admin[0].saturating_mul(1u64 << idx as u32))
}

/// `K = floor(log2(#blocks))`, with `#blocks = 0` treated as 1 block.
pub fn top_k(num_blocks: usize) -> u32 {
    let n = num_blocks.max(1);
    (usize::BITS - 1 - n.leading_zeros()) as u32
}

/// Default block sizes `[m, 2m, 4m, ..., 2^K * m]`.
pub fn default_block_sizes(m: u64, k: u32) -> Vec<u64> {
    (0..=k).map(|kk| m.saturating_mul(1u64 << kk)).collect()
}

fn render_block(root: &Vertex, config: &RendererConfig, metrics: &Metrics) -> Result<String, Error> {
    let block_root = root
        .block()
        .ok_or_else(|| Error::fatal("render_block called without a block sub-root"))?;
    let fake_enabled = config.fake_node_pool.is_some();
    let mut pool = FakeNodePool::new(config.fake_node_pool.as_deref());

    let mut entries: Vec<(String, Option<String>, Vec<String>)> = Vec::new();
    let mut populations = Vec::new();
    for (bid, block) in &block_root.children {
        let mut names: Vec<String> = block
            .children
            .values()
            .map(|c| c.name.clone().unwrap_or_else(|| c.id.clone()))
            .collect();
        names.sort();
        populations.push(names.len() as u64);
        entries.push((bid.clone(), block.name.clone(), names));
    }

    let k = top_k(entries.len());
    let natural_min = populations.iter().copied().min().unwrap_or(0);
    let m = if fake_enabled {
        config.block_sizes.first().copied().unwrap_or(natural_min)
    } else {
        natural_min
    };

    if fake_enabled {
        for (bid, _, names) in &mut entries {
            if (names.len() as u64) < m {
                let need = m - names.len() as u64;
                let padding = pool.take(need as usize).map_err(|e| {
                    Error::fatal(format!("{e} while padding block {bid}"))
                })?;
                names.extend(padding);
            }
        }
    }

    let sizes = if validate_admin_sizes(&config.block_sizes, m, k) {
        config.block_sizes.clone()
    } else {
        if !config.block_sizes.is_empty() {
            metrics.validation_error();
            tracing::warn!(
                requested = ?config.block_sizes,
                "discarding invalid admin block sizes, using computed default"
            );
        }
        default_block_sizes(m, k)
    };

    let mut out = String::new();
    for (bid, human, names) in &entries {
        if let Some(human) = human {
            out.push_str(&format!("# {bid}={human}\n"));
        }
        let compacted = nodeset::compact(names).join(",");
        out.push_str(&format!("BlockName={bid} Nodes={compacted}\n"));
    }
    let sizes_csv = sizes.iter().map(u64::to_string).collect::<Vec<_>>().join(",");
    out.push_str(&format!("BlockSizes={sizes_csv}\n"));
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
struct TreeRecord {
    switch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    children: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nodes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
struct BlockRecord {
    block: String,
    nodes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct PartitionEntry {
    topology: String,
    cluster_default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tree: Option<Vec<TreeRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    block: Option<Vec<BlockRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    flat: Option<Vec<String>>,
}

/// DFS keep-if-any-descendant-needed pruning: returns the minimal subtree
/// of `vertex` that contains every id/name in `wanted`, or `None` if
/// nothing under `vertex` is wanted.
fn prune(vertex: &Vertex, wanted: &HashSet<&str>) -> Option<Vertex> {
    if vertex.is_leaf() {
        let matches = wanted.contains(vertex.id.as_str())
            || vertex
                .name
                .as_deref()
                .is_some_and(|name| wanted.contains(name));
        return matches.then(|| vertex.clone());
    }
    let mut pruned = Vertex::new(vertex.id.clone());
    pruned.name = vertex.name.clone();
    for child in vertex.children.values() {
        if let Some(kept) = prune(child, wanted) {
            pruned.add_child(kept);
        }
    }
    (!pruned.children.is_empty()).then_some(pruned)
}

fn tree_records(tree: &Vertex) -> Vec<TreeRecord> {
    let mut out = Vec::new();
    let mut queue: VecDeque<&Vertex> = tree.children.values().collect();
    while let Some(vertex) = queue.pop_front() {
        if vertex.is_leaf() {
            continue;
        }
        let leaf_parent = vertex.children.values().all(Vertex::is_leaf);
        if leaf_parent {
            let names = vertex
                .children
                .values()
                .map(|c| c.name.clone().unwrap_or_else(|| c.id.clone()))
                .collect();
            out.push(TreeRecord {
                switch: vertex.id.clone(),
                children: None,
                nodes: Some(names),
            });
        } else {
            let children = vertex.children.keys().cloned().collect();
            out.push(TreeRecord {
                switch: vertex.id.clone(),
                children: Some(children),
                nodes: None,
            });
            for child in vertex.children.values() {
                queue.push_back(child);
            }
        }
    }
    out
}

fn render_partitions(root: &Vertex, config: &RendererConfig) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    for (name, spec) in &config.topologies {
        let wanted: HashSet<&str> = spec.nodes.iter().map(String::as_str).collect();
        let entry = match spec.plugin {
            Plugin::Flat => PartitionEntry {
                topology: name.clone(),
                cluster_default: spec.cluster_default,
                tree: None,
                block: None,
                flat: Some(spec.nodes.clone()),
            },
            Plugin::Tree => {
                let tree_root = root
                    .tree()
                    .ok_or_else(|| Error::user(format!("partition {name} needs a tree sub-root")))?;
                let pruned = prune(tree_root, &wanted)
                    .ok_or_else(|| Error::user(format!("no matching nodes for partition {name}")))?;
                PartitionEntry {
                    topology: name.clone(),
                    cluster_default: spec.cluster_default,
                    tree: Some(tree_records(&pruned)),
                    block: None,
                    flat: None,
                }
            }
            Plugin::Block => {
                let block_root = root.block().ok_or_else(|| {
                    Error::user(format!("partition {name} needs a block sub-root"))
                })?;
                let pruned = prune(block_root, &wanted)
                    .ok_or_else(|| Error::user(format!("no matching nodes for partition {name}")))?;
                let records = pruned
                    .children
                    .iter()
                    .map(|(bid, block)| BlockRecord {
                        block: bid.clone(),
                        nodes: block
                            .children
                            .values()
                            .map(|c| c.name.clone().unwrap_or_else(|| c.id.clone()))
                            .collect(),
                    })
                    .collect();
                PartitionEntry {
                    topology: name.clone(),
                    cluster_default: spec.cluster_default,
                    tree: None,
                    block: Some(records),
                    flat: None,
                }
            }
        };
        out.push(entry);
    }
    out.sort_by(|a, b| a.topology.cmp(&b.topology));
    serde_yaml::to_vec(&out).map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Vertex;

    fn metrics() -> Metrics {
        Metrics::new("test")
    }

    fn sample_root() -> Vertex {
        let mut root = Vertex::root();
        let tree = root.tree_mut();
        let mut s1 = Vertex::new("S1");
        let mut s2 = Vertex::new("S2");
        for n in ["Node0201", "Node0202", "Node0205"] {
            s2.add_child(Vertex::leaf(n));
        }
        let mut s3 = Vertex::new("S3");
        for n in ["Node0304", "Node0305", "Node0306"] {
            s3.add_child(Vertex::leaf(n));
        }
        s1.add_child(s2);
        s1.add_child(s3);
        tree.add_child(s1);
        root
    }

    #[test]
    fn end_to_end_scenario_1_tree_text() {
        let root = sample_root();
        let config = RendererConfig {
            plugin: Some(Plugin::Tree),
            ..Default::default()
        };
        let text = String::from_utf8(render(&root, &config, &metrics()).unwrap()).unwrap();
        assert_eq!(
            text,
            "SwitchName=S1 Switches=S[2-3]\n\
             SwitchName=S2 Nodes=Node[0201-0202,0205]\n\
             SwitchName=S3 Nodes=Node[0304-0306]\n"
        );
    }

    #[test]
    fn validate_rejects_tree_plugin_without_tree_subroot() {
        let root = Vertex::root();
        let config = RendererConfig {
            plugin: Some(Plugin::Tree),
            ..Default::default()
        };
        assert!(validate(&root, &config).is_err());
    }

    #[test]
    fn block_size_rule_discards_invalid_admin_input() {
        // blocks of sizes {3,4,3,4}; admin [4] invalid (4 > min=3)
        let k = top_k(4);
        assert_eq!(k, 2);
        assert!(!validate_admin_sizes(&[4], 3, k));
        assert_eq!(default_block_sizes(3, k), vec![3, 6, 12]);
    }

    #[test]
    fn block_size_rule_accepts_valid_admin_input() {
        let k = top_k(4);
        assert!(validate_admin_sizes(&[3, 6, 12], 3, k));
    }

    #[test]
    fn fake_node_pool_exhausts_with_error() {
        let mut pool = FakeNodePool::new(Some("fake[1-10]"));
        assert_eq!(
            nodeset::compact(&pool.take(4).unwrap()),
            vec!["fake[1-4]".to_string()]
        );
        assert_eq!(
            nodeset::compact(&pool.take(2).unwrap()),
            vec!["fake[5-6]".to_string()]
        );
        assert_eq!(pool.take(1).unwrap(), vec!["fake7".to_string()]);
        assert!(pool.take(4).is_err());
    }

    #[test]
    fn label_longer_than_63_bytes_is_shortened_consistently() {
        let long = "a".repeat(70);
        let mut cache = ShortNameCache::new();
        let (short1, comment1) = cache.shorten(&long);
        let (short2, comment2) = cache.shorten(&long);
        assert_eq!(short1, short2);
        assert!(comment1.is_some());
        assert!(comment2.is_some());
        assert!(short1.starts_with('x'));
    }

    #[test]
    fn render_block_emits_block_sizes_line() {
        let mut root = Vertex::root();
        let block_root = root.block_mut();
        for (bid, nodes) in [("block001", vec!["n1", "n2", "n3"]), ("block002", vec!["n4", "n5", "n6", "n7"])] {
            let mut b = Vertex::new(bid);
            for n in nodes {
                b.add_child(Vertex::leaf(n));
            }
            block_root.add_child(b);
        }
        let config = RendererConfig {
            plugin: Some(Plugin::Block),
            block_sizes: vec![3, 6],
            ..Default::default()
        };
        let text = String::from_utf8(render(&root, &config, &metrics()).unwrap()).unwrap();
        assert!(text.contains("BlockSizes=3,6"));
        assert!(text.contains("BlockName=block001"));
    }

    #[test]
    fn render_partitions_prunes_to_requested_nodes() {
        let root = sample_root();
        let mut topologies = BTreeMap::new();
        topologies.insert(
            "partition-a".to_string(),
            PartitionSpec {
                plugin: Plugin::Tree,
                cluster_default: true,
                nodes: vec!["Node0201".to_string()],
            },
        );
        let config = RendererConfig {
            topologies,
            ..Default::default()
        };
        let bytes = render(&root, &config, &metrics()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("partition-a"));
        assert!(text.contains("Node0201"));
        assert!(!text.contains("Node0304"));
    }
}
