//! Tagged vertex tree (spec §3, §4.C): the in-memory topology graph that
//! providers build and the renderer consumes.

use crate::error::Error;
use std::collections::BTreeMap;

pub const TREE_ROOT: &str = "tree";
pub const BLOCK_ROOT: &str = "block";
pub const NO_TOPOLOGY: &str = "no-topology";

const MAX_MERGE_DEPTH: usize = 64;

/// A labelled node of the topology graph. Leaves (empty `children`)
/// represent compute nodes; inner vertices represent switches or
/// accelerator domains.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vertex {
    pub id: String,
    pub name: Option<String>,
    pub children: BTreeMap<String, Vertex>,
    pub metadata: BTreeMap<String, String>,
}

impl Vertex {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            children: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn leaf(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(id.clone()).with_name(id)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn add_child(&mut self, child: Vertex) {
        self.children.insert(child.id.clone(), child);
    }

    /// Builds an empty root vertex (the wrapper with at most `tree` and
    /// `block` named children).
    pub fn root() -> Self {
        Self::new("")
    }

    pub fn tree_mut(&mut self) -> &mut Vertex {
        self.children
            .entry(TREE_ROOT.to_string())
            .or_insert_with(|| Vertex::new(TREE_ROOT))
    }

    pub fn block_mut(&mut self) -> &mut Vertex {
        self.children
            .entry(BLOCK_ROOT.to_string())
            .or_insert_with(|| Vertex::new(BLOCK_ROOT))
    }

    pub fn tree(&self) -> Option<&Vertex> {
        self.children.get(TREE_ROOT)
    }

    pub fn block(&self) -> Option<&Vertex> {
        self.children.get(BLOCK_ROOT)
    }

    /// Unions `other`'s children into `self`. On id collision, recurses
    /// into the colliding pair. Guards against cycles with a depth limit.
    pub fn merge(&mut self, other: Vertex) -> Result<(), Error> {
        self.merge_at_depth(other, 0)
    }

    fn merge_at_depth(&mut self, other: Vertex, depth: usize) -> Result<(), Error> {
        if depth > MAX_MERGE_DEPTH {
            return Err(Error::fatal(format!(
                "cycle detected while merging vertex {}",
                self.id
            )));
        }
        if self.name.is_none() {
            self.name = other.name;
        }
        for (k, v) in other.metadata {
            self.metadata.entry(k).or_insert(v);
        }
        for (child_id, child) in other.children {
            match self.children.remove(&child_id) {
                Some(mut existing) => {
                    existing.merge_at_depth(child, depth + 1)?;
                    self.children.insert(child_id, existing);
                }
                None => {
                    self.children.insert(child_id, child);
                }
            }
        }
        Ok(())
    }

    /// Walks the subtree, collecting every vertex id. Used to check the
    /// "unique id within a single root tree" invariant.
    pub fn collect_ids<'a>(&'a self, out: &mut Vec<&'a str>) {
        out.push(self.id.as_str());
        for child in self.children.values() {
            child.collect_ids(out);
        }
    }

    /// Validates the §3 invariants for a `tree` sub-root: every non-leaf
    /// has >=1 child, every leaf has a non-empty name.
    pub fn validate_tree_subroot(&self) -> Result<(), Error> {
        if !self.is_leaf() && self.children.is_empty() {
            return Err(Error::fatal(format!("switch {} has no children", self.id)));
        }
        if self.is_leaf() {
            if self.name.as_deref().unwrap_or("").is_empty() {
                return Err(Error::fatal(format!("leaf node {} has no name", self.id)));
            }
            return Ok(());
        }
        for child in self.children.values() {
            child.validate_tree_subroot()?;
        }
        Ok(())
    }

    /// Validates the §3 invariant for a `block` sub-root: each first-level
    /// child is exactly one accelerator domain, and every leaf belongs to
    /// exactly one block (true by construction of an owned tree, checked
    /// here for ids that repeat across blocks).
    pub fn validate_block_subroot(&self) -> Result<(), Error> {
        let mut seen_leaves = std::collections::HashSet::new();
        for block in self.children.values() {
            for leaf_id in block.children.keys() {
                if !seen_leaves.insert(leaf_id.clone()) {
                    return Err(Error::fatal(format!(
                        "node {leaf_id} belongs to more than one block"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Checks global id uniqueness within this tree.
    pub fn validate_unique_ids(&self) -> Result<(), Error> {
        let mut ids = Vec::new();
        self.collect_ids(&mut ids);
        let mut seen = std::collections::HashSet::new();
        for id in ids {
            if !id.is_empty() && !seen.insert(id) {
                return Err(Error::fatal(format!("duplicate vertex id {id}")));
            }
        }
        Ok(())
    }
}

/// One raw per-instance topology record as returned by a provider: the
/// instance id, its [top, middle, leaf] switch ids, and the scheduler
/// host name it maps to.
#[derive(Debug, Clone)]
pub struct InstanceRecord {
    pub instance_id: String,
    pub switches: [String; 3],
    pub node_name: String,
}

/// Folds per-instance records into a three-level `tree` sub-root:
/// top switch -> middle switch -> leaf switch -> compute node. Instances
/// in `missing` (present in the request but absent from provider results)
/// are placed under a distinguished `no-topology` child when
/// `include_missing` is set.
pub fn to_three_tier(
    _provider_name: &str,
    instances: &[InstanceRecord],
    missing: &[(String, String)],
    include_missing: bool,
) -> Result<Vertex, Error> {
    let mut root = Vertex::root();
    let tree = root.tree_mut();
    let mut placed: BTreeMap<String, String> = BTreeMap::new(); // instance_id -> top switch id

    for record in instances {
        if let Some(existing_top) = placed.get(&record.instance_id) {
            if existing_top != &record.switches[0] {
                return Err(Error::fatal(format!(
                    "instance {} reported under two different top-tier parents",
                    record.instance_id
                )));
            }
        } else {
            placed.insert(record.instance_id.clone(), record.switches[0].clone());
        }

        let top = tree
            .children
            .entry(record.switches[0].clone())
            .or_insert_with(|| Vertex::new(record.switches[0].clone()));
        let mid = top
            .children
            .entry(record.switches[1].clone())
            .or_insert_with(|| Vertex::new(record.switches[1].clone()));
        let leaf_switch = mid
            .children
            .entry(record.switches[2].clone())
            .or_insert_with(|| Vertex::new(record.switches[2].clone()));
        leaf_switch.add_child(Vertex::leaf(record.node_name.clone()));
    }

    if include_missing && !missing.is_empty() {
        let bucket = tree
            .children
            .entry(NO_TOPOLOGY.to_string())
            .or_insert_with(|| Vertex::new(NO_TOPOLOGY));
        for (_instance_id, node_name) in missing {
            bucket.add_child(Vertex::leaf(node_name.clone()));
        }
    }

    Ok(root)
}

/// Collapses functionally-equivalent top-tier vertices (spec §4.C): a
/// fat-tree fabric typically reports N renamed-but-identical top
/// switches. `Merge()` reduces them to one representative per
/// equivalence class, where two vertices are equivalent iff their
/// child-id sets are equal after recursively normalizing cycles away.
pub struct Merger {
    top: Vec<Vertex>,
}

impl Merger {
    pub fn new(top: Vec<Vertex>) -> Self {
        Self { top }
    }

    pub fn merge(&mut self) -> Result<(), Error> {
        for vertex in &self.top {
            detect_cycle(vertex, &mut Vec::new())?;
        }

        let mut groups: Vec<Vertex> = Vec::new();
        'outer: for vertex in self.top.drain(..) {
            let signature = structural_signature(&vertex);
            for group in &mut groups {
                if structural_signature(group) == signature {
                    group.merge(vertex)?;
                    continue 'outer;
                }
            }
            groups.push(vertex);
        }
        self.top = groups;
        Ok(())
    }

    pub fn top_tier(&self) -> &[Vertex] {
        &self.top
    }
}

/// Structural shape of a subtree, ignoring the vertex's own id: leaves
/// are all equivalent, and an inner vertex's signature is its sorted
/// children's signatures. Recursing on the children's own signatures
/// (rather than stopping at their ids) lets two subtrees merge when
/// they differ only in descendant naming, and keeps them apart when a
/// shared top-level id set hides a deeper structural difference.
fn structural_signature(vertex: &Vertex) -> String {
    if vertex.is_leaf() {
        return "L".to_string();
    }
    let mut child_signatures: Vec<String> = vertex.children.values().map(structural_signature).collect();
    child_signatures.sort();
    format!("({})", child_signatures.join(","))
}

fn detect_cycle<'a>(vertex: &'a Vertex, stack: &mut Vec<&'a str>) -> Result<(), Error> {
    if stack.contains(&vertex.id.as_str()) {
        return Err(Error::fatal(format!(
            "cycle detected at vertex {}",
            vertex.id
        )));
    }
    if stack.len() > MAX_MERGE_DEPTH {
        return Err(Error::fatal("graph exceeds maximum nesting depth"));
    }
    stack.push(vertex.id.as_str());
    for child in vertex.children.values() {
        detect_cycle(child, stack)?;
    }
    stack.pop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, top: &str, mid: &str, leaf: &str, node: &str) -> InstanceRecord {
        InstanceRecord {
            instance_id: id.to_string(),
            switches: [top.to_string(), mid.to_string(), leaf.to_string()],
            node_name: node.to_string(),
        }
    }

    #[test]
    fn three_tier_builds_hierarchy() {
        let records = vec![
            record("i-1", "sw1", "sw2", "sw3", "node1"),
            record("i-2", "sw1", "sw2", "sw3", "node2"),
        ];
        let root = to_three_tier("test", &records, &[], false).unwrap();
        let tree = root.tree().unwrap();
        let top = tree.children.get("sw1").unwrap();
        let mid = top.children.get("sw2").unwrap();
        let leaf_switch = mid.children.get("sw3").unwrap();
        assert_eq!(leaf_switch.children.len(), 2);
    }

    #[test]
    fn three_tier_missing_instances_go_to_no_topology() {
        let records = vec![record("i-1", "sw1", "sw2", "sw3", "node1")];
        let missing = vec![("i-cpu".to_string(), "n-CPU".to_string())];
        let root = to_three_tier("test", &records, &missing, true).unwrap();
        let tree = root.tree().unwrap();
        let bucket = tree.children.get(NO_TOPOLOGY).unwrap();
        assert_eq!(bucket.children.len(), 1);
        assert!(bucket.children.contains_key("n-CPU"));
    }

    #[test]
    fn three_tier_conflicting_parent_is_fatal() {
        let records = vec![
            record("i-1", "sw1", "sw2", "sw3", "node1"),
            record("i-1", "sw9", "sw2", "sw3", "node1"),
        ];
        let err = to_three_tier("test", &records, &[], false).unwrap_err();
        assert!(matches!(err, Error::Fatal(_)));
    }

    #[test]
    fn merge_unions_children() {
        let mut a = Vertex::new("sw1");
        a.add_child(Vertex::leaf("n1"));
        let mut b = Vertex::new("sw1");
        b.add_child(Vertex::leaf("n2"));
        a.merge(b).unwrap();
        assert_eq!(a.children.len(), 2);
    }

    #[test]
    fn merger_collapses_structurally_identical_top_switches() {
        let mut sw_a = Vertex::new("sw-a");
        sw_a.add_child(Vertex::leaf("n1"));
        let mut sw_b = Vertex::new("sw-b");
        sw_b.add_child(Vertex::leaf("n1")); // same child id set as sw_a

        let mut merger = Merger::new(vec![sw_a, sw_b]);
        merger.merge().unwrap();
        assert_eq!(merger.top_tier().len(), 1);
    }

    #[test]
    fn merger_merges_identical_shapes_with_renamed_descendant_ids() {
        // Same subtree shape (one mid switch fanning to two leaves), but
        // every descendant id differs between the two tops.
        let mut sw_a = Vertex::new("sw-a");
        let mut mid_a = Vertex::new("mid-a");
        mid_a.add_child(Vertex::leaf("n1"));
        mid_a.add_child(Vertex::leaf("n2"));
        sw_a.add_child(mid_a);

        let mut sw_b = Vertex::new("sw-b");
        let mut mid_b = Vertex::new("mid-b");
        mid_b.add_child(Vertex::leaf("n3"));
        mid_b.add_child(Vertex::leaf("n4"));
        sw_b.add_child(mid_b);

        let mut merger = Merger::new(vec![sw_a, sw_b]);
        merger.merge().unwrap();
        assert_eq!(merger.top_tier().len(), 1);
    }

    #[test]
    fn merger_keeps_structurally_distinct_top_switches_separate() {
        let mut sw_a = Vertex::new("sw-a");
        sw_a.add_child(Vertex::leaf("n1"));
        let mut sw_b = Vertex::new("sw-b");
        sw_b.add_child(Vertex::leaf("n1"));
        sw_b.add_child(Vertex::leaf("n2"));

        let mut merger = Merger::new(vec![sw_a, sw_b]);
        merger.merge().unwrap();
        assert_eq!(merger.top_tier().len(), 2);
    }

    #[test]
    fn merger_keeps_tops_separate_when_only_grandchildren_differ() {
        // Both tops have one immediate child named "mid", so a
        // single-level child-id comparison would see them as equal. One
        // mid is a leaf; the other mid has its own leaf child, so the
        // subtrees differ two levels down.
        let mut sw_a = Vertex::new("sw-a");
        sw_a.add_child(Vertex::leaf("mid"));

        let mut sw_b = Vertex::new("sw-b");
        let mut mid_b = Vertex::new("mid");
        mid_b.add_child(Vertex::leaf("n1"));
        sw_b.add_child(mid_b);

        let mut merger = Merger::new(vec![sw_a, sw_b]);
        merger.merge().unwrap();
        assert_eq!(merger.top_tier().len(), 2);
    }

    #[test]
    fn validate_tree_subroot_rejects_unnamed_leaf() {
        let mut tree = Vertex::new(TREE_ROOT);
        tree.add_child(Vertex::new("unnamed-leaf"));
        assert!(tree.validate_tree_subroot().is_err());
    }

    #[test]
    fn validate_unique_ids_detects_duplicates() {
        let mut root = Vertex::root();
        let tree = root.tree_mut();
        let mut sw1 = Vertex::new("dup");
        sw1.add_child(Vertex::leaf("n1"));
        tree.add_child(sw1);
        let mut sw2 = Vertex::new("dup");
        sw2.add_child(Vertex::leaf("n2"));
        // Force a duplicate id at a different path (simulating a buggy merge).
        root.children.insert("other".to_string(), sw2);
        assert!(root.validate_unique_ids().is_err());
    }
}
