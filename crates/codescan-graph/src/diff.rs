use crate::graph::IrGraph;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Node-level difference between two graphs of the same project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IrGraphDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
    files: BTreeSet<String>,
}

impl IrGraphDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Files holding any added, removed or modified node; the set to re-analyze.
    pub fn changed_files(&self) -> Vec<&str> {
        self.files.iter().map(String::as_str).collect()
    }
}

/// Diffs node id sets and per-node content hashes. Output lists are sorted.
pub fn compare_ir_graphs(prev: &IrGraph, curr: &IrGraph) -> IrGraphDiff {
    let mut diff = IrGraphDiff::default();

    for (id, node) in &curr.nodes {
        match prev.nodes.get(id) {
            None => {
                diff.added.push(id.clone());
                diff.files.insert(node.file_path().to_string());
            }
            Some(old) if old.content_hash != node.content_hash => {
                diff.modified.push(id.clone());
                diff.files.insert(node.file_path().to_string());
            }
            Some(_) => {}
        }
    }
    for (id, node) in &prev.nodes {
        if !curr.nodes.contains_key(id) {
            diff.removed.push(id.clone());
            diff.files.insert(node.file_path().to_string());
        }
    }
    // synthesized external targets have no file
    diff.files.remove("");
    diff
}
