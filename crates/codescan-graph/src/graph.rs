use crate::edge::{IrEdge, IrEdgeType};
use crate::node::{IrNode, IrNodeType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub nodes_by_type: BTreeMap<String, usize>,
    pub edges_by_type: BTreeMap<String, usize>,
    pub cycle_count: usize,
    pub entry_point_count: usize,
}

/// Project-wide structural graph. Immutable once built by
/// [`IrGraphBuilder::build`](crate::IrGraphBuilder::build).
#[derive(Debug, Clone, Default)]
pub struct IrGraph {
    pub(crate) nodes: BTreeMap<String, IrNode>,
    pub(crate) edges: Vec<IrEdge>,
    pub(crate) by_file: HashMap<String, Vec<String>>,
    pub(crate) by_type: HashMap<IrNodeType, Vec<String>>,
    pub(crate) outgoing: HashMap<String, Vec<usize>>,
    pub(crate) incoming: HashMap<String, Vec<usize>>,
    pub(crate) cycles: Vec<Vec<String>>,
    pub(crate) entry_points: Vec<String>,
}

impl IrGraph {
    pub fn node(&self, id: &str) -> Option<&IrNode> {
        self.nodes.get(id)
    }

    /// Nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &IrNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[IrEdge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes_of_type(&self, node_type: IrNodeType) -> Vec<&IrNode> {
        self.lookup(self.by_type.get(&node_type))
    }

    pub fn nodes_in_file(&self, file_path: &str) -> Vec<&IrNode> {
        self.lookup(self.by_file.get(file_path))
    }

    fn lookup(&self, ids: Option<&Vec<String>>) -> Vec<&IrNode> {
        ids.map(|ids| ids.iter().filter_map(|id| self.nodes.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn outgoing(&self, id: &str) -> Vec<&IrEdge> {
        self.edge_refs(self.outgoing.get(id))
    }

    pub fn incoming(&self, id: &str) -> Vec<&IrEdge> {
        self.edge_refs(self.incoming.get(id))
    }

    pub fn outgoing_of_type(&self, id: &str, edge_type: IrEdgeType) -> Vec<&IrEdge> {
        self.outgoing(id)
            .into_iter()
            .filter(|e| e.edge_type == edge_type)
            .collect()
    }

    fn edge_refs(&self, idx: Option<&Vec<usize>>) -> Vec<&IrEdge> {
        idx.map(|idx| idx.iter().filter_map(|i| self.edges.get(*i)).collect())
            .unwrap_or_default()
    }

    /// Import cycles, one per back edge found by the depth-first search.
    pub fn cycles(&self) -> &[Vec<String>] {
        &self.cycles
    }

    /// Exported modules nothing else points at.
    pub fn entry_points(&self) -> &[String] {
        &self.entry_points
    }

    pub fn files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = self.by_file.keys().map(String::as_str).collect();
        files.sort_unstable();
        files
    }

    pub fn stats(&self) -> GraphStats {
        let mut nodes_by_type = BTreeMap::new();
        for node in self.nodes.values() {
            *nodes_by_type
                .entry(node.node_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        let mut edges_by_type = BTreeMap::new();
        for edge in &self.edges {
            *edges_by_type
                .entry(edge.edge_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        GraphStats {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            nodes_by_type,
            edges_by_type,
            cycle_count: self.cycles.len(),
            entry_point_count: self.entry_points.len(),
        }
    }
}
