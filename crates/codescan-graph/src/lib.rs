pub mod builder;
pub mod diff;
pub mod edge;
pub mod graph;
pub mod node;
pub mod resolve;
pub mod traversal;

pub use builder::IrGraphBuilder;
pub use diff::{compare_ir_graphs, IrGraphDiff};
pub use edge::{IrEdge, IrEdgeType};
pub use graph::{GraphStats, IrGraph};
pub use node::{IrNode, IrNodeType};
pub use resolve::{normalize_path, resolve_import, strip_extension};
pub use traversal::{canonical_cycle, find_cycles};
