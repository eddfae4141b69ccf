pub mod analyzer;
pub mod call_graph;
pub mod complexity;
pub mod dependency;
pub mod structure;

pub use analyzer::{AnalysisInput, AnalyzerOutput, StaticAnalyzer};
pub use call_graph::{CallGraphAnalyzer, CallGraphReport};
pub use complexity::{complexity_severity, cyclomatic_complexity, ComplexityAnalyzer, ComplexityReport};
pub use dependency::{DependencyAnalyzer, DependencyReport};
pub use structure::{Layer, StructureAnalyzer, StructureReport};
