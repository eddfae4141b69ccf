use codescan_core::{AstFile, FileInfo, StaticFinding};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// What every analyzer sees: the collected files and their parse results.
/// Cheap to clone so analyzers can move a copy onto a worker thread.
#[derive(Debug, Clone, Default)]
pub struct AnalysisInput {
    pub files: Arc<Vec<FileInfo>>,
    pub ast_files: Arc<Vec<Arc<AstFile>>>,
}

impl AnalysisInput {
    pub fn new(files: Vec<FileInfo>, ast_files: Vec<Arc<AstFile>>) -> Self {
        Self {
            files: Arc::new(files),
            ast_files: Arc::new(ast_files),
        }
    }

    /// Parse results without a recorded parse error.
    pub fn parsed(&self) -> impl Iterator<Item = &Arc<AstFile>> {
        self.ast_files.iter().filter(|ast| !ast.has_error())
    }

    pub fn contents(&self) -> HashMap<&str, &str> {
        self.files
            .iter()
            .filter_map(|f| f.content.as_deref().map(|c| (f.path.as_str(), c)))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzerOutput<R> {
    pub report: R,
    pub findings: Vec<StaticFinding>,
}

/// A pure analysis pass over the whole input.
pub trait StaticAnalyzer: Send + Sync {
    type Report: Send + 'static;

    fn name(&self) -> &'static str;

    fn analyze(&self, input: &AnalysisInput) -> AnalyzerOutput<Self::Report>;
}
