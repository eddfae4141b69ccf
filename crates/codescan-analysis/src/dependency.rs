// ABOUTME: File-level dependency graph built from import statements, with cycle
// ABOUTME: detection and fan-in/fan-out coupling metrics.
use crate::analyzer::{AnalysisInput, AnalyzerOutput, StaticAnalyzer};
use codescan_core::{Location, PipelineConfig, Severity, StaticFinding, StaticFindingKind};
use codescan_graph::{canonical_cycle, find_cycles, normalize_path, resolve_import};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

pub const DEFAULT_MAX_OUTGOING: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    pub line: u32,
    pub is_dynamic: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DependencyReport {
    pub edges: Vec<DependencyEdge>,
    /// Importing files per file.
    pub fan_in: BTreeMap<String, usize>,
    /// Distinct dependencies per file, internal and external.
    pub fan_out: BTreeMap<String, usize>,
    /// Package name to the number of files importing it.
    pub external_packages: BTreeMap<String, usize>,
    /// Relative imports that match no analyzed file.
    pub unresolved: Vec<(String, String)>,
    pub cycles: Vec<Vec<String>>,
}

impl DependencyReport {
    pub fn dependencies_of(&self, file: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.from == file)
            .map(|e| e.to.as_str())
            .collect()
    }
}

/// `@scope/pkg/sub` → `@scope/pkg`, `lodash/fp` → `lodash`, `os.path` stays as written.
pub fn package_name(specifier: &str) -> &str {
    let mut parts = specifier.splitn(3, '/');
    let first = parts.next().unwrap_or(specifier);
    if first.starts_with('@') {
        match parts.next() {
            Some(second) => &specifier[..first.len() + 1 + second.len()],
            None => first,
        }
    } else {
        first
    }
}

#[derive(Debug, Clone)]
pub struct DependencyAnalyzer {
    max_outgoing: usize,
}

impl Default for DependencyAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OUTGOING)
    }
}

impl DependencyAnalyzer {
    pub fn new(max_outgoing: usize) -> Self {
        Self { max_outgoing }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.max_outgoing_dependencies)
    }
}

impl StaticAnalyzer for DependencyAnalyzer {
    type Report = DependencyReport;

    fn name(&self) -> &'static str {
        "dependency"
    }

    fn analyze(&self, input: &AnalysisInput) -> AnalyzerOutput<DependencyReport> {
        let known: HashSet<String> = input
            .files
            .iter()
            .map(|f| normalize_path(&f.path))
            .collect();
        let mut report = DependencyReport::default();
        let mut findings = Vec::new();
        let mut adjacency: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut importers: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut package_users: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut import_lines: BTreeMap<String, u32> = BTreeMap::new();

        for ast in input.parsed() {
            let from = normalize_path(&ast.file_path);
            let targets = adjacency.entry(from.clone()).or_default();
            let mut external = BTreeSet::new();

            for import in &ast.imports {
                match resolve_import(&from, &import.source, &known) {
                    Some(to) if to != from => {
                        if !targets.contains(&to) {
                            targets.push(to.clone());
                            import_lines.insert(format!("{}->{}", from, to), import.line);
                            importers.entry(to.clone()).or_default().insert(from.clone());
                            report.edges.push(DependencyEdge {
                                from: from.clone(),
                                to,
                                line: import.line,
                                is_dynamic: import.is_dynamic,
                            });
                        }
                    }
                    Some(_) => {}
                    None if import.is_relative => {
                        report.unresolved.push((from.clone(), import.source.clone()));
                    }
                    None => {
                        let package = package_name(&import.source).to_string();
                        package_users.entry(package.clone()).or_default().insert(from.clone());
                        external.insert(package);
                    }
                }
            }

            targets.sort();
            let fan_out = targets.len() + external.len();
            report.fan_out.insert(from.clone(), fan_out);

            if fan_out > self.max_outgoing {
                findings.push(
                    StaticFinding::new(
                        StaticFindingKind::HighCoupling,
                        format!(
                            "File '{}' depends on {} modules (limit {})",
                            from, fan_out, self.max_outgoing
                        ),
                        Severity::Medium,
                        Location::file(&from),
                    )
                    .with_metadata("outgoing", fan_out)
                    .with_metadata("limit", self.max_outgoing),
                );
            }
        }

        for file in adjacency.keys() {
            let count = importers.get(file).map(BTreeSet::len).unwrap_or(0);
            report.fan_in.insert(file.clone(), count);
        }
        report.external_packages = package_users
            .into_iter()
            .map(|(name, users)| (name, users.len()))
            .collect();

        let mut seen = BTreeSet::new();
        for cycle in find_cycles(&adjacency) {
            let canonical = canonical_cycle(&cycle);
            if !seen.insert(canonical.clone()) {
                continue;
            }
            let first = canonical[0].clone();
            let next = canonical.get(1).unwrap_or(&first);
            let line = import_lines
                .get(&format!("{}->{}", first, next))
                .copied()
                .unwrap_or(1);
            let mut chain = canonical.clone();
            chain.push(first.clone());
            findings.push(
                StaticFinding::new(
                    StaticFindingKind::CircularDependency,
                    format!("Circular dependency: {}", chain.join(" -> ")),
                    Severity::High,
                    Location::line(&first, line),
                )
                .with_metadata("cycle", canonical.clone())
                .with_metadata("length", canonical.len()),
            );
            report.cycles.push(canonical);
        }

        debug!(
            edges = report.edges.len(),
            cycles = report.cycles.len(),
            externals = report.external_packages.len(),
            "dependency analysis finished"
        );
        AnalyzerOutput { report, findings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_names() {
        assert_eq!(package_name("@angular/core/testing"), "@angular/core");
        assert_eq!(package_name("@types"), "@types");
        assert_eq!(package_name("lodash/fp"), "lodash");
        assert_eq!(package_name("react"), "react");
        assert_eq!(package_name("os.path"), "os.path");
    }
}
