// ABOUTME: Function-level call graph: declarations, call sites with their enclosing
// ABOUTME: function, entry points, dead code and overly deep call chains.
use crate::analyzer::{AnalysisInput, AnalyzerOutput, StaticAnalyzer};
use codescan_core::{
    keys, AstFile, AstNode, AstNodeType, Location, MetadataValue, PipelineConfig, Severity,
    StaticFinding, StaticFindingKind,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

pub const DEFAULT_MAX_CALL_DEPTH: usize = 5;
pub const MODULE_CALLER: &str = "<module>";

const ROOT_NAMES: &[&str] = &["main", "__init__", "constructor", "init", "__main__"];
const TEST_FILE_MARKERS: &[&str] = &[".test.", ".spec.", "_test.", "/test_", "/tests/", "__tests__/"];
const SEARCH_BUDGET: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionInfo {
    pub id: String,
    pub name: String,
    pub file_path: String,
    pub class_name: Option<String>,
    pub line: u32,
    pub is_exported: bool,
    pub is_entry_point: bool,
    #[serde(skip)]
    location: Location,
    #[serde(skip)]
    framework_hook: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallSite {
    pub file_path: String,
    /// Enclosing function name, or `<module>`.
    pub caller: String,
    pub callee: String,
    pub line: u32,
    pub resolved: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallGraphReport {
    pub functions: Vec<FunctionInfo>,
    pub calls: Vec<CallSite>,
    /// Caller id to callee ids.
    pub edges: BTreeMap<String, Vec<String>>,
    pub entry_points: Vec<String>,
    pub dead_functions: Vec<String>,
    pub deep_chains: Vec<Vec<String>>,
}

impl CallGraphReport {
    pub fn function(&self, id: &str) -> Option<&FunctionInfo> {
        self.functions.iter().find(|f| f.id == id)
    }

    pub fn callees_of(&self, id: &str) -> &[String] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn is_test_file(path: &str) -> bool {
    let lower = format!("/{}", path.to_ascii_lowercase());
    TEST_FILE_MARKERS.iter().any(|m| lower.contains(m))
}

fn is_test_function(name: &str) -> bool {
    name.starts_with("test_")
        || name
            .strip_prefix("test")
            .and_then(|rest| rest.chars().next())
            .map(|c| c.is_ascii_uppercase())
            .unwrap_or(false)
        || name
            .strip_prefix("Test")
            .and_then(|rest| rest.chars().next())
            .map(|c| c.is_ascii_uppercase())
            .unwrap_or(false)
}

fn has_decorators(node: &AstNode) -> bool {
    matches!(node.meta(keys::DECORATORS), Some(MetadataValue::List(items)) if !items.is_empty())
}

/// Per-file walk that keeps the enclosing class and function.
struct Collector<'a> {
    file: &'a AstFile,
    functions: &'a mut Vec<FunctionInfo>,
    ids: &'a mut HashMap<String, usize>,
    /// (caller index or None for module scope, callee, line)
    calls: Vec<(Option<usize>, String, u32)>,
}

impl<'a> Collector<'a> {
    fn visit(&mut self, node: &AstNode, class: Option<(&str, bool)>, function: Option<usize>) {
        for child in &node.children {
            match child.node_type {
                AstNodeType::Class | AstNodeType::Interface | AstNodeType::Enum => {
                    let name = child.name.as_deref().unwrap_or("<anonymous>");
                    self.visit(child, Some((name, child.is_exported())), function);
                }
                AstNodeType::Function => {
                    let index = self.add_function(child, class);
                    // nested functions belong to no class
                    self.visit(child, None, Some(index));
                }
                AstNodeType::Call => {
                    if let Some(callee) = child.callee().or(child.name.as_deref()) {
                        self.calls
                            .push((function, callee.to_string(), child.location.start_line));
                    }
                    self.visit(child, class, function);
                }
                _ => self.visit(child, class, function),
            }
        }
    }

    fn add_function(&mut self, node: &AstNode, class: Option<(&str, bool)>) -> usize {
        let name = node.name.clone().unwrap_or_else(|| "<anonymous>".to_string());
        let class_name = class
            .map(|(c, _)| c.to_string())
            .or_else(|| node.class_name().map(str::to_string));
        let qualified = match &class_name {
            Some(c) => format!("{}.{}", c, name),
            None => name.clone(),
        };
        let base = format!("{}::{}", self.file.file_path, qualified);
        let seen = self.ids.entry(base.clone()).or_insert(0);
        *seen += 1;
        let id = if *seen == 1 {
            base
        } else {
            format!("{}#{}", base, *seen - 1)
        };

        let private = matches!(node.visibility(), Some("private"))
            || (name.starts_with('_') && !name.starts_with("__"));
        let public_member = matches!(class, Some((_, true))) && !private;
        let is_exported = node.is_exported();
        let is_entry_point = is_exported
            || public_member
            || ROOT_NAMES.contains(&name.as_str())
            || is_test_function(&name)
            || is_test_file(&self.file.file_path);
        let framework_hook = has_decorators(node)
            || (name.starts_with("__") && name.ends_with("__"))
            || name == "<anonymous>";

        self.functions.push(FunctionInfo {
            id,
            name,
            file_path: self.file.file_path.clone(),
            class_name,
            line: node.location.start_line,
            is_exported,
            is_entry_point,
            location: node.location.clone(),
            framework_hook,
        });
        self.functions.len() - 1
    }
}

#[derive(Debug, Clone)]
pub struct CallGraphAnalyzer {
    max_call_depth: usize,
    search_budget: usize,
}

impl Default for CallGraphAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CALL_DEPTH)
    }
}

impl CallGraphAnalyzer {
    pub fn new(max_call_depth: usize) -> Self {
        Self {
            max_call_depth,
            search_budget: SEARCH_BUDGET,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.max_call_depth)
    }

    #[cfg(test)]
    fn with_search_budget(mut self, search_budget: usize) -> Self {
        self.search_budget = search_budget;
        self
    }

    /// First simple path from `start` with more than `max_call_depth` calls.
    /// Gives up with `None` once `search_budget` steps are spent.
    fn deep_chain(&self, start: usize, adjacency: &[Vec<usize>]) -> Option<Vec<usize>> {
        let mut path = vec![start];
        let mut on_path: HashSet<usize> = HashSet::from([start]);
        let mut frames: Vec<usize> = vec![0];
        let mut budget = self.search_budget;

        while let Some(cursor) = frames.last_mut() {
            if path.len() > self.max_call_depth + 1 {
                return Some(path);
            }
            if budget == 0 {
                warn!(
                    start,
                    budget = self.search_budget,
                    depth = path.len() - 1,
                    "call chain search budget exhausted, chain left unreported"
                );
                return None;
            }
            budget -= 1;
            let node = path[path.len() - 1];
            match adjacency[node].get(*cursor) {
                Some(&next) => {
                    *cursor += 1;
                    if on_path.insert(next) {
                        path.push(next);
                        frames.push(0);
                    }
                }
                None => {
                    frames.pop();
                    if let Some(done) = path.pop() {
                        on_path.remove(&done);
                    }
                }
            }
        }
        None
    }
}

impl StaticAnalyzer for CallGraphAnalyzer {
    type Report = CallGraphReport;

    fn name(&self) -> &'static str {
        "call-graph"
    }

    fn analyze(&self, input: &AnalysisInput) -> AnalyzerOutput<CallGraphReport> {
        let mut functions = Vec::new();
        let mut ids = HashMap::new();
        let mut raw_calls = Vec::new();

        for ast in input.parsed() {
            let mut collector = Collector {
                file: ast,
                functions: &mut functions,
                ids: &mut ids,
                calls: Vec::new(),
            };
            collector.visit(&ast.root, None, None);
            let calls = collector.calls;
            raw_calls.push((ast.file_path.clone(), calls));
        }

        let mut by_name: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, f) in functions.iter().enumerate() {
            by_name.entry(f.name.as_str()).or_default().push(idx);
        }

        // same-file definitions win; otherwise every definition with the name
        let resolve = |file: &str, callee: &str| -> Vec<usize> {
            let candidates = by_name.get(callee).cloned().unwrap_or_default();
            let local: Vec<usize> = candidates
                .iter()
                .copied()
                .filter(|i| functions[*i].file_path == file)
                .collect();
            if local.is_empty() {
                candidates
            } else {
                local
            }
        };

        let mut adjacency: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); functions.len()];
        let mut referenced = vec![false; functions.len()];
        let mut module_roots = BTreeSet::new();
        let mut calls = Vec::new();

        for (file, file_calls) in &raw_calls {
            for (caller, callee, line) in file_calls {
                let targets = resolve(file, callee);
                for &target in &targets {
                    match caller {
                        Some(from) if *from == target => {}
                        Some(from) => {
                            adjacency[*from].insert(target);
                            referenced[target] = true;
                        }
                        None => {
                            module_roots.insert(target);
                            referenced[target] = true;
                        }
                    }
                }
                calls.push(CallSite {
                    file_path: file.clone(),
                    caller: caller
                        .map(|i| functions[i].name.clone())
                        .unwrap_or_else(|| MODULE_CALLER.to_string()),
                    callee: callee.clone(),
                    line: *line,
                    resolved: !targets.is_empty(),
                });
            }
        }

        let adjacency: Vec<Vec<usize>> = adjacency
            .into_iter()
            .map(|targets| targets.into_iter().collect())
            .collect();

        let mut report = CallGraphReport::default();
        let mut findings = Vec::new();

        for (idx, f) in functions.iter().enumerate() {
            if f.is_entry_point {
                report.entry_points.push(f.id.clone());
            }
            if !adjacency[idx].is_empty() {
                report.edges.insert(
                    f.id.clone(),
                    adjacency[idx].iter().map(|t| functions[*t].id.clone()).collect(),
                );
            }
            if !referenced[idx] && !f.is_entry_point && !f.framework_hook {
                findings.push(
                    StaticFinding::new(
                        StaticFindingKind::DeadCode,
                        format!("Function '{}' is never called", f.name),
                        Severity::Low,
                        f.location.clone(),
                    )
                    .with_metadata("function", f.id.clone()),
                );
                report.dead_functions.push(f.id.clone());
            }
        }

        let roots: BTreeSet<usize> = functions
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_entry_point)
            .map(|(idx, _)| idx)
            .chain(module_roots)
            .collect();
        for root in roots {
            let Some(chain) = self.deep_chain(root, &adjacency) else {
                continue;
            };
            let names: Vec<String> = chain.iter().map(|i| functions[*i].id.clone()).collect();
            let display: Vec<&str> = chain.iter().map(|i| functions[*i].name.as_str()).collect();
            findings.push(
                StaticFinding::new(
                    StaticFindingKind::DeepCallChain,
                    format!(
                        "Call chain deeper than {} starting at '{}': {}",
                        self.max_call_depth,
                        functions[root].name,
                        display.join(" -> ")
                    ),
                    Severity::Medium,
                    functions[root].location.clone(),
                )
                .with_metadata("chain", names.clone())
                .with_metadata("depth", chain.len() - 1),
            );
            report.deep_chains.push(names);
        }

        debug!(
            functions = functions.len(),
            calls = calls.len(),
            dead = report.dead_functions.len(),
            "call graph analysis finished"
        );
        report.functions = functions;
        report.calls = calls;
        AnalyzerOutput { report, findings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_names() {
        assert!(is_test_function("test_login"));
        assert!(is_test_function("testLogin"));
        assert!(is_test_function("TestServer"));
        assert!(!is_test_function("testament"));
        assert!(!is_test_function("latest"));
    }

    #[test]
    fn test_file_paths() {
        assert!(is_test_file("src/user.test.ts"));
        assert!(is_test_file("tests/test_api.py"));
        assert!(is_test_file("pkg/server_test.go"));
        assert!(!is_test_file("src/contest.ts"));
    }

    #[test]
    fn chain_search_stops_at_limit() {
        let analyzer = CallGraphAnalyzer::new(2);
        // 0 -> 1 -> 2 -> 3
        let adjacency = vec![vec![1], vec![2], vec![3], vec![]];
        assert_eq!(analyzer.deep_chain(0, &adjacency), Some(vec![0, 1, 2, 3]));
        assert_eq!(analyzer.deep_chain(1, &adjacency), None);

        // a cycle never counts twice
        let cyclic = vec![vec![1], vec![0]];
        assert_eq!(analyzer.deep_chain(0, &cyclic), None);
    }

    #[test]
    fn chain_search_gives_up_when_budget_is_spent() {
        // 0 -> 1 -> 2 -> 3 -> 4 -> 5
        let adjacency = vec![vec![1], vec![2], vec![3], vec![4], vec![5], vec![]];
        let analyzer = CallGraphAnalyzer::new(4);
        assert_eq!(analyzer.deep_chain(0, &adjacency), Some(vec![0, 1, 2, 3, 4, 5]));

        let starved = CallGraphAnalyzer::new(4).with_search_budget(3);
        assert_eq!(starved.deep_chain(0, &adjacency), None);
    }
}
