use crate::edge::{IrEdge, IrEdgeType};
use crate::graph::IrGraph;
use crate::node::{IrNode, IrNodeType};
use crate::resolve::{normalize_path, resolve_import, strip_extension};
use crate::traversal::find_cycles;
use codescan_core::{AstFile, AstNode, AstNodeType, ImportInfo, Language};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

struct PendingImport {
    module_id: String,
    file_path: String,
    import: ImportInfo,
}

struct PendingHeritage {
    from: String,
    module_id: String,
    target: String,
    edge_type: IrEdgeType,
}

struct PendingCall {
    from: String,
    module_id: String,
    callee: String,
}

/// Per-walk context: where new nodes attach and who owns call sites.
struct Scope<'a> {
    language: Language,
    module_id: &'a str,
    module_name: &'a str,
    container: String,
    prefix: String,
    function: Option<String>,
}

/// Accumulates IR nodes from parsed files; cross-file edges are resolved in
/// [`IrGraphBuilder::build`] once every file is known.
#[derive(Default)]
pub struct IrGraphBuilder {
    nodes: BTreeMap<String, IrNode>,
    edges: Vec<IrEdge>,
    modules: HashMap<String, String>,
    id_counts: HashMap<String, usize>,
    imports: Vec<PendingImport>,
    heritage: Vec<PendingHeritage>,
    calls: Vec<PendingCall>,
}

impl IrGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_files<'a>(&mut self, files: impl IntoIterator<Item = &'a AstFile>) {
        for file in files {
            self.add_file(file);
        }
    }

    pub fn add_file(&mut self, file: &AstFile) {
        let path = normalize_path(&file.file_path);
        if self.modules.contains_key(&path) {
            warn!(file = %file.file_path, "file added to IR graph twice, ignoring");
            return;
        }

        let module_name = strip_extension(&path).to_string();
        let module_id = format!("{}:{}", file.language, module_name);
        let mut module = IrNode::module(
            module_id.clone(),
            module_name.clone(),
            file.language,
            file.root.location.clone(),
        );
        module.is_exported = !file.exports.is_empty();
        module.content_hash = file.content_hash.clone();
        self.id_counts.insert(module_id.clone(), 1);
        self.nodes.insert(module_id.clone(), module);
        self.modules.insert(path.clone(), module_id.clone());

        for import in &file.imports {
            self.imports.push(PendingImport {
                module_id: module_id.clone(),
                file_path: path.clone(),
                import: import.clone(),
            });
        }

        let scope = Scope {
            language: file.language,
            module_id: &module_id,
            module_name: &module_name,
            container: module_id.clone(),
            prefix: String::new(),
            function: None,
        };
        self.walk(&file.root, &scope);
    }

    fn unique_id(&mut self, base: String) -> String {
        let count = self.id_counts.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{}#{}", base, *count - 1)
        }
    }

    fn walk(&mut self, node: &AstNode, scope: &Scope) {
        for child in &node.children {
            if child.node_type == AstNodeType::Call {
                if let Some(callee) = child.callee() {
                    self.calls.push(PendingCall {
                        from: scope.function.clone().unwrap_or_else(|| scope.container.clone()),
                        module_id: scope.module_id.to_string(),
                        callee: callee.to_string(),
                    });
                }
                self.walk(child, scope);
                continue;
            }

            let ir_type = IrNodeType::from_ast(child.node_type);
            let (Some(ir_type), Some(name), None) = (ir_type, child.name.as_deref(), &scope.function)
            else {
                // locals and nested functions belong to the enclosing function
                self.walk(child, scope);
                continue;
            };

            let qualified = format!("{}::{}{}", scope.module_name, scope.prefix, name);
            let id = self.unique_id(format!("{}:{}", scope.language, qualified));
            let ir = IrNode::from_ast(id.clone(), ir_type, qualified, scope.language, child);
            self.edges
                .push(IrEdge::new(scope.container.clone(), id.clone(), IrEdgeType::Compose));

            if matches!(ir_type, IrNodeType::Class | IrNodeType::Interface) {
                for parent in child.extends() {
                    self.heritage.push(PendingHeritage {
                        from: id.clone(),
                        module_id: scope.module_id.to_string(),
                        target: parent,
                        edge_type: IrEdgeType::Inherit,
                    });
                }
                for iface in child.implements() {
                    self.heritage.push(PendingHeritage {
                        from: id.clone(),
                        module_id: scope.module_id.to_string(),
                        target: iface,
                        edge_type: IrEdgeType::Implement,
                    });
                }
            }
            self.nodes.insert(id.clone(), ir);

            let inner = match ir_type {
                IrNodeType::Class | IrNodeType::Interface | IrNodeType::Enum => Scope {
                    language: scope.language,
                    module_id: scope.module_id,
                    module_name: scope.module_name,
                    container: id,
                    prefix: format!("{}{}.", scope.prefix, name),
                    function: None,
                },
                IrNodeType::Function => Scope {
                    language: scope.language,
                    module_id: scope.module_id,
                    module_name: scope.module_name,
                    container: scope.container.clone(),
                    prefix: scope.prefix.clone(),
                    function: Some(id),
                },
                _ => Scope {
                    language: scope.language,
                    module_id: scope.module_id,
                    module_name: scope.module_name,
                    container: scope.container.clone(),
                    prefix: scope.prefix.clone(),
                    function: None,
                },
            };
            self.walk(child, &inner);
        }
    }

    /// Resolves pending references and computes indices, cycles and entry points.
    pub fn build(mut self) -> IrGraph {
        self.resolve_imports();
        self.resolve_heritage();
        self.resolve_calls();

        let mut graph = IrGraph {
            nodes: self.nodes,
            edges: self.edges,
            ..IrGraph::default()
        };

        for node in graph.nodes.values() {
            if !node.file_path().is_empty() {
                graph
                    .by_file
                    .entry(node.file_path().to_string())
                    .or_default()
                    .push(node.id.clone());
            }
            graph
                .by_type
                .entry(node.node_type)
                .or_default()
                .push(node.id.clone());
        }
        for (idx, edge) in graph.edges.iter().enumerate() {
            graph.outgoing.entry(edge.from.clone()).or_default().push(idx);
            graph.incoming.entry(edge.to.clone()).or_default().push(idx);
        }

        let mut imports: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for node in graph.nodes.values() {
            if node.node_type == IrNodeType::Module {
                imports.insert(node.id.clone(), Vec::new());
            }
        }
        for edge in graph.edges.iter().filter(|e| e.edge_type == IrEdgeType::Import) {
            imports.entry(edge.from.clone()).or_default().push(edge.to.clone());
        }
        for targets in imports.values_mut() {
            targets.sort();
        }
        graph.cycles = find_cycles(&imports);

        graph.entry_points = graph
            .nodes
            .values()
            .filter(|n| n.node_type == IrNodeType::Module && n.is_exported)
            .filter(|n| graph.incoming.get(&n.id).map(Vec::is_empty).unwrap_or(true))
            .map(|n| n.id.clone())
            .collect();

        debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            cycles = graph.cycles.len(),
            "IR graph built"
        );
        graph
    }

    fn resolve_imports(&mut self) {
        let known: HashSet<String> = self.modules.keys().cloned().collect();
        let mut merged: BTreeMap<(String, String), IrEdge> = BTreeMap::new();

        for pending in std::mem::take(&mut self.imports) {
            let source = &pending.import.source;
            let target = match resolve_import(&pending.file_path, source, &known)
                .and_then(|path| self.modules.get(&path).cloned())
            {
                Some(module_id) => module_id,
                None => {
                    let external = IrNode::external(source);
                    let id = external.id.clone();
                    self.nodes.entry(id.clone()).or_insert(external);
                    id
                }
            };

            let key = (pending.module_id.clone(), target.clone());
            match merged.get_mut(&key) {
                Some(edge) => {
                    edge.weight += 1.0;
                    edge.conditional &= pending.import.is_dynamic;
                }
                None => {
                    let edge = IrEdge::new(pending.module_id, target, IrEdgeType::Import)
                        .conditional(pending.import.is_dynamic)
                        .with_metadata("specifier", source.clone())
                        .with_metadata("line", pending.import.line.to_string());
                    merged.insert(key, edge);
                }
            }
        }
        self.edges.extend(merged.into_values());
    }

    /// Name lookup preferring the referencing module, then a unique global match.
    fn resolve_name(
        &self,
        index: &HashMap<&str, Vec<(&str, &str)>>,
        module_id: &str,
        name: &str,
    ) -> Option<String> {
        let candidates = index.get(name)?;
        if let Some((_, id)) = candidates.iter().find(|(module, _)| *module == module_id) {
            return Some(id.to_string());
        }
        match candidates.as_slice() {
            [(_, id)] => Some(id.to_string()),
            _ => None,
        }
    }

    fn name_index(&self, types: &[IrNodeType]) -> HashMap<&str, Vec<(&str, &str)>> {
        let mut index: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
        for node in self.nodes.values() {
            if !types.contains(&node.node_type) {
                continue;
            }
            // member ids are `<module id>::<path>`
            let module_id = node.id.split("::").next().unwrap_or(&node.id);
            index
                .entry(node.name.as_str())
                .or_default()
                .push((module_id, node.id.as_str()));
        }
        index
    }

    fn resolve_heritage(&mut self) {
        let resolved: Vec<IrEdge> = {
            let index = self.name_index(&[IrNodeType::Class, IrNodeType::Interface]);
            self.heritage
                .iter()
                .filter_map(|h| {
                    let bare = h.target.split('<').next().unwrap_or(&h.target);
                    let bare = bare.rsplit('.').next().unwrap_or(bare).trim();
                    self.resolve_name(&index, &h.module_id, bare)
                        .filter(|to| *to != h.from)
                        .map(|to| IrEdge::new(h.from.clone(), to, h.edge_type))
                })
                .collect()
        };
        self.heritage.clear();
        self.edges.extend(resolved);
    }

    fn resolve_calls(&mut self) {
        let merged: BTreeMap<(String, String), usize> = {
            let index = self.name_index(&[IrNodeType::Function]);
            let mut merged = BTreeMap::new();
            for call in &self.calls {
                if let Some(to) = self.resolve_name(&index, &call.module_id, &call.callee) {
                    *merged.entry((call.from.clone(), to)).or_insert(0) += 1;
                }
            }
            merged
        };
        let dropped = self.calls.len() - merged.values().sum::<usize>();
        if dropped > 0 {
            debug!(dropped, "unresolved call sites dropped");
        }
        self.calls.clear();
        for ((from, to), count) in merged {
            self.edges
                .push(IrEdge::new(from, to, IrEdgeType::Call).with_weight(count as f64));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codescan_core::{keys, ExportInfo, Location, ParseFidelity};

    fn loc(path: &str, start: u32, end: u32) -> Location {
        Location::new(path, start, 1, end, 1)
    }

    fn file(path: &str, children: Vec<AstNode>, imports: Vec<ImportInfo>, exported: bool) -> AstFile {
        let mut root = AstNode::named(AstNodeType::Module, "m", loc(path, 1, 100));
        root.children = children;
        let exports = if exported {
            vec![ExportInfo {
                name: "x".into(),
                kind: "function".into(),
                is_default: false,
                line: 1,
            }]
        } else {
            Vec::new()
        };
        AstFile::new(path, Language::TypeScript, root, imports, exports, "h", ParseFidelity::Full)
    }

    fn call(path: &str, line: u32, callee: &str) -> AstNode {
        AstNode::named(AstNodeType::Call, callee, loc(path, line, line)).with_meta(keys::CALLEE, callee)
    }

    #[test]
    fn ids_are_language_qualified() {
        let mut method = AstNode::named(AstNodeType::Function, "load", loc("src/svc.ts", 2, 4));
        method.children.push(call("src/svc.ts", 3, "helper"));
        let mut class = AstNode::named(AstNodeType::Class, "Service", loc("src/svc.ts", 1, 5));
        class.children.push(method);
        let helper = AstNode::named(AstNodeType::Function, "helper", loc("src/svc.ts", 7, 8));

        let mut builder = IrGraphBuilder::new();
        builder.add_file(&file("./src/svc.ts", vec![class, helper], vec![], true));
        let graph = builder.build();

        assert!(graph.node("typescript:src/svc").is_some());
        assert!(graph.node("typescript:src/svc::Service").is_some());
        assert!(graph.node("typescript:src/svc::Service.load").is_some());
        let calls = graph.outgoing_of_type("typescript:src/svc::Service.load", IrEdgeType::Call);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].to, "typescript:src/svc::helper");

        let composed = graph.outgoing_of_type("typescript:src/svc::Service", IrEdgeType::Compose);
        assert_eq!(composed.len(), 1);
        assert_eq!(graph.entry_points(), &["typescript:src/svc".to_string()]);
    }

    #[test]
    fn duplicate_names_get_suffixes() {
        let a = AstNode::named(AstNodeType::Function, "f", loc("a.ts", 1, 2));
        let b = AstNode::named(AstNodeType::Function, "f", loc("a.ts", 3, 4));
        let mut builder = IrGraphBuilder::new();
        builder.add_file(&file("a.ts", vec![a, b], vec![], false));
        let graph = builder.build();
        assert!(graph.node("typescript:a::f").is_some());
        assert!(graph.node("typescript:a::f#1").is_some());
    }

    #[test]
    fn unresolved_imports_target_external_nodes() {
        let imports = vec![ImportInfo::new("react", 1), ImportInfo::new("./missing", 2)];
        let mut builder = IrGraphBuilder::new();
        builder.add_file(&file("src/a.ts", vec![], imports, false));
        let graph = builder.build();
        let externals = graph.nodes_of_type(IrNodeType::Namespace);
        let ids: Vec<_> = externals.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["external:./missing", "external:react"]);
        assert_eq!(graph.outgoing_of_type("typescript:src/a", IrEdgeType::Import).len(), 2);
    }

    #[test]
    fn heritage_resolves_across_files() {
        let base = AstNode::named(AstNodeType::Class, "Base", loc("base.ts", 1, 3));
        let child = AstNode::named(AstNodeType::Class, "Child", loc("child.ts", 2, 5))
            .with_meta(keys::EXTENDS, vec!["Base".to_string()])
            .with_meta(keys::IMPLEMENTS, vec!["Unknown".to_string()]);

        let mut builder = IrGraphBuilder::new();
        builder.add_file(&file("base.ts", vec![base], vec![], true));
        builder.add_file(&file("child.ts", vec![child], vec![ImportInfo::new("./base", 1)], true));
        let graph = builder.build();

        let inherits = graph.outgoing_of_type("typescript:child::Child", IrEdgeType::Inherit);
        assert_eq!(inherits.len(), 1);
        assert_eq!(inherits[0].to, "typescript:base::Base");
        assert!(graph
            .outgoing_of_type("typescript:child::Child", IrEdgeType::Implement)
            .is_empty());
        assert_eq!(graph.entry_points(), &["typescript:child".to_string()]);
    }
}
