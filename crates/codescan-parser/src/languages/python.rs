// ABOUTME: Python parser backed by the tree-sitter Python grammar. Recognizes imports,
// ABOUTME: classes, functions with receivers and decorators, module-level assignments and calls.
use super::extractor_utils::{
    annotate_members, children_by_kind, contains_kind_in_scope, has_child_kind, location_for,
    module_root, node_text, parse_tree,
};
use crate::error::Result;
use crate::parser::SourceParser;
use codescan_core::{
    content_hash, keys, AstFile, AstNode, AstNodeType, ExportInfo, ImportInfo, Language,
    Location, ParseFidelity,
};
use tree_sitter::{Node, TreeCursor};

/// Scopes an `await` inside a function body does not belong to.
const NESTED_SCOPES: &[&str] = &["function_definition", "lambda", "class_definition"];

#[derive(Debug, Default, Clone, Copy)]
pub struct PythonParser;

impl SourceParser for PythonParser {
    fn languages(&self) -> &[Language] {
        &[Language::Python]
    }

    fn fidelity(&self) -> ParseFidelity {
        ParseFidelity::Full
    }

    fn parse(&self, file_path: &str, content: &str, language: Language) -> Result<AstFile> {
        let tree = parse_tree(tree_sitter_python::LANGUAGE.into(), file_path, content, language)?;
        let program = tree.root_node();

        let mut collector = PythonCollector::new(content, file_path);
        let mut cursor = tree.walk();
        let children = collector.walk_children(&mut cursor);

        let mut root = module_root(&program, file_path);
        root.children = children;
        annotate_members(&mut root, None, None);

        Ok(AstFile::new(
            file_path,
            Language::Python,
            root,
            collector.imports,
            collector.exports,
            content_hash(content),
            ParseFidelity::Full,
        ))
    }
}

struct PythonCollector<'a> {
    content: &'a str,
    file_path: &'a str,
    imports: Vec<ImportInfo>,
    exports: Vec<ExportInfo>,
}

impl<'a> PythonCollector<'a> {
    fn new(content: &'a str, file_path: &'a str) -> Self {
        Self {
            content,
            file_path,
            imports: Vec::new(),
            exports: Vec::new(),
        }
    }

    fn text(&self, node: &Node) -> &'a str {
        node_text(node, self.content)
    }

    fn location(&self, node: &Node) -> Location {
        location_for(node, self.file_path)
    }

    fn export(&mut self, name: &str, kind: &str, node: &Node) {
        self.exports.push(ExportInfo {
            name: name.to_string(),
            kind: kind.to_string(),
            is_default: false,
            line: node.start_position().row as u32 + 1,
        });
    }

    fn walk_children(&mut self, cursor: &mut TreeCursor) -> Vec<AstNode> {
        let mut out = Vec::new();
        if cursor.goto_first_child() {
            loop {
                out.extend(self.walk(cursor));
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
            cursor.goto_parent();
        }
        out
    }

    fn collect(&mut self, node: Node) -> Vec<AstNode> {
        let mut cursor = node.walk();
        self.walk(&mut cursor)
    }

    fn collect_children(&mut self, node: Node) -> Vec<AstNode> {
        let mut cursor = node.walk();
        self.walk_children(&mut cursor)
    }

    fn collect_field(&mut self, node: &Node, field: &str) -> Vec<AstNode> {
        match node.child_by_field_name(field) {
            Some(child) => self.collect(child),
            None => Vec::new(),
        }
    }

    fn walk(&mut self, cursor: &mut TreeCursor) -> Vec<AstNode> {
        let node = cursor.node();

        match node.kind() {
            "import_statement" => self.import(node),

            "import_from_statement" => self.import_from(node),

            "class_definition" => vec![self.class(node, Vec::new())],

            "function_definition" => vec![self.function(node, Vec::new())],

            "decorated_definition" => self.decorated(node),

            "expression_statement" if node.parent().map(|p| p.kind()) == Some("module") => {
                self.assignment(node)
            }

            "call" => self.call(node),

            _ => self.walk_children(cursor),
        }
    }

    /// Decorator names without the `@` and call arguments: `@app.route("/")` is `app.route`.
    fn decorated(&mut self, node: Node) -> Vec<AstNode> {
        let decorators: Vec<String> = children_by_kind(&node, "decorator")
            .iter()
            .map(|d| {
                let text = self.text(d).trim_start_matches('@').trim();
                text.split('(').next().unwrap_or(text).trim().to_string()
            })
            .collect();

        match node.child_by_field_name("definition") {
            Some(def) if def.kind() == "class_definition" => vec![self.class(def, decorators)],
            Some(def) if def.kind() == "function_definition" => {
                vec![self.function(def, decorators)]
            }
            Some(def) => self.collect(def),
            None => Vec::new(),
        }
    }

    fn class(&mut self, node: Node, decorators: Vec<String>) -> AstNode {
        let name = self.name_of(&node);
        let exported = enclosing_scope(&node) == Some("module") && !name.starts_with('_');

        let mut ast = AstNode::named(AstNodeType::Class, name.clone(), self.location(&node))
            .with_meta(keys::EXPORTED, exported)
            .with_meta(keys::VISIBILITY, visibility_of(&name));

        if let Some(bases) = node.child_by_field_name("superclasses") {
            let mut cursor = bases.walk();
            let extends: Vec<String> = bases
                .named_children(&mut cursor)
                .filter(|b| !matches!(b.kind(), "keyword_argument" | "comment"))
                .map(|b| self.text(&b).to_string())
                .collect();
            if !extends.is_empty() {
                ast.set_meta(keys::EXTENDS, extends);
            }
        }
        if !decorators.is_empty() {
            ast.set_meta(keys::DECORATORS, decorators);
        }
        if exported {
            self.export(&name, "class", &node);
        }

        ast.children = self.collect_field(&node, "body");
        ast
    }

    fn function(&mut self, node: Node, decorators: Vec<String>) -> AstNode {
        let name = self.name_of(&node);
        let scope = enclosing_scope(&node);
        let exported = scope == Some("module") && !name.starts_with('_');
        let is_static = decorators.iter().any(|d| d == "staticmethod");

        let mut params = self.parameter_names(&node);
        let receiver = match params.first().map(String::as_str) {
            Some("self") | Some("cls") if scope == Some("class_definition") && !is_static => {
                Some(params.remove(0))
            }
            _ => None,
        };

        let body = node.child_by_field_name("body");
        let has_await = body
            .map(|b| contains_kind_in_scope(&b, "await", NESTED_SCOPES))
            .unwrap_or(false);
        let body_empty = body.map(|b| is_trivial_body(&b)).unwrap_or(false);

        let mut ast = AstNode::named(AstNodeType::Function, name.clone(), self.location(&node))
            .with_meta(keys::ASYNC, has_child_kind(&node, "async"))
            .with_meta(keys::EXPORTED, exported)
            .with_meta(keys::STATIC, is_static)
            .with_meta(keys::VISIBILITY, visibility_of(&name))
            .with_meta(keys::PARAM_COUNT, params.len())
            .with_meta(keys::PARAMETERS, params)
            .with_meta(keys::HAS_AWAIT, has_await)
            .with_meta(keys::BODY_EMPTY, body_empty);
        if let Some(receiver) = receiver {
            ast.set_meta(keys::RECEIVER, receiver);
        }
        if !decorators.is_empty() {
            ast.set_meta(keys::DECORATORS, decorators);
        }
        if exported {
            self.export(&name, "function", &node);
        }

        if let Some(body) = body {
            ast.children = self.collect(body);
        }
        ast
    }

    fn parameter_names(&self, node: &Node) -> Vec<String> {
        let Some(params) = node.child_by_field_name("parameters") else {
            return Vec::new();
        };
        let mut cursor = params.walk();
        params
            .named_children(&mut cursor)
            .filter_map(parameter_binding)
            .map(|ident| self.text(&ident).to_string())
            .collect()
    }

    /// Module-level `NAME = value` becomes a variable; other statements are only searched for calls.
    fn assignment(&mut self, node: Node) -> Vec<AstNode> {
        let Some(assign) = node.named_child(0).filter(|n| n.kind() == "assignment") else {
            return self.collect_children(node);
        };
        let Some(left) = assign
            .child_by_field_name("left")
            .filter(|l| l.kind() == "identifier")
        else {
            return self.collect_children(node);
        };

        let name = self.text(&left).to_string();
        let exported = !name.starts_with('_');
        let value = assign.child_by_field_name("right");
        let mut ast = AstNode::named(AstNodeType::Variable, name.clone(), self.location(&node))
            .with_meta(keys::EXPORTED, exported);
        if let Some(value) = value {
            ast.set_meta(keys::VALUE, self.text(&value));
        }
        if exported {
            self.export(&name, "variable", &node);
        }

        let mut out = vec![ast];
        if let Some(value) = value {
            out.extend(self.collect(value));
        }
        out
    }

    fn import(&mut self, node: Node) -> Vec<AstNode> {
        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();

        let mut out = Vec::new();
        for name in names {
            let (module, local) = match name.kind() {
                "aliased_import" => {
                    let module = name
                        .child_by_field_name("name")
                        .map(|n| self.text(&n).to_string())
                        .unwrap_or_default();
                    let alias = name
                        .child_by_field_name("alias")
                        .map(|n| self.text(&n).to_string())
                        .unwrap_or_else(|| module.clone());
                    (module, alias)
                }
                _ => {
                    let module = self.text(&name).to_string();
                    let local = module.rsplit('.').next().unwrap_or(&module).to_string();
                    (module, local)
                }
            };
            out.push(self.push_import(&node, module, vec![local]));
        }
        out
    }

    fn import_from(&mut self, node: Node) -> Vec<AstNode> {
        let Some(module) = node.child_by_field_name("module_name") else {
            return Vec::new();
        };
        let module = self.text(&module).to_string();

        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        let mut specifiers: Vec<String> = names
            .iter()
            .map(|name| {
                let local = match name.kind() {
                    "aliased_import" => name
                        .child_by_field_name("alias")
                        .or_else(|| name.child_by_field_name("name")),
                    _ => Some(*name),
                };
                local.map(|n| self.text(&n).to_string()).unwrap_or_default()
            })
            .filter(|s| !s.is_empty())
            .collect();
        if has_child_kind(&node, "wildcard_import") {
            specifiers.push("*".to_string());
        }

        vec![self.push_import(&node, module, specifiers)]
    }

    fn push_import(&mut self, node: &Node, source: String, specifiers: Vec<String>) -> AstNode {
        self.imports.push(
            ImportInfo::new(source.clone(), node.start_position().row as u32 + 1)
                .with_specifiers(specifiers.clone()),
        );
        AstNode::named(AstNodeType::Import, source.clone(), self.location(node))
            .with_meta(keys::SOURCE, source)
            .with_meta(keys::SPECIFIERS, specifiers)
    }

    /// `a.b().c(x)` yields `b` then `c`, followed by calls in the arguments.
    fn call(&mut self, node: Node) -> Vec<AstNode> {
        let Some(function) = node.child_by_field_name("function") else {
            return Vec::new();
        };
        let mut out = Vec::new();

        let callee = match function.kind() {
            "identifier" => Some(self.text(&function).to_string()),
            "attribute" => {
                out.extend(self.collect_field(&function, "object"));
                function
                    .child_by_field_name("attribute")
                    .map(|a| self.text(&a).to_string())
            }
            _ => {
                out.extend(self.collect(function));
                None
            }
        };
        if let Some(callee) = callee {
            let callee_text: String = self.text(&function).split_whitespace().collect();
            out.push(
                AstNode::named(AstNodeType::Call, callee.clone(), self.location(&node))
                    .with_meta(keys::CALLEE, callee)
                    .with_meta("calleeText", callee_text),
            );
        }

        out.extend(self.collect_field(&node, "arguments"));
        out
    }

    fn name_of(&self, node: &Node) -> String {
        node.child_by_field_name("name")
            .map(|n| self.text(&n).to_string())
            .unwrap_or_else(|| "<anonymous>".to_string())
    }
}

/// Kind of the nearest enclosing module, class or function, looking through
/// decorators and blocks.
fn enclosing_scope(node: &Node) -> Option<&'static str> {
    let mut current = node.parent();
    while let Some(parent) = current {
        match parent.kind() {
            "module" => return Some("module"),
            "class_definition" => return Some("class_definition"),
            "function_definition" | "lambda" => return Some("function_definition"),
            _ => current = parent.parent(),
        }
    }
    None
}

/// The identifier a parameter binds, through type annotations, defaults and splats.
fn parameter_binding(param: Node) -> Option<Node> {
    match param.kind() {
        "identifier" => Some(param),
        "default_parameter" | "typed_default_parameter" => param
            .child_by_field_name("name")
            .and_then(parameter_binding),
        "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => {
            param.named_child(0).and_then(parameter_binding)
        }
        _ => None,
    }
}

/// A body holding only `pass`, `...`, docstrings or comments.
fn is_trivial_body(block: &Node) -> bool {
    let mut cursor = block.walk();
    let trivial = block.named_children(&mut cursor).all(|stmt| match stmt.kind() {
        "pass_statement" | "comment" => true,
        "expression_statement" => {
            stmt.named_child_count() == 1
                && stmt
                    .named_child(0)
                    .map(|e| matches!(e.kind(), "string" | "concatenated_string" | "ellipsis"))
                    .unwrap_or(false)
        }
        _ => false,
    });
    trivial
}

fn visibility_of(name: &str) -> &'static str {
    if name.starts_with("__") && !name.ends_with("__") {
        "private"
    } else if name.starts_with('_') && !name.starts_with("__") {
        "protected"
    } else {
        "public"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"import os, sys as system
from .models import (User,
    Group)

LIMIT = 10

@dataclass
class Service(Base, Mixin):
    """Docs with def fake(): inside"""

    def __init__(self, repo: Repo, *args):
        self.repo = repo

    @staticmethod
    def helper(x=1):
        pass

    async def fetch(self, key):
        return await self.repo.get(key)

def _private():
    os.getcwd()
"#;

    fn parse() -> AstFile {
        PythonParser.parse("pkg/service.py", SOURCE, Language::Python).unwrap()
    }

    #[test]
    fn collects_imports() {
        let file = parse();
        let sources: Vec<_> = file.imports.iter().map(|i| i.source.as_str()).collect();
        assert_eq!(sources, vec!["os", "sys", ".models"]);
        assert_eq!(file.imports[1].specifiers, vec!["system"]);
        assert!(file.imports[2].is_relative);
        assert_eq!(file.imports[2].specifiers, vec!["User", "Group"]);
        assert_eq!(file.fidelity, ParseFidelity::Full);
    }

    #[test]
    fn classes_contain_methods() {
        let file = parse();
        let class = file.root.find_all(AstNodeType::Class)[0].clone();
        assert_eq!(class.name.as_deref(), Some("Service"));
        assert_eq!(class.extends(), vec!["Base", "Mixin"]);
        assert_eq!(class.location.start_line, 8);
        assert_eq!(class.location.end_line, 19);
        assert_eq!(
            class.meta(keys::DECORATORS).and_then(|v| v.as_list()),
            Some(&["dataclass".to_string()][..])
        );

        let methods: Vec<_> = class
            .children
            .iter()
            .filter(|c| c.node_type == AstNodeType::Function)
            .collect();
        assert_eq!(methods.len(), 3);
        assert!(methods.iter().all(|m| m.is_method()));
        assert_eq!(methods[0].receiver(), Some("self"));
        assert_eq!(methods[0].parameters(), &["repo".to_string(), "args".to_string()]);
        assert!(methods[1].is_static());
        assert!(methods[1].meta(keys::BODY_EMPTY).and_then(|v| v.as_bool()).unwrap());
        assert_eq!(methods[1].parameters(), &["x".to_string()]);
        assert!(methods[2].is_async());
        assert_eq!(methods[2].meta(keys::HAS_AWAIT).and_then(|v| v.as_bool()), Some(true));
        assert!(!methods[2].is_exported());
    }

    #[test]
    fn docstring_content_is_not_parsed() {
        let file = parse();
        assert!(file.functions().iter().all(|f| f.name.as_deref() != Some("fake")));
    }

    #[test]
    fn module_level_exports_and_calls() {
        let file = parse();
        let exported: Vec<_> = file.exports.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(exported, vec!["LIMIT", "Service"]);

        let limit = &file.root.find_all(AstNodeType::Variable)[0];
        assert_eq!(limit.meta(keys::VALUE).and_then(|v| v.as_str()), Some("10"));

        let private = file
            .functions()
            .into_iter()
            .find(|f| f.name.as_deref() == Some("_private"))
            .unwrap();
        let call = &private.children[0];
        assert_eq!(call.callee(), Some("getcwd"));
        assert_eq!(call.caller(), Some("_private"));
        assert_eq!(call.meta("calleeText").and_then(|v| v.as_str()), Some("os.getcwd"));
    }

    #[test]
    fn one_line_definitions() {
        let src = "class A: pass\ndef f(): return g()\ndef g(): ...\n";
        let file = PythonParser.parse("a.py", src, Language::Python).unwrap();
        let names: Vec<_> = file.functions().iter().filter_map(|f| f.name.clone()).collect();
        assert_eq!(names, vec!["f", "g"]);
        let g = file.functions()[1];
        assert_eq!(g.meta(keys::BODY_EMPTY).and_then(|v| v.as_bool()), Some(true));
        assert_eq!(file.functions()[0].children[0].callee(), Some("g"));
    }
}
