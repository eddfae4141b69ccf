// ABOUTME: Go parser backed by the tree-sitter Go grammar: package clause, imports,
// ABOUTME: funcs and methods with receivers, struct/interface/type declarations, package vars.
use super::extractor_utils::{
    annotate_members, child_by_kind, children_by_kind, contains_kind_in_scope, location_for,
    module_root, node_text, parse_tree, strip_type_arguments, unquote,
};
use crate::error::Result;
use crate::parser::SourceParser;
use codescan_core::{
    content_hash, keys, AstFile, AstNode, AstNodeType, ExportInfo, ImportInfo, Language,
    Location, ParseFidelity,
};
use tree_sitter::{Node, TreeCursor};

/// Builtins and conversions that never resolve to a user function.
const BUILTINS: &[&str] = &[
    "append", "cap", "close", "copy", "delete", "len", "make", "new", "panic", "print",
    "println", "recover", "string", "int", "int64", "float64", "byte", "rune",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct GoParser;

impl SourceParser for GoParser {
    fn languages(&self) -> &[Language] {
        &[Language::Go]
    }

    fn fidelity(&self) -> ParseFidelity {
        ParseFidelity::Full
    }

    fn parse(&self, file_path: &str, content: &str, language: Language) -> Result<AstFile> {
        let tree = parse_tree(tree_sitter_go::LANGUAGE.into(), file_path, content, language)?;
        let program = tree.root_node();

        let mut collector = GoCollector::new(content, file_path);
        let mut cursor = tree.walk();
        let children = collector.walk_children(&mut cursor);

        let mut root = module_root(&program, file_path);
        if let Some(package) = &collector.package {
            root.set_meta("package", package.as_str());
        }
        root.children = children;
        annotate_members(&mut root, None, None);

        Ok(AstFile::new(
            file_path,
            Language::Go,
            root,
            collector.imports,
            collector.exports,
            content_hash(content),
            ParseFidelity::Full,
        ))
    }
}

struct GoCollector<'a> {
    content: &'a str,
    file_path: &'a str,
    package: Option<String>,
    imports: Vec<ImportInfo>,
    exports: Vec<ExportInfo>,
}

impl<'a> GoCollector<'a> {
    fn new(content: &'a str, file_path: &'a str) -> Self {
        Self {
            content,
            file_path,
            package: None,
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
        if is_exported(name) {
            self.exports.push(ExportInfo {
                name: name.to_string(),
                kind: kind.to_string(),
                is_default: false,
                line: node.start_position().row as u32 + 1,
            });
        }
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

    fn collect_field(&mut self, node: &Node, field: &str) -> Vec<AstNode> {
        match node.child_by_field_name(field) {
            Some(child) => self.collect(child),
            None => Vec::new(),
        }
    }

    fn walk(&mut self, cursor: &mut TreeCursor) -> Vec<AstNode> {
        let node = cursor.node();

        match node.kind() {
            "package_clause" => {
                self.package =
                    child_by_kind(&node, "package_identifier").map(|n| self.text(&n).to_string());
                Vec::new()
            }

            "import_declaration" => self.imports(node),

            "function_declaration" | "method_declaration" => vec![self.function(node)],

            "type_declaration" => self.type_declaration(node),

            "var_declaration" | "const_declaration" if is_package_level(&node) => {
                self.package_values(node)
            }

            "call_expression" => self.call(node),

            _ => self.walk_children(cursor),
        }
    }

    fn imports(&mut self, node: Node) -> Vec<AstNode> {
        let mut specs = children_by_kind(&node, "import_spec");
        if let Some(list) = child_by_kind(&node, "import_spec_list") {
            specs.extend(children_by_kind(&list, "import_spec"));
        }

        let mut out = Vec::new();
        for spec in specs {
            let Some(path) = spec.child_by_field_name("path") else {
                continue;
            };
            let path = unquote(self.text(&path));
            let name = spec
                .child_by_field_name("name")
                .map(|alias| self.text(&alias).to_string())
                .unwrap_or_else(|| path.rsplit('/').next().unwrap_or(&path).to_string());

            self.imports.push(
                ImportInfo::new(path.clone(), spec.start_position().row as u32 + 1)
                    .with_specifiers(vec![name.clone()]),
            );
            out.push(
                AstNode::named(AstNodeType::Import, path.clone(), self.location(&spec))
                    .with_meta(keys::SOURCE, path)
                    .with_meta(keys::SPECIFIERS, vec![name]),
            );
        }
        out
    }

    fn function(&mut self, node: Node) -> AstNode {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(&n).to_string())
            .unwrap_or_else(|| "<anonymous>".to_string());
        let params = node
            .child_by_field_name("parameters")
            .map(|list| self.parameter_names(&list))
            .unwrap_or_default();
        let body = node.child_by_field_name("body");
        let exported = is_exported(&name);

        let mut ast = AstNode::named(AstNodeType::Function, name.clone(), self.location(&node))
            .with_meta(keys::EXPORTED, exported)
            .with_meta(keys::VISIBILITY, if exported { "public" } else { "package" })
            .with_meta(keys::ASYNC, false)
            .with_meta(keys::PARAM_COUNT, params.len())
            .with_meta(keys::PARAMETERS, params)
            .with_meta(keys::BODY_EMPTY, body.map(|b| is_empty_block(&b)).unwrap_or(false))
            .with_meta(
                "spawnsGoroutine",
                body.map(|b| contains_kind_in_scope(&b, "go_statement", &[]))
                    .unwrap_or(false),
            );

        if let Some(receiver) = node
            .child_by_field_name("receiver")
            .and_then(|list| child_by_kind(&list, "parameter_declaration"))
        {
            if let Some(ty) = receiver.child_by_field_name("type") {
                let receiver_type =
                    strip_type_arguments(self.text(&ty).trim_start_matches('*').trim());
                ast.set_meta(keys::IS_METHOD, true);
                ast.set_meta(keys::CLASS_NAME, receiver_type.as_str());
                ast.set_meta(keys::RECEIVER, receiver_type);
            }
            if let Some(receiver_name) = receiver.child_by_field_name("name") {
                ast.set_meta("receiverName", self.text(&receiver_name));
            }
        }

        self.export(&name, "function", &node);
        if let Some(body) = body {
            ast.children = self.collect(body);
        }
        ast
    }

    /// `a, b int, c string` names a, b and c.
    fn parameter_names(&self, list: &Node) -> Vec<String> {
        let mut names = Vec::new();
        let mut cursor = list.walk();
        for param in list.named_children(&mut cursor) {
            if !matches!(
                param.kind(),
                "parameter_declaration" | "variadic_parameter_declaration"
            ) {
                continue;
            }
            let mut inner = param.walk();
            names.extend(
                param
                    .children_by_field_name("name", &mut inner)
                    .map(|n| self.text(&n).to_string()),
            );
        }
        names
    }

    fn type_declaration(&mut self, node: Node) -> Vec<AstNode> {
        let mut specs = children_by_kind(&node, "type_spec");
        specs.extend(children_by_kind(&node, "type_alias"));
        specs.sort_by_key(|s| s.start_byte());
        let single = specs.len() == 1;

        specs
            .into_iter()
            .map(|spec| {
                let anchor = if single { node } else { spec };
                self.type_spec(anchor, spec)
            })
            .collect()
    }

    fn type_spec(&mut self, anchor: Node, spec: Node) -> AstNode {
        let name = spec
            .child_by_field_name("name")
            .map(|n| self.text(&n).to_string())
            .unwrap_or_else(|| "<anonymous>".to_string());
        let ty = spec.child_by_field_name("type");
        let kind = ty.map(|t| t.kind()).unwrap_or("");
        let alias = spec.kind() == "type_alias";

        let (node_type, export_kind) = match kind {
            "struct_type" if !alias => (AstNodeType::Class, "struct"),
            "interface_type" if !alias => (AstNodeType::Interface, "interface"),
            _ => (AstNodeType::Type, "type"),
        };
        let mut ast = AstNode::named(node_type, name.clone(), self.location(&anchor))
            .with_meta(keys::EXPORTED, is_exported(&name));

        match (node_type, ty) {
            (AstNodeType::Class, Some(ty)) => {
                let embedded = self.embedded_fields(&ty);
                if !embedded.is_empty() {
                    ast.set_meta("embeds", embedded);
                }
            }
            (AstNodeType::Interface, Some(ty)) => {
                let embedded: Vec<String> = ["type_elem", "constraint_elem", "interface_type_name"]
                    .iter()
                    .flat_map(|kind| children_by_kind(&ty, kind))
                    .map(|elem| strip_type_arguments(self.text(&elem)))
                    .collect();
                if !embedded.is_empty() {
                    ast.set_meta(keys::EXTENDS, embedded);
                }
            }
            (_, Some(ty)) => ast.set_meta(keys::VALUE, self.text(&ty)),
            _ => {}
        }

        self.export(&name, export_kind, &anchor);
        ast
    }

    /// Struct fields declared by type alone.
    fn embedded_fields(&self, struct_type: &Node) -> Vec<String> {
        let Some(fields) = child_by_kind(struct_type, "field_declaration_list") else {
            return Vec::new();
        };
        children_by_kind(&fields, "field_declaration")
            .into_iter()
            .filter(|field| field.child_by_field_name("name").is_none())
            .filter_map(|field| field.child_by_field_name("type"))
            .map(|ty| strip_type_arguments(self.text(&ty).trim_start_matches('*')))
            .collect()
    }

    fn package_values(&mut self, node: Node) -> Vec<AstNode> {
        let constant = node.kind() == "const_declaration";
        let spec_kind = if constant { "const_spec" } else { "var_spec" };
        let mut specs = children_by_kind(&node, spec_kind);
        if let Some(list) = child_by_kind(&node, "var_spec_list") {
            specs.extend(children_by_kind(&list, spec_kind));
        }

        let mut out = Vec::new();
        let single = specs.len() == 1;
        for spec in specs {
            let mut cursor = spec.walk();
            let names: Vec<Node> = spec.children_by_field_name("name", &mut cursor).collect();
            let value = spec.child_by_field_name("value");
            let anchor = if single && names.len() == 1 { node } else { spec };

            for name_node in names {
                let name = self.text(&name_node).to_string();
                let mut ast = AstNode::named(AstNodeType::Variable, name.clone(), self.location(&anchor))
                    .with_meta(keys::EXPORTED, is_exported(&name))
                    .with_meta("const", constant);
                if let Some(value) = value {
                    ast.set_meta(keys::VALUE, self.text(&value));
                }
                self.export(&name, "variable", &anchor);
                out.push(ast);
            }
            if let Some(value) = value {
                out.extend(self.collect(value));
            }
        }
        out
    }

    fn call(&mut self, node: Node) -> Vec<AstNode> {
        let Some(function) = node.child_by_field_name("function") else {
            return Vec::new();
        };
        let mut out = Vec::new();

        let callee = match function.kind() {
            "identifier" => Some(self.text(&function).to_string()),
            "selector_expression" => {
                out.extend(self.collect_field(&function, "operand"));
                function
                    .child_by_field_name("field")
                    .map(|f| self.text(&f).to_string())
            }
            _ => {
                out.extend(self.collect(function));
                None
            }
        };
        if let Some(callee) = callee.filter(|c| !BUILTINS.contains(&c.as_str())) {
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
}

fn is_exported(name: &str) -> bool {
    name.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
}

fn is_package_level(node: &Node) -> bool {
    node.parent()
        .map(|p| p.kind() == "source_file")
        .unwrap_or(false)
}

/// Nothing but comments between the braces, looking through statement lists.
fn is_empty_block(block: &Node) -> bool {
    let mut cursor = block.walk();
    let empty = block.named_children(&mut cursor).all(|child| match child.kind() {
        "comment" => true,
        "statement_list" => is_empty_block(&child),
        _ => false,
    });
    empty
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"package server

import (
	"context"
	log "github.com/sirupsen/logrus"
)

import "fmt"

const MaxConns = 10

type Handler interface {
	Serve(ctx context.Context) error
}

type Server struct {
	Base
	addr string
}

type ID string

func NewServer(addr string) *Server {
	return &Server{addr: addr}
}

func (s *Server) Start(ctx context.Context, a, b int) error {
	fmt.Println("starting {")
	s.listen()
	go func() { s.listen() }()
	return nil
}

func (s *Server) listen() {
}
"#;

    fn parse() -> AstFile {
        GoParser.parse("server/server.go", SOURCE, Language::Go).unwrap()
    }

    #[test]
    fn import_forms() {
        let file = parse();
        let sources: Vec<_> = file.imports.iter().map(|i| i.source.as_str()).collect();
        assert_eq!(sources, vec!["context", "github.com/sirupsen/logrus", "fmt"]);
        assert_eq!(file.imports[0].specifiers, vec!["context"]);
        assert_eq!(file.imports[1].specifiers, vec!["log"]);
        assert_eq!(file.imports[1].line, 5);
        assert!(!file.imports[0].is_relative);
        assert_eq!(file.root.meta("package").and_then(|v| v.as_str()), Some("server"));
    }

    #[test]
    fn types_and_methods() {
        let file = parse();
        let server = &file.root.find_all(AstNodeType::Class)[0];
        assert_eq!(server.name.as_deref(), Some("Server"));
        assert_eq!(
            server.meta("embeds").and_then(|v| v.as_list()),
            Some(&["Base".to_string()][..])
        );
        assert_eq!(file.root.find_all(AstNodeType::Interface).len(), 1);
        let id = &file.root.find_all(AstNodeType::Type)[0];
        assert_eq!(id.meta(keys::VALUE).and_then(|v| v.as_str()), Some("string"));

        let functions = file.functions();
        let names: Vec<_> = functions.iter().filter_map(|f| f.name.as_deref()).collect();
        assert_eq!(names, vec!["NewServer", "Start", "listen"]);

        let start = functions[1];
        assert!(start.is_method());
        assert_eq!(start.receiver(), Some("Server"));
        assert_eq!(start.parameters(), &["ctx".to_string(), "a".to_string(), "b".to_string()]);
        assert!(start.is_exported());
        assert_eq!(start.location.end_line, 32);
        assert_eq!(start.meta("spawnsGoroutine").and_then(|v| v.as_bool()), Some(true));

        let listen = functions[2];
        assert!(!listen.is_exported());
        assert_eq!(listen.meta(keys::BODY_EMPTY).and_then(|v| v.as_bool()), Some(true));

        let exported: Vec<_> = file.exports.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(exported, vec!["MaxConns", "Handler", "Server", "ID", "NewServer", "Start"]);
    }

    #[test]
    fn calls_are_attributed_to_enclosing_function() {
        let file = parse();
        let start = file.functions()[1].clone();
        let callees: Vec<_> = start.iter().filter_map(|c| c.callee()).collect();
        assert_eq!(callees, vec!["Println", "listen", "listen"]);
        assert!(start
            .iter()
            .filter(|n| n.node_type == AstNodeType::Call)
            .all(|c| c.caller() == Some("Start")));

        let constructor = file.functions()[0].clone();
        assert!(constructor.iter().all(|n| n.node_type != AstNodeType::Call));
    }

    #[test]
    fn one_line_functions() {
        let file = GoParser
            .parse("a.go", "package a; func f() { g(len(x)) }; func g(n int) {}\n", Language::Go)
            .unwrap();
        let names: Vec<_> = file.functions().iter().filter_map(|f| f.name.clone()).collect();
        assert_eq!(names, vec!["f", "g"]);
        let calls: Vec<_> = file.functions()[0].iter().filter_map(|n| n.callee()).collect();
        assert_eq!(calls, vec!["g"]);
    }
}
