// ABOUTME: Java parser backed by the tree-sitter Java grammar.
// ABOUTME: Extracts package, imports, types with heritage, methods, constructors, fields and calls.
use super::extractor_utils::{
    annotate_members, child_by_kind, children_by_kind, has_child_kind, location_for, module_root,
    named_code_children, node_text, parse_tree, strip_type_arguments,
};
use crate::error::Result;
use crate::parser::SourceParser;
use codescan_core::{
    content_hash, keys, AstFile, AstNode, AstNodeType, ExportInfo, ImportInfo, Language,
    Location, ParseFidelity,
};
use tree_sitter::{Node, TreeCursor};

#[derive(Debug, Default, Clone, Copy)]
pub struct JavaParser;

impl SourceParser for JavaParser {
    fn languages(&self) -> &[Language] {
        &[Language::Java]
    }

    fn fidelity(&self) -> ParseFidelity {
        ParseFidelity::Full
    }

    fn parse(&self, file_path: &str, content: &str, language: Language) -> Result<AstFile> {
        let tree = parse_tree(tree_sitter_java::LANGUAGE.into(), file_path, content, language)?;
        let program = tree.root_node();

        let mut collector = JavaCollector::new(content, file_path);
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
            Language::Java,
            root,
            collector.imports,
            collector.exports,
            content_hash(content),
            ParseFidelity::Full,
        ))
    }
}

#[derive(Default)]
struct Modifiers {
    words: Vec<String>,
    annotations: Vec<String>,
}

impl Modifiers {
    fn has(&self, word: &str) -> bool {
        self.words.iter().any(|w| w == word)
    }

    fn visibility(&self, default: &'static str) -> &'static str {
        ["public", "protected", "private"]
            .into_iter()
            .find(|v| self.has(v))
            .unwrap_or(default)
    }
}

struct JavaCollector<'a> {
    content: &'a str,
    file_path: &'a str,
    package: Option<String>,
    imports: Vec<ImportInfo>,
    exports: Vec<ExportInfo>,
    /// Kinds of the enclosing type declarations, innermost last.
    types: Vec<&'static str>,
}

impl<'a> JavaCollector<'a> {
    fn new(content: &'a str, file_path: &'a str) -> Self {
        Self {
            content,
            file_path,
            package: None,
            imports: Vec::new(),
            exports: Vec::new(),
            types: Vec::new(),
        }
    }

    fn text(&self, node: &Node) -> &'a str {
        node_text(node, self.content)
    }

    fn location(&self, node: &Node) -> Location {
        location_for(node, self.file_path)
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
            "package_declaration" => {
                self.package = name_child(&node).map(|n| self.text(&n).to_string());
                Vec::new()
            }

            "import_declaration" => self.import(node).into_iter().collect(),

            "class_declaration" | "record_declaration" => {
                vec![self.type_declaration(node, AstNodeType::Class, "class")]
            }
            "interface_declaration" => {
                vec![self.type_declaration(node, AstNodeType::Interface, "interface")]
            }
            "annotation_type_declaration" => {
                vec![self.type_declaration(node, AstNodeType::Interface, "annotation")]
            }
            "enum_declaration" => vec![self.type_declaration(node, AstNodeType::Enum, "enum")],

            "method_declaration" | "constructor_declaration" | "compact_constructor_declaration" => {
                vec![self.method(node)]
            }

            "field_declaration" | "constant_declaration" => self.field(node),

            "method_invocation" => self.invocation(node),

            "object_creation_expression" => self.creation(node),

            _ => self.walk_children(cursor),
        }
    }

    fn modifiers(&self, node: &Node) -> Modifiers {
        let mut modifiers = Modifiers::default();
        let Some(list) = child_by_kind(node, "modifiers") else {
            return modifiers;
        };
        let mut cursor = list.walk();
        for child in list.children(&mut cursor) {
            match child.kind() {
                "marker_annotation" | "annotation" => {
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| self.text(&n).to_string())
                        .unwrap_or_else(|| self.text(&child).trim_start_matches('@').to_string());
                    modifiers.annotations.push(name);
                }
                _ => modifiers.words.push(self.text(&child).to_string()),
            }
        }
        modifiers
    }

    fn in_interface(&self) -> bool {
        matches!(self.types.last(), Some(&"interface") | Some(&"annotation"))
    }

    fn type_list(&self, node: &Node) -> Vec<String> {
        let list = if node.kind() == "type_list" {
            Some(*node)
        } else {
            child_by_kind(node, "type_list")
        };
        let Some(list) = list else {
            return Vec::new();
        };
        let mut cursor = list.walk();
        list.named_children(&mut cursor)
            .map(|ty| strip_type_arguments(self.text(&ty)))
            .collect()
    }

    fn type_declaration(&mut self, node: Node, node_type: AstNodeType, kind: &'static str) -> AstNode {
        let name = self.name_of(&node);
        let modifiers = self.modifiers(&node);
        let nested = !self.types.is_empty();
        let default = if self.in_interface() { "public" } else { "package" };
        let visibility = modifiers.visibility(default);
        let exported = visibility == "public" && !nested;

        let mut ast = AstNode::named(node_type, name.clone(), self.location(&node))
            .with_meta(keys::VISIBILITY, visibility)
            .with_meta(keys::EXPORTED, exported)
            .with_meta(keys::STATIC, modifiers.has("static"))
            .with_meta("abstract", modifiers.has("abstract"));
        if let Some(package) = &self.package {
            ast.set_meta("package", package.as_str());
        }

        let superclass = node
            .child_by_field_name("superclass")
            .and_then(|s| s.named_child(0))
            .map(|ty| vec![strip_type_arguments(self.text(&ty))]);
        let extended_interfaces = child_by_kind(&node, "extends_interfaces")
            .map(|clause| self.type_list(&clause))
            .filter(|list| !list.is_empty());
        if let Some(extends) = superclass.or(extended_interfaces) {
            ast.set_meta(keys::EXTENDS, extends);
        }
        let implements = node
            .child_by_field_name("interfaces")
            .map(|clause| self.type_list(&clause))
            .unwrap_or_default();
        if !implements.is_empty() {
            ast.set_meta(keys::IMPLEMENTS, implements);
        }
        if !modifiers.annotations.is_empty() {
            ast.set_meta(keys::DECORATORS, modifiers.annotations);
        }

        if exported {
            self.exports.push(ExportInfo {
                name,
                kind: kind.to_string(),
                is_default: false,
                line: node.start_position().row as u32 + 1,
            });
        }

        self.types.push(kind);
        ast.children = self.collect_field(&node, "body");
        self.types.pop();
        ast
    }

    fn method(&mut self, node: Node) -> AstNode {
        let modifiers = self.modifiers(&node);
        let default = if self.in_interface() { "public" } else { "package" };
        let visibility = modifiers.visibility(default);
        let params = self.parameter_names(&node);
        let body = node.child_by_field_name("body");
        let constructor = node.kind() != "method_declaration";

        let mut ast = AstNode::named(AstNodeType::Function, self.name_of(&node), self.location(&node))
            .with_meta(keys::VISIBILITY, visibility)
            .with_meta(keys::EXPORTED, visibility == "public")
            .with_meta(keys::STATIC, modifiers.has("static"))
            .with_meta(keys::ASYNC, false)
            .with_meta(keys::PARAM_COUNT, params.len())
            .with_meta(keys::PARAMETERS, params)
            .with_meta(keys::BODY_EMPTY, body.map(|b| named_code_children(&b) == 0).unwrap_or(false))
            .with_meta("abstract", body.is_none())
            .with_meta("constructor", constructor);
        if !constructor {
            if let Some(return_type) = node.child_by_field_name("type") {
                ast.set_meta("returnType", self.text(&return_type));
            }
        }
        if !modifiers.annotations.is_empty() {
            ast.set_meta(keys::DECORATORS, modifiers.annotations);
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
            .filter_map(|param| match param.kind() {
                "formal_parameter" => param.child_by_field_name("name"),
                "spread_parameter" => child_by_kind(&param, "variable_declarator")
                    .and_then(|d| d.child_by_field_name("name"))
                    .or_else(|| children_by_kind(&param, "identifier").pop()),
                _ => None,
            })
            .map(|name| self.text(&name).to_string())
            .collect()
    }

    fn field(&mut self, node: Node) -> Vec<AstNode> {
        let modifiers = self.modifiers(&node);
        let interface_constant = node.kind() == "constant_declaration" || self.in_interface();
        let visibility = modifiers.visibility(if interface_constant { "public" } else { "package" });
        let field_type = node
            .child_by_field_name("type")
            .map(|t| self.text(&t).to_string())
            .unwrap_or_default();
        let declarators = children_by_kind(&node, "variable_declarator");
        let single = declarators.len() == 1;

        let mut out = Vec::new();
        for declarator in declarators {
            let anchor = if single { node } else { declarator };
            let mut ast = AstNode::named(AstNodeType::Variable, self.name_of(&declarator), self.location(&anchor))
                .with_meta(keys::VISIBILITY, visibility)
                .with_meta(keys::STATIC, interface_constant || modifiers.has("static"))
                .with_meta("final", interface_constant || modifiers.has("final"))
                .with_meta("fieldType", field_type.as_str());
            match declarator.child_by_field_name("value") {
                Some(value) => {
                    ast.set_meta(keys::VALUE, self.text(&value));
                    out.push(ast);
                    out.extend(self.collect(value));
                }
                None => out.push(ast),
            }
        }
        out
    }

    fn import(&mut self, node: Node) -> Option<AstNode> {
        let path = self.text(&name_child(&node)?).to_string();
        let wildcard = has_child_kind(&node, "asterisk");
        let (source, specifier) = if wildcard {
            (format!("{}.*", path), "*".to_string())
        } else {
            let last = path.rsplit('.').next().unwrap_or(&path).to_string();
            (path, last)
        };
        let line = node.start_position().row as u32 + 1;

        self.imports
            .push(ImportInfo::new(source.clone(), line).with_specifiers(vec![specifier.clone()]));
        let mut ast = AstNode::named(AstNodeType::Import, source.clone(), self.location(&node))
            .with_meta(keys::SOURCE, source)
            .with_meta(keys::SPECIFIERS, vec![specifier]);
        if has_child_kind(&node, "static") {
            ast.set_meta(keys::STATIC, true);
        }
        Some(ast)
    }

    /// `a.b().c(x)` yields `b` then `c`, followed by calls in the arguments.
    fn invocation(&mut self, node: Node) -> Vec<AstNode> {
        let mut out = self.collect_field(&node, "object");
        let Some(name) = node.child_by_field_name("name") else {
            return out;
        };
        let callee = self.text(&name).to_string();
        let callee_text: String = self
            .content
            .get(node.start_byte()..name.end_byte())
            .unwrap_or_default()
            .split_whitespace()
            .collect();
        out.push(
            AstNode::named(AstNodeType::Call, callee.clone(), self.location(&node))
                .with_meta(keys::CALLEE, callee)
                .with_meta("calleeText", callee_text),
        );
        out.extend(self.collect_field(&node, "arguments"));
        out
    }

    /// `new Foo(..)` calls the `Foo` constructor.
    fn creation(&mut self, node: Node) -> Vec<AstNode> {
        let mut out = Vec::new();
        if let Some(ty) = node.child_by_field_name("type") {
            let type_name = strip_type_arguments(self.text(&ty));
            let callee = type_name.rsplit('.').next().unwrap_or(&type_name).to_string();
            out.push(
                AstNode::named(AstNodeType::Call, callee.clone(), self.location(&node))
                    .with_meta(keys::CALLEE, callee)
                    .with_meta("calleeText", format!("new {}", type_name))
                    .with_meta("constructor", true),
            );
        }
        out.extend(self.collect_field(&node, "arguments"));
        if let Some(body) = child_by_kind(&node, "class_body") {
            out.extend(self.collect(body));
        }
        out
    }

    fn name_of(&self, node: &Node) -> String {
        node.child_by_field_name("name")
            .map(|n| self.text(&n).to_string())
            .unwrap_or_else(|| "<anonymous>".to_string())
    }
}

/// The dotted name of a package or import declaration.
fn name_child<'t>(node: &Node<'t>) -> Option<Node<'t>> {
    child_by_kind(node, "scoped_identifier").or_else(|| child_by_kind(node, "identifier"))
}
