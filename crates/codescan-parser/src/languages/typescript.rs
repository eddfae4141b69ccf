use super::extractor_utils::{
    annotate_members, child_by_kind, children_by_kind, contains_kind_in_scope, has_child_kind,
    location_for, module_root, named_code_children, node_text, parse_tree, strip_type_arguments,
    unquote,
};
use crate::error::Result;
use crate::parser::SourceParser;
use codescan_core::{
    content_hash, keys, AstFile, AstNode, AstNodeType, ExportInfo, ImportInfo, Language,
    Location, ParseFidelity,
};
use std::path::Path;
use tree_sitter::{Node, TreeCursor};

/// Node kinds that open a new function scope.
const FUNCTION_SCOPES: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "function_expression",
    "function",
    "generator_function",
    "arrow_function",
    "method_definition",
];

/// Full-fidelity parser for the TypeScript/JavaScript family backed by tree-sitter.
#[derive(Debug, Default, Clone, Copy)]
pub struct TypeScriptParser;

impl TypeScriptParser {
    fn grammar(file_path: &str, language: Language) -> tree_sitter::Language {
        let extension = Path::new(file_path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        match (language, extension) {
            (_, "tsx") => tree_sitter_typescript::LANGUAGE_TSX.into(),
            // jsx needs no TSX grammar: the javascript grammar accepts JSX
            (Language::JavaScript, _) => tree_sitter_javascript::LANGUAGE.into(),
            _ => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        }
    }
}

impl SourceParser for TypeScriptParser {
    fn languages(&self) -> &[Language] {
        &[Language::TypeScript, Language::JavaScript]
    }

    fn fidelity(&self) -> ParseFidelity {
        ParseFidelity::Full
    }

    fn parse(&self, file_path: &str, content: &str, language: Language) -> Result<AstFile> {
        let tree = parse_tree(Self::grammar(file_path, language), file_path, content, language)?;
        let program = tree.root_node();

        let mut collector = TypeScriptCollector::new(content, file_path);
        let mut cursor = tree.walk();
        let children = collector.walk_children(&mut cursor);

        let mut root = module_root(&program, file_path);
        root.children = children;
        annotate_members(&mut root, None, None);

        Ok(AstFile::new(
            file_path,
            language,
            root,
            collector.imports,
            collector.exports,
            content_hash(content),
            ParseFidelity::Full,
        ))
    }
}

/// Builds the normalized tree while walking the concrete syntax tree. Nodes with no
/// normalized counterpart are transparent: their mapped descendants are hoisted.
struct TypeScriptCollector<'a> {
    content: &'a str,
    file_path: &'a str,
    imports: Vec<ImportInfo>,
    exports: Vec<ExportInfo>,
}

impl<'a> TypeScriptCollector<'a> {
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

    fn line(node: &Node) -> u32 {
        node.start_position().row as u32 + 1
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
            "function_declaration" | "generator_function_declaration" | "method_definition" => {
                let name = node
                    .child_by_field_name("name")
                    .map(|n| self.text(&n).to_string())
                    .unwrap_or_else(|| "<anonymous>".to_string());
                vec![self.function(node, node, name, false)]
            }

            "class_declaration" | "abstract_class_declaration" | "class" => {
                vec![self.class(node, false)]
            }

            "interface_declaration" => vec![self.interface(node, false)],

            "type_alias_declaration" | "enum_declaration" => {
                vec![self.type_like(node, false)]
            }

            "lexical_declaration" | "variable_declaration" => self.declaration(node, false),

            "public_field_definition" | "field_definition" => self.field(node),

            "import_statement" => self.import(node).into_iter().collect(),

            "export_statement" => self.export(node),

            "call_expression" => self.call(node),

            _ => self.walk_children(cursor),
        }
    }

    fn function(&mut self, node: Node, func: Node, name: String, exported: bool) -> AstNode {
        let params = self.parameter_names(&func);
        let body = func.child_by_field_name("body");
        let body_empty = body
            .map(|b| b.kind() == "statement_block" && named_code_children(&b) == 0)
            .unwrap_or(false);
        let has_await = body
            .map(|b| {
                b.kind() == "await_expression"
                    || contains_kind_in_scope(&b, "await_expression", FUNCTION_SCOPES)
            })
            .unwrap_or(false);

        let mut ast = AstNode::named(AstNodeType::Function, name, self.location(&node))
            .with_meta(keys::ASYNC, has_child_kind(&func, "async"))
            .with_meta(keys::EXPORTED, exported)
            .with_meta(keys::PARAM_COUNT, params.len())
            .with_meta(keys::PARAMETERS, params)
            .with_meta(keys::HAS_AWAIT, has_await)
            .with_meta(keys::BODY_EMPTY, body_empty);

        if func.kind() == "method_definition" {
            ast.set_meta(keys::STATIC, has_child_kind(&func, "static"));
            let visibility = child_by_kind(&func, "accessibility_modifier")
                .map(|m| self.text(&m).to_string())
                .unwrap_or_else(|| "public".to_string());
            ast.set_meta(keys::VISIBILITY, visibility);
            if has_child_kind(&func, "get") {
                ast.set_meta("accessor", "get");
            } else if has_child_kind(&func, "set") {
                ast.set_meta("accessor", "set");
            }
        }
        if func.kind() == "arrow_function" {
            ast.set_meta("arrow", true);
        }
        let decorators = self.decorators(&func);
        if !decorators.is_empty() {
            ast.set_meta(keys::DECORATORS, decorators);
        }

        if let Some(body) = body {
            ast.children = self.collect(body);
        }
        ast
    }

    fn parameter_names(&self, func: &Node) -> Vec<String> {
        if let Some(single) = func.child_by_field_name("parameter") {
            return vec![self.text(&single).to_string()];
        }
        let Some(params) = func.child_by_field_name("parameters") else {
            return Vec::new();
        };
        let mut names = Vec::new();
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            let target = match param.kind() {
                "required_parameter" | "optional_parameter" => param.child_by_field_name("pattern"),
                "assignment_pattern" => param.child_by_field_name("left"),
                "rest_pattern" => param.named_child(0),
                "comment" | "decorator" => None,
                _ => Some(param),
            };
            if let Some(target) = target {
                let text = self.text(&target).trim_start_matches("...").to_string();
                if text != "this" {
                    names.push(text);
                }
            }
        }
        names
    }

    fn decorators(&self, node: &Node) -> Vec<String> {
        let mut found: Vec<String> = children_by_kind(node, "decorator")
            .iter()
            .map(|d| self.text(d).trim_start_matches('@').to_string())
            .collect();
        // class members carry their decorators as preceding siblings in some grammar versions
        let mut prev = node.prev_named_sibling();
        while let Some(sibling) = prev {
            if sibling.kind() != "decorator" {
                break;
            }
            found.insert(0, self.text(&sibling).trim_start_matches('@').to_string());
            prev = sibling.prev_named_sibling();
        }
        found
    }

    fn name_of(&self, node: &Node) -> String {
        node.child_by_field_name("name")
            .map(|n| self.text(&n).to_string())
            .unwrap_or_else(|| "<anonymous>".to_string())
    }

    fn class(&mut self, node: Node, exported: bool) -> AstNode {
        let mut ast = AstNode::named(AstNodeType::Class, self.name_of(&node), self.location(&node))
            .with_meta(keys::EXPORTED, exported)
            .with_meta("abstract", node.kind() == "abstract_class_declaration");

        if let Some(heritage) = child_by_kind(&node, "class_heritage") {
            let mut extends = Vec::new();
            let mut implements = Vec::new();
            let mut cursor = heritage.walk();
            for clause in heritage.named_children(&mut cursor) {
                match clause.kind() {
                    "extends_clause" => {
                        if let Some(value) = clause.child_by_field_name("value") {
                            extends.push(self.text(&value).to_string());
                        }
                    }
                    "implements_clause" => {
                        let mut inner = clause.walk();
                        for ty in clause.named_children(&mut inner) {
                            implements.push(strip_type_arguments(self.text(&ty)));
                        }
                    }
                    // javascript: class_heritage holds the superclass expression directly
                    _ => extends.push(self.text(&clause).to_string()),
                }
            }
            if !extends.is_empty() {
                ast.set_meta(keys::EXTENDS, extends);
            }
            if !implements.is_empty() {
                ast.set_meta(keys::IMPLEMENTS, implements);
            }
        }

        let decorators = self.decorators(&node);
        if !decorators.is_empty() {
            ast.set_meta(keys::DECORATORS, decorators);
        }
        ast.children = self.collect_field(&node, "body");
        ast
    }

    fn interface(&mut self, node: Node, exported: bool) -> AstNode {
        let mut ast =
            AstNode::named(AstNodeType::Interface, self.name_of(&node), self.location(&node))
                .with_meta(keys::EXPORTED, exported);
        if let Some(clause) = child_by_kind(&node, "extends_type_clause") {
            let mut cursor = clause.walk();
            let extends: Vec<String> = clause
                .named_children(&mut cursor)
                .map(|ty| strip_type_arguments(self.text(&ty)))
                .collect();
            if !extends.is_empty() {
                ast.set_meta(keys::EXTENDS, extends);
            }
        }
        ast
    }

    fn type_like(&mut self, node: Node, exported: bool) -> AstNode {
        let node_type = if node.kind() == "enum_declaration" {
            AstNodeType::Enum
        } else {
            AstNodeType::Type
        };
        let mut ast = AstNode::named(node_type, self.name_of(&node), self.location(&node))
            .with_meta(keys::EXPORTED, exported);
        if let Some(value) = node.child_by_field_name("value") {
            ast.set_meta(keys::VALUE, self.text(&value).to_string());
        }
        ast
    }

    /// `const f = () => {}` becomes a function; other module-level declarators become variables.
    fn declaration(&mut self, node: Node, exported: bool) -> Vec<AstNode> {
        let module_level = is_module_level(&node);
        let declarators = children_by_kind(&node, "variable_declarator");
        let single = declarators.len() == 1;
        let mut out = Vec::new();

        for declarator in declarators {
            let name = self.name_of(&declarator);
            let value = declarator.child_by_field_name("value");

            match value {
                Some(v) if is_function_value(&v) => {
                    let anchor = if single { node } else { declarator };
                    out.push(self.function(anchor, v, name, exported));
                }
                _ if module_level => {
                    let mut ast =
                        AstNode::named(AstNodeType::Variable, name, self.location(&declarator))
                            .with_meta(keys::EXPORTED, exported)
                            .with_meta("const", has_child_kind(&node, "const"));
                    if let Some(v) = value {
                        ast.set_meta(keys::VALUE, self.text(&v).to_string());
                        out.push(ast);
                        out.extend(self.collect(v));
                    } else {
                        out.push(ast);
                    }
                }
                Some(v) => out.extend(self.collect(v)),
                None => {}
            }
        }
        out
    }

    /// Class properties initialized with an arrow function are methods.
    fn field(&mut self, node: Node) -> Vec<AstNode> {
        match node.child_by_field_name("value") {
            Some(v) if is_function_value(&v) => {
                let name = node
                    .child_by_field_name("name")
                    .or_else(|| node.child_by_field_name("property"))
                    .map(|n| self.text(&n).to_string())
                    .unwrap_or_else(|| "<anonymous>".to_string());
                let mut ast = self.function(node, v, name, false);
                ast.set_meta(keys::STATIC, has_child_kind(&node, "static"));
                let visibility = child_by_kind(&node, "accessibility_modifier")
                    .map(|m| self.text(&m).to_string())
                    .unwrap_or_else(|| "public".to_string());
                ast.set_meta(keys::VISIBILITY, visibility);
                vec![ast]
            }
            Some(v) => self.collect(v),
            None => Vec::new(),
        }
    }

    fn import(&mut self, node: Node) -> Option<AstNode> {
        let source = unquote(self.text(&node.child_by_field_name("source")?));
        let mut specifiers = Vec::new();
        let mut default = None;

        if let Some(clause) = child_by_kind(&node, "import_clause") {
            let mut cursor = clause.walk();
            for part in clause.named_children(&mut cursor) {
                match part.kind() {
                    "identifier" => {
                        let name = self.text(&part).to_string();
                        default = Some(name.clone());
                        specifiers.push(name);
                    }
                    "namespace_import" => {
                        if let Some(id) = child_by_kind(&part, "identifier") {
                            specifiers.push(self.text(&id).to_string());
                        }
                    }
                    "named_imports" => {
                        for spec in children_by_kind(&part, "import_specifier") {
                            let local = spec
                                .child_by_field_name("alias")
                                .or_else(|| spec.child_by_field_name("name"));
                            if let Some(local) = local {
                                specifiers.push(self.text(&local).to_string());
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        self.imports
            .push(ImportInfo::new(source.clone(), Self::line(&node)).with_specifiers(specifiers.clone()));
        let mut ast = AstNode::named(AstNodeType::Import, source.clone(), self.location(&node))
            .with_meta(keys::SOURCE, source)
            .with_meta(keys::SPECIFIERS, specifiers);
        if let Some(default) = default {
            ast.set_meta(keys::DEFAULT, default);
        }
        Some(ast)
    }

    fn export(&mut self, node: Node) -> Vec<AstNode> {
        let line = Self::line(&node);
        let is_default = has_child_kind(&node, "default");
        let mut out = Vec::new();

        if let Some(decl) = node.child_by_field_name("declaration") {
            out = match decl.kind() {
                "function_declaration" | "generator_function_declaration" => {
                    let name = self.name_of(&decl);
                    vec![self.function(decl, decl, name, true)]
                }
                "class_declaration" | "abstract_class_declaration" | "class" => {
                    vec![self.class(decl, true)]
                }
                "interface_declaration" => vec![self.interface(decl, true)],
                "type_alias_declaration" | "enum_declaration" => vec![self.type_like(decl, true)],
                "lexical_declaration" | "variable_declaration" => self.declaration(decl, true),
                _ => self.collect(decl),
            };
            for ast in &out {
                if matches!(ast.node_type, AstNodeType::Call | AstNodeType::Import) {
                    continue;
                }
                let name = if is_default {
                    "default".to_string()
                } else {
                    ast.name.clone().unwrap_or_default()
                };
                self.exports.push(ExportInfo {
                    name,
                    kind: ast.node_type.as_str().to_string(),
                    is_default,
                    line,
                });
            }
            return out;
        }

        if let Some(value) = node.child_by_field_name("value") {
            if is_function_value(&value) {
                let name = value
                    .child_by_field_name("name")
                    .map(|n| self.text(&n).to_string())
                    .unwrap_or_else(|| "default".to_string());
                out.push(self.function(node, value, name, true));
            } else {
                out.extend(self.collect(value));
            }
            let kind = if is_function_value(&value) {
                "function"
            } else {
                "expression"
            };
            self.exports.push(ExportInfo {
                name: "default".to_string(),
                kind: kind.to_string(),
                is_default: true,
                line,
            });
            return out;
        }

        let source = node
            .child_by_field_name("source")
            .map(|s| unquote(self.text(&s)));
        let mut names = Vec::new();
        if let Some(clause) = child_by_kind(&node, "export_clause") {
            for spec in children_by_kind(&clause, "export_specifier") {
                let Some(local) = spec.child_by_field_name("name") else {
                    continue;
                };
                let exported_as = spec.child_by_field_name("alias").unwrap_or(local);
                names.push(self.text(&local).to_string());
                let name = self.text(&exported_as).to_string();
                self.exports.push(ExportInfo {
                    is_default: name == "default",
                    name,
                    kind: if source.is_some() { "reexport" } else { "binding" }.to_string(),
                    line,
                });
            }
        } else if source.is_some() {
            names.push("*".to_string());
            self.exports.push(ExportInfo {
                name: "*".to_string(),
                kind: "reexport".to_string(),
                is_default: false,
                line,
            });
        }

        if let Some(source) = source {
            self.imports
                .push(ImportInfo::new(source.clone(), line).with_specifiers(names.clone()));
            out.push(
                AstNode::named(AstNodeType::Export, source.clone(), self.location(&node))
                    .with_meta(keys::SOURCE, source)
                    .with_meta(keys::SPECIFIERS, names),
            );
        }
        out
    }

    /// Calls, with `import()` and `require()` recorded as imports instead.
    fn call(&mut self, node: Node) -> Vec<AstNode> {
        let Some(function) = node.child_by_field_name("function") else {
            return Vec::new();
        };
        let mut out = Vec::new();

        let first_string_arg = node
            .child_by_field_name("arguments")
            .and_then(|args| args.named_child(0))
            .filter(|arg| arg.kind() == "string" || arg.kind() == "template_string")
            .map(|arg| unquote(self.text(&arg)));

        match (function.kind(), self.text(&function)) {
            ("import", _) => {
                if let Some(source) = first_string_arg {
                    self.imports
                        .push(ImportInfo::new(source, Self::line(&node)).dynamic());
                }
                return out;
            }
            ("identifier", "require") => {
                if let Some(source) = first_string_arg {
                    self.imports.push(ImportInfo::new(source, Self::line(&node)));
                    return out;
                }
            }
            _ => {}
        }

        out.extend(self.collect(function));

        let callee = match function.kind() {
            "member_expression" => function
                .child_by_field_name("property")
                .map(|p| self.text(&p).to_string()),
            "identifier" => Some(self.text(&function).to_string()),
            _ => None,
        };
        if let Some(callee) = callee {
            let callee_text: String = self
                .text(&function)
                .split_whitespace()
                .collect::<Vec<_>>()
                .join("");
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

fn is_function_value(node: &Node) -> bool {
    matches!(
        node.kind(),
        "arrow_function" | "function_expression" | "function" | "generator_function"
    )
}

fn is_module_level(node: &Node) -> bool {
    match node.parent() {
        Some(parent) if parent.kind() == "program" => true,
        Some(parent) if parent.kind() == "export_statement" => parent
            .parent()
            .map(|p| p.kind() == "program")
            .unwrap_or(false),
        _ => false,
    }
}
