// ABOUTME: Shared utilities for the tree-sitter backed extractors
// ABOUTME: Provides grammar loading, node text, location and child lookup helpers

use crate::error::{ParseError, Result};
use codescan_core::{keys, AstNode, AstNodeType, Language, Location};
use std::path::Path;
use tree_sitter::{Node, Parser, Tree};

/// Parses `content` with `grammar`. Syntax errors stay inside the tree; only a
/// grammar that will not load or a parser that gives up is an error.
pub fn parse_tree(
    grammar: tree_sitter::Language,
    file_path: &str,
    content: &str,
    language: Language,
) -> Result<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|e| ParseError::Grammar {
            language,
            message: e.to_string(),
        })?;
    parser
        .parse(content, None)
        .ok_or_else(|| ParseError::NoTree(file_path.to_string()))
}

/// Module node spanning the program, named after the file stem.
pub fn module_root(program: &Node, file_path: &str) -> AstNode {
    let name = Path::new(file_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_path)
        .to_string();
    let mut root = AstNode::named(AstNodeType::Module, name, location_for(program, file_path));
    if program.has_error() {
        root.set_meta("syntaxErrors", true);
    }
    root
}

/// Extract text from a tree-sitter Node
#[inline]
pub fn node_text<'a>(node: &Node, content: &'a str) -> &'a str {
    node.utf8_text(content.as_bytes()).unwrap_or("")
}

/// Create a 1-indexed Location from a tree-sitter Node
#[inline]
pub fn location_for(node: &Node, file_path: &str) -> Location {
    Location {
        file_path: file_path.to_string(),
        start_line: (node.start_position().row + 1) as u32,
        start_column: (node.start_position().column + 1) as u32,
        end_line: (node.end_position().row + 1) as u32,
        end_column: (node.end_position().column + 1) as u32,
    }
}

/// Find first child of a specific kind
pub fn child_by_kind<'a>(node: &Node<'a>, kind: &str) -> Option<Node<'a>> {
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            if child.kind() == kind {
                return Some(child);
            }
        }
    }
    None
}

/// Find all children of a specific kind
pub fn children_by_kind<'a>(node: &Node<'a>, kind: &str) -> Vec<Node<'a>> {
    let mut result = Vec::new();
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            if child.kind() == kind {
                result.push(child);
            }
        }
    }
    result
}

/// Get text of a child by field name
pub fn child_text_by_field(node: &Node, field_name: &str, content: &str) -> Option<String> {
    node.child_by_field_name(field_name)
        .map(|child| node_text(&child, content).to_string())
}

/// True when any direct child (named or anonymous) has the given kind
pub fn has_child_kind(node: &Node, kind: &str) -> bool {
    child_by_kind(node, kind).is_some()
}

/// Strips the quotes of a string literal node's text.
pub fn unquote(text: &str) -> String {
    text.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}

/// Depth-first search for a descendant of `kind`, not descending into nested
/// function scopes.
pub fn contains_kind_in_scope(node: &Node, kind: &str, scope_kinds: &[&str]) -> bool {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == kind {
            return true;
        }
        if scope_kinds.contains(&child.kind()) {
            continue;
        }
        if contains_kind_in_scope(&child, kind, scope_kinds) {
            return true;
        }
    }
    false
}

/// Named children that are not comments.
pub fn named_code_children(node: &Node) -> usize {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .count()
}

pub fn strip_type_arguments(text: &str) -> String {
    text.split(|c| c == '<' || c == '[')
        .next()
        .unwrap_or(text)
        .trim()
        .to_string()
}

/// Marks functions directly inside a class as methods and stamps each call
/// with its enclosing function, `<module>` at top level.
pub(crate) fn annotate_members(node: &mut AstNode, class: Option<&str>, function: Option<&str>) {
    let own_name = node.name.clone();
    let (child_class, child_function) = match node.node_type {
        AstNodeType::Class | AstNodeType::Interface | AstNodeType::Enum => {
            (own_name.as_deref(), None)
        }
        AstNodeType::Function => (None, own_name.as_deref()),
        _ => (class, function),
    };

    for child in &mut node.children {
        match child.node_type {
            AstNodeType::Function if child_class.is_some() => {
                child.set_meta(keys::IS_METHOD, true);
                if child.class_name().is_none() {
                    if let Some(class) = child_class {
                        child.set_meta(keys::CLASS_NAME, class);
                    }
                }
            }
            AstNodeType::Call => {
                let caller = child_function.unwrap_or("<module>");
                child.set_meta(keys::CALLER, caller);
            }
            _ => {}
        }
        annotate_members(child, child_class, child_function);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(t: AstNodeType, name: &str, sl: u32, el: u32) -> AstNode {
        AstNode::named(t, name, Location::new("f", sl, 1, el, 1))
    }

    #[test]
    fn annotates_methods_and_callers() {
        let mut root = node(AstNodeType::Module, "m", 1, 20);
        let mut class = node(AstNodeType::Class, "A", 1, 10);
        let mut method = node(AstNodeType::Function, "run", 2, 5);
        method.add_child(node(AstNodeType::Call, "helper", 3, 3));
        class.add_child(method);
        root.add_child(class);
        root.add_child(node(AstNodeType::Function, "helper", 12, 14));
        root.add_child(node(AstNodeType::Call, "boot", 16, 16));

        annotate_members(&mut root, None, None);

        let method = &root.children[0].children[0];
        assert!(method.is_method());
        assert_eq!(method.class_name(), Some("A"));
        assert_eq!(method.children[0].caller(), Some("run"));
        assert!(!root.children[1].is_method());
        assert_eq!(root.children[2].caller(), Some("<module>"));
    }

    #[test]
    fn strips_generic_arguments() {
        assert_eq!(strip_type_arguments("Base<T>"), "Base");
        assert_eq!(strip_type_arguments("Stack[T]"), "Stack");
        assert_eq!(strip_type_arguments("java.io.Closeable"), "java.io.Closeable");
    }
}
