use codescan_core::{hash_parts, AstNode, AstNodeType, Language, Location};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IrNodeType {
    Module,
    Class,
    Interface,
    Function,
    Variable,
    Type,
    Enum,
    /// Synthesized target for imports that do not resolve to a project file.
    Namespace,
}

impl IrNodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IrNodeType::Module => "module",
            IrNodeType::Class => "class",
            IrNodeType::Interface => "interface",
            IrNodeType::Function => "function",
            IrNodeType::Variable => "variable",
            IrNodeType::Type => "type",
            IrNodeType::Enum => "enum",
            IrNodeType::Namespace => "namespace",
        }
    }

    /// The IR counterpart of a significant AST node type.
    pub fn from_ast(node_type: AstNodeType) -> Option<Self> {
        Some(match node_type {
            AstNodeType::Function => IrNodeType::Function,
            AstNodeType::Class => IrNodeType::Class,
            AstNodeType::Interface => IrNodeType::Interface,
            AstNodeType::Type => IrNodeType::Type,
            AstNodeType::Enum => IrNodeType::Enum,
            AstNodeType::Variable => IrNodeType::Variable,
            _ => return None,
        })
    }
}

impl fmt::Display for IrNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrNode {
    pub id: String,
    pub node_type: IrNodeType,
    pub name: String,
    pub qualified_name: String,
    pub language: Language,
    pub location: Location,
    pub content_hash: String,
    pub visibility: Option<String>,
    pub is_async: bool,
    pub is_static: bool,
    pub is_exported: bool,
}

impl IrNode {
    pub fn module(id: String, qualified_name: String, language: Language, location: Location) -> Self {
        let name = qualified_name
            .rsplit('/')
            .next()
            .unwrap_or(&qualified_name)
            .to_string();
        let content_hash = hash_parts(&["module", &qualified_name]);
        Self {
            id,
            node_type: IrNodeType::Module,
            name,
            qualified_name,
            language,
            location,
            content_hash,
            visibility: None,
            is_async: false,
            is_static: false,
            is_exported: false,
        }
    }

    pub fn external(specifier: &str) -> Self {
        Self {
            id: format!("external:{}", specifier),
            node_type: IrNodeType::Namespace,
            name: specifier.to_string(),
            qualified_name: specifier.to_string(),
            language: Language::Unknown,
            location: Location::default(),
            content_hash: hash_parts(&["external", specifier]),
            visibility: None,
            is_async: false,
            is_static: false,
            is_exported: true,
        }
    }

    pub fn from_ast(
        id: String,
        node_type: IrNodeType,
        qualified_name: String,
        language: Language,
        ast: &AstNode,
    ) -> Self {
        Self {
            id,
            node_type,
            name: ast.name.clone().unwrap_or_default(),
            qualified_name,
            language,
            location: ast.location.clone(),
            content_hash: signature_hash(node_type, ast),
            visibility: ast.visibility().map(str::to_string),
            is_async: ast.is_async(),
            is_static: ast.is_static(),
            is_exported: ast.is_exported(),
        }
    }

    pub fn file_path(&self) -> &str {
        &self.location.file_path
    }
}

/// Hash over kind, name, span length and signature metadata. Moving unchanged
/// code keeps the hash; editing a signature or resizing a body changes it.
fn signature_hash(node_type: IrNodeType, ast: &AstNode) -> String {
    let span = ast.line_count().to_string();
    let params = ast.parameters().join(",");
    let flags = format!(
        "async={} static={} exported={} visibility={}",
        ast.is_async(),
        ast.is_static(),
        ast.is_exported(),
        ast.visibility().unwrap_or("")
    );
    let extends = ast.extends().join(",");
    let implements = ast.implements().join(",");
    let value = ast
        .meta(codescan_core::keys::VALUE)
        .and_then(|v| v.as_str())
        .unwrap_or("");
    hash_parts(&[
        node_type.as_str(),
        ast.name.as_deref().unwrap_or(""),
        &span,
        &params,
        &flags,
        &extends,
        &implements,
        value,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function(line: u32, params: Vec<String>) -> AstNode {
        AstNode::named(AstNodeType::Function, "run", Location::new("a.ts", line, 1, line + 3, 2))
            .with_meta(codescan_core::keys::PARAMETERS, params)
    }

    #[test]
    fn hash_survives_moves_but_not_signature_edits() {
        let a = signature_hash(IrNodeType::Function, &function(1, vec!["x".into()]));
        let moved = signature_hash(IrNodeType::Function, &function(40, vec!["x".into()]));
        let edited = signature_hash(
            IrNodeType::Function,
            &function(1, vec!["x".into(), "y".into()]),
        );
        assert_eq!(a, moved);
        assert_ne!(a, edited);
    }

    #[test]
    fn only_significant_ast_types_map() {
        assert_eq!(IrNodeType::from_ast(AstNodeType::Class), Some(IrNodeType::Class));
        assert_eq!(IrNodeType::from_ast(AstNodeType::Call), None);
        assert_eq!(IrNodeType::from_ast(AstNodeType::Import), None);
    }
}
