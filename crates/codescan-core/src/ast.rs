use crate::types::{Language, Location};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Standardized syntactic construct kinds shared by every language parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AstNodeType {
    Module,
    Function,
    Class,
    Interface,
    Type,
    Enum,
    Variable,
    Import,
    Export,
    Call,
    Block,
    Other,
}

impl AstNodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AstNodeType::Module => "module",
            AstNodeType::Function => "function",
            AstNodeType::Class => "class",
            AstNodeType::Interface => "interface",
            AstNodeType::Type => "type",
            AstNodeType::Enum => "enum",
            AstNodeType::Variable => "variable",
            AstNodeType::Import => "import",
            AstNodeType::Export => "export",
            AstNodeType::Call => "call",
            AstNodeType::Block => "block",
            AstNodeType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "module" => AstNodeType::Module,
            "function" | "method" => AstNodeType::Function,
            "class" | "struct" => AstNodeType::Class,
            "interface" => AstNodeType::Interface,
            "type" => AstNodeType::Type,
            "enum" => AstNodeType::Enum,
            "variable" => AstNodeType::Variable,
            "import" => AstNodeType::Import,
            "export" => AstNodeType::Export,
            "call" => AstNodeType::Call,
            "block" => AstNodeType::Block,
            "other" => AstNodeType::Other,
            _ => return None,
        })
    }
}

impl fmt::Display for AstNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed metadata value attached to an [`AstNode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
    Map(BTreeMap<String, MetadataValue>),
}

impl MetadataValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(i) => Some(*i),
            MetadataValue::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Int(i) => Some(*i as f64),
            MetadataValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            MetadataValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<usize> for MetadataValue {
    fn from(v: usize) -> Self {
        MetadataValue::Int(v as i64)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::Text(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::Text(v)
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(v: Vec<String>) -> Self {
        MetadataValue::List(v)
    }
}

pub type NodeMetadata = BTreeMap<String, MetadataValue>;

/// Well-known metadata keys written by the parsers.
pub mod keys {
    pub const ASYNC: &str = "async";
    pub const EXPORTED: &str = "exported";
    pub const STATIC: &str = "static";
    pub const VISIBILITY: &str = "visibility";
    pub const IS_METHOD: &str = "isMethod";
    pub const CLASS_NAME: &str = "className";
    pub const RECEIVER: &str = "receiver";
    pub const PARAMETERS: &str = "parameters";
    pub const PARAM_COUNT: &str = "paramCount";
    pub const EXTENDS: &str = "extends";
    pub const IMPLEMENTS: &str = "implements";
    pub const CALLEE: &str = "callee";
    pub const CALLER: &str = "caller";
    pub const SOURCE: &str = "source";
    pub const SPECIFIERS: &str = "specifiers";
    pub const DEFAULT: &str = "default";
    pub const DECORATORS: &str = "decorators";
    pub const VALUE: &str = "value";
    pub const HAS_AWAIT: &str = "hasAwait";
    pub const BODY_EMPTY: &str = "bodyEmpty";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstNode {
    pub id: String,
    pub node_type: AstNodeType,
    pub name: Option<String>,
    pub location: Location,
    pub children: Vec<AstNode>,
    pub parent: Option<String>,
    #[serde(default)]
    pub metadata: NodeMetadata,
}

impl AstNode {
    /// Creates a detached node. Ids and parent links are assigned by [`AstFile::new`].
    pub fn new(node_type: AstNodeType, name: Option<String>, location: Location) -> Self {
        Self {
            id: String::new(),
            node_type,
            name,
            location,
            children: Vec::new(),
            parent: None,
            metadata: NodeMetadata::new(),
        }
    }

    pub fn named(node_type: AstNodeType, name: impl Into<String>, location: Location) -> Self {
        Self::new(node_type, Some(name.into()), location)
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn set_meta(&mut self, key: &str, value: impl Into<MetadataValue>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    pub fn add_child(&mut self, child: AstNode) {
        self.children.push(child);
    }

    pub fn meta(&self, key: &str) -> Option<&MetadataValue> {
        self.metadata.get(key)
    }

    /// Resolves a dotted path through nested metadata maps.
    pub fn meta_path(&self, path: &str) -> Option<&MetadataValue> {
        let mut parts = path.split('.');
        let mut current = self.metadata.get(parts.next()?)?;
        for part in parts {
            match current {
                MetadataValue::Map(map) => current = map.get(part)?,
                _ => return None,
            }
        }
        Some(current)
    }

    fn flag(&self, key: &str) -> bool {
        self.meta(key).and_then(MetadataValue::as_bool).unwrap_or(false)
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.meta(key).and_then(MetadataValue::as_str)
    }

    pub fn is_async(&self) -> bool {
        self.flag(keys::ASYNC)
    }

    pub fn is_exported(&self) -> bool {
        self.flag(keys::EXPORTED)
    }

    pub fn is_static(&self) -> bool {
        self.flag(keys::STATIC)
    }

    pub fn is_method(&self) -> bool {
        self.flag(keys::IS_METHOD)
    }

    pub fn visibility(&self) -> Option<&str> {
        self.text(keys::VISIBILITY)
    }

    pub fn class_name(&self) -> Option<&str> {
        self.text(keys::CLASS_NAME)
    }

    pub fn receiver(&self) -> Option<&str> {
        self.text(keys::RECEIVER)
    }

    pub fn parameters(&self) -> &[String] {
        self.meta(keys::PARAMETERS)
            .and_then(MetadataValue::as_list)
            .unwrap_or(&[])
    }

    pub fn param_count(&self) -> usize {
        self.meta(keys::PARAM_COUNT)
            .and_then(MetadataValue::as_i64)
            .map(|n| n.max(0) as usize)
            .unwrap_or_else(|| self.parameters().len())
    }

    pub fn extends(&self) -> Vec<String> {
        self.list_or_text(keys::EXTENDS)
    }

    pub fn implements(&self) -> Vec<String> {
        self.list_or_text(keys::IMPLEMENTS)
    }

    pub fn callee(&self) -> Option<&str> {
        self.text(keys::CALLEE)
    }

    pub fn caller(&self) -> Option<&str> {
        self.text(keys::CALLER)
    }

    fn list_or_text(&self, key: &str) -> Vec<String> {
        match self.meta(key) {
            Some(MetadataValue::List(items)) => items.clone(),
            Some(MetadataValue::Text(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    pub fn line_count(&self) -> u32 {
        self.location.line_count()
    }

    /// Pre-order traversal over this node and all descendants.
    pub fn iter(&self) -> AstIter<'_> {
        AstIter { stack: vec![self] }
    }

    pub fn find_all(&self, node_type: AstNodeType) -> Vec<&AstNode> {
        self.iter().filter(|n| n.node_type == node_type).collect()
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    fn assign_ids(&mut self, parent: Option<&str>, allocator: &mut NodeIdAllocator) {
        self.id = allocator.allocate(self.node_type, &self.location);
        self.parent = parent.map(str::to_string);
        let id = self.id.clone();
        for child in &mut self.children {
            child.assign_ids(Some(&id), allocator);
        }
    }
}

pub struct AstIter<'a> {
    stack: Vec<&'a AstNode>,
}

impl<'a> Iterator for AstIter<'a> {
    type Item = &'a AstNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Hands out position-derived ids, suffixing `#n` on repeats within one file.
#[derive(Debug, Default)]
pub struct NodeIdAllocator {
    seen: HashMap<String, usize>,
}

impl NodeIdAllocator {
    pub fn allocate(&mut self, node_type: AstNodeType, location: &Location) -> String {
        let base = format!(
            "{}@{}:{}-{}:{}",
            node_type.as_str(),
            location.start_line,
            location.start_column,
            location.end_line,
            location.end_column
        );
        let count = self.seen.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{}#{}", base, *count - 1)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportInfo {
    pub source: String,
    pub specifiers: Vec<String>,
    pub is_relative: bool,
    pub is_dynamic: bool,
    pub line: u32,
}

impl ImportInfo {
    pub fn new(source: impl Into<String>, line: u32) -> Self {
        let source = source.into();
        Self {
            is_relative: source.starts_with('.'),
            source,
            specifiers: Vec::new(),
            is_dynamic: false,
            line,
        }
    }

    pub fn with_specifiers(mut self, specifiers: Vec<String>) -> Self {
        self.specifiers = specifiers;
        self
    }

    pub fn dynamic(mut self) -> Self {
        self.is_dynamic = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportInfo {
    pub name: String,
    pub kind: String,
    pub is_default: bool,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseFidelity {
    /// Backed by a real grammar.
    Full,
    /// No usable grammar: the tree holds at most the module root.
    BestEffort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstFile {
    pub file_path: String,
    pub language: Language,
    pub root: AstNode,
    pub imports: Vec<ImportInfo>,
    pub exports: Vec<ExportInfo>,
    pub parse_error: Option<String>,
    pub content_hash: String,
    pub fidelity: ParseFidelity,
}

impl AstFile {
    /// Finalizes a parsed tree: assigns position ids and parent links in pre-order.
    pub fn new(
        file_path: impl Into<String>,
        language: Language,
        mut root: AstNode,
        imports: Vec<ImportInfo>,
        exports: Vec<ExportInfo>,
        content_hash: impl Into<String>,
        fidelity: ParseFidelity,
    ) -> Self {
        let mut allocator = NodeIdAllocator::default();
        root.assign_ids(None, &mut allocator);
        Self {
            file_path: file_path.into(),
            language,
            root,
            imports,
            exports,
            parse_error: None,
            content_hash: content_hash.into(),
            fidelity,
        }
    }

    /// A file whose parse failed: empty module root plus the recorded error.
    pub fn failed(
        file_path: impl Into<String>,
        language: Language,
        content_hash: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let file_path = file_path.into();
        let root = AstNode::new(
            AstNodeType::Module,
            None,
            Location::new(file_path.clone(), 1, 1, 1, 1),
        );
        let mut file = Self::new(
            file_path,
            language,
            root,
            Vec::new(),
            Vec::new(),
            content_hash,
            ParseFidelity::BestEffort,
        );
        file.parse_error = Some(error.into());
        file
    }

    pub fn has_error(&self) -> bool {
        self.parse_error.is_some()
    }

    pub fn nodes(&self) -> AstIter<'_> {
        self.root.iter()
    }

    pub fn functions(&self) -> Vec<&AstNode> {
        self.root.find_all(AstNodeType::Function)
    }

    pub fn node_count(&self) -> usize {
        self.root.count()
    }
}
