// ABOUTME: Builder DSL for rules that match AST nodes by type and field conditions.
// ABOUTME: Rules compile their regexes and file globs up front, so a built rule cannot fail to match.
use crate::error::{Result, RuleError};
use codescan_core::{
    AstFile, AstNode, AstNodeType, Language, Location, MetadataValue, RuleCategory, RuleViolation,
    Severity,
};
use globset::{Glob, GlobMatcher};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A value read from a node, or the operand of a condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    fn loosely_equals(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Number(a), FieldValue::Number(b)) => (a - b).abs() < f64::EPSILON,
            (FieldValue::Number(_), FieldValue::Text(_))
            | (FieldValue::Text(_), FieldValue::Number(_)) => {
                match (self.as_f64(), other.as_f64()) {
                    (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
                    _ => false,
                }
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::List(items) => f.write_str(&items.join(", ")),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Number(v as f64)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Number(v as f64)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Number(v as f64)
    }
}

impl From<usize> for FieldValue {
    fn from(v: usize) -> Self {
        FieldValue::Number(v as f64)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(v: Vec<String>) -> Self {
        FieldValue::List(v)
    }
}

impl FieldValue {
    /// Nested maps have no field representation.
    pub fn from_metadata(value: &MetadataValue) -> Option<FieldValue> {
        match value {
            MetadataValue::Bool(b) => Some(FieldValue::Bool(*b)),
            MetadataValue::Int(i) => Some(FieldValue::Number(*i as f64)),
            MetadataValue::Float(f) => Some(FieldValue::Number(*f)),
            MetadataValue::Text(s) => Some(FieldValue::Text(s.clone())),
            MetadataValue::List(items) => Some(FieldValue::List(items.clone())),
            MetadataValue::Map(_) => None,
        }
    }
}

/// Reads `field` from a node. Recognized names: `type`, `name`, `id`,
/// `parent`, `lineCount`, `paramCount`, `childCount`, `location.<part>`,
/// `metadata.<key>[.<key>...]`, or a bare metadata key. Any of these
/// suffixed with `.length` yields the list or text length.
pub fn field_value(node: &AstNode, field: &str) -> Option<FieldValue> {
    if let Some(base) = field.strip_suffix(".length") {
        return match field_value(node, base)? {
            FieldValue::List(items) => Some(items.len().into()),
            FieldValue::Text(s) => Some(s.chars().count().into()),
            _ => None,
        };
    }
    match field {
        "type" => Some(FieldValue::Text(node.node_type.as_str().to_string())),
        "name" => node.name.clone().map(FieldValue::Text),
        "id" => Some(FieldValue::Text(node.id.clone())),
        "parent" => node.parent.clone().map(FieldValue::Text),
        "lineCount" => Some(FieldValue::Number(node.line_count() as f64)),
        "paramCount" => Some(FieldValue::Number(node.param_count() as f64)),
        "childCount" => Some(FieldValue::Number(node.children.len() as f64)),
        "location.filePath" => Some(FieldValue::Text(node.location.file_path.clone())),
        "location.startLine" => Some(node.location.start_line.into()),
        "location.endLine" => Some(node.location.end_line.into()),
        "location.startColumn" => Some(node.location.start_column.into()),
        "location.endColumn" => Some(node.location.end_column.into()),
        other => {
            let value = match other.strip_prefix("metadata.") {
                Some(path) => node.meta_path(path),
                None => node.meta(other),
            };
            value.and_then(FieldValue::from_metadata)
        }
    }
}

/// Comparison applied to a field.
#[derive(Debug, Clone)]
pub enum Operator {
    Equals(FieldValue),
    NotEquals(FieldValue),
    Contains(String),
    Matches(Regex),
    StartsWith(String),
    EndsWith(String),
    GreaterThan(f64),
    GreaterOrEqual(f64),
    LessThan(f64),
    LessOrEqual(f64),
    In(Vec<FieldValue>),
    NotIn(Vec<FieldValue>),
    Exists,
    NotExists,
}

impl Operator {
    pub fn equals(value: impl Into<FieldValue>) -> Self {
        Operator::Equals(value.into())
    }

    pub fn not_equals(value: impl Into<FieldValue>) -> Self {
        Operator::NotEquals(value.into())
    }

    pub fn one_of<V: Into<FieldValue>>(values: impl IntoIterator<Item = V>) -> Self {
        Operator::In(values.into_iter().map(Into::into).collect())
    }

    pub fn none_of<V: Into<FieldValue>>(values: impl IntoIterator<Item = V>) -> Self {
        Operator::NotIn(values.into_iter().map(Into::into).collect())
    }

    /// Evaluates against a field that may be absent. Only the negative
    /// operators hold on a missing field.
    pub fn evaluate(&self, value: Option<&FieldValue>) -> bool {
        let Some(value) = value else {
            return matches!(
                self,
                Operator::NotExists | Operator::NotEquals(_) | Operator::NotIn(_)
            );
        };
        match self {
            Operator::Exists => true,
            Operator::NotExists => false,
            Operator::Equals(expected) => value.loosely_equals(expected),
            Operator::NotEquals(expected) => !value.loosely_equals(expected),
            Operator::Contains(needle) => match value {
                FieldValue::Text(s) => s.contains(needle.as_str()),
                FieldValue::List(items) => items.iter().any(|i| i == needle),
                _ => false,
            },
            Operator::Matches(re) => match value {
                FieldValue::Text(s) => re.is_match(s),
                FieldValue::List(items) => items.iter().any(|i| re.is_match(i)),
                FieldValue::Number(_) | FieldValue::Bool(_) => re.is_match(&value.to_string()),
            },
            Operator::StartsWith(prefix) => value.as_str().is_some_and(|s| s.starts_with(prefix.as_str())),
            Operator::EndsWith(suffix) => value.as_str().is_some_and(|s| s.ends_with(suffix.as_str())),
            Operator::GreaterThan(n) => value.as_f64().is_some_and(|v| v > *n),
            Operator::GreaterOrEqual(n) => value.as_f64().is_some_and(|v| v >= *n),
            Operator::LessThan(n) => value.as_f64().is_some_and(|v| v < *n),
            Operator::LessOrEqual(n) => value.as_f64().is_some_and(|v| v <= *n),
            Operator::In(options) => options.iter().any(|o| value.loosely_equals(o)),
            Operator::NotIn(options) => !options.iter().any(|o| value.loosely_equals(o)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator) -> Self {
        Self {
            field: field.into(),
            operator,
        }
    }

    pub fn holds(&self, node: &AstNode) -> bool {
        self.operator.evaluate(field_value(node, &self.field).as_ref())
    }
}

/// What a message or suggestion function gets to see.
pub struct MatchContext<'a> {
    pub node: &'a AstNode,
    pub file: &'a AstFile,
    /// Values of the fields named by the rule's conditions.
    pub captures: BTreeMap<String, FieldValue>,
}

impl MatchContext<'_> {
    pub fn name(&self) -> &str {
        self.node.name.as_deref().unwrap_or("<anonymous>")
    }

    pub fn capture(&self, field: &str) -> Option<&FieldValue> {
        self.captures.get(field)
    }
}

pub type MessageFn = Arc<dyn Fn(&MatchContext<'_>) -> String + Send + Sync>;

#[derive(Clone)]
pub enum MessageSource {
    Static(String),
    Dynamic(MessageFn),
}

impl MessageSource {
    pub fn render(&self, ctx: &MatchContext<'_>) -> String {
        match self {
            MessageSource::Static(s) => s.clone(),
            MessageSource::Dynamic(f) => f(ctx),
        }
    }
}

impl fmt::Debug for MessageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageSource::Static(s) => f.debug_tuple("Static").field(s).finish(),
            MessageSource::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// A rule over AST nodes. Built with [`RuleBuilder`].
#[derive(Debug, Clone)]
pub struct AstRule {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: RuleCategory,
    pub severity: Severity,
    pub node_types: Vec<AstNodeType>,
    pub conditions: Vec<Condition>,
    pub languages: Vec<Language>,
    file_pattern: Option<GlobMatcher>,
    message: MessageSource,
    suggestion: Option<MessageSource>,
    pub references: Vec<String>,
}

impl AstRule {
    /// Language and file-pattern scope.
    pub fn applies_to(&self, file: &AstFile) -> bool {
        if !self.languages.is_empty() && !self.languages.contains(&file.language) {
            return false;
        }
        match &self.file_pattern {
            Some(glob) => glob.is_match(&file.file_path),
            None => true,
        }
    }

    pub fn file_pattern(&self) -> Option<&str> {
        self.file_pattern.as_ref().map(|g| g.glob().glob())
    }

    /// All conditions hold. A rule without conditions matches nothing.
    pub fn matches(&self, node: &AstNode) -> bool {
        if self.conditions.is_empty() {
            return false;
        }
        if !self.node_types.is_empty() && !self.node_types.contains(&node.node_type) {
            return false;
        }
        self.conditions.iter().all(|c| c.holds(node))
    }

    fn violation(&self, node: &AstNode, file: &AstFile) -> RuleViolation {
        let captures = self
            .conditions
            .iter()
            .filter_map(|c| field_value(node, &c.field).map(|v| (c.field.clone(), v)))
            .collect();
        let ctx = MatchContext {
            node,
            file,
            captures,
        };
        RuleViolation {
            rule_id: self.id.clone(),
            rule_name: self.name.clone(),
            category: self.category.clone(),
            severity: self.severity,
            message: self.message.render(&ctx),
            file_path: file.file_path.clone(),
            location: Location {
                file_path: file.file_path.clone(),
                ..node.location.clone()
            },
            suggestion: self.suggestion.as_ref().map(|s| s.render(&ctx)),
            references: self.references.clone(),
        }
    }

    /// Walks the whole tree of an in-scope file.
    pub fn evaluate(&self, file: &AstFile) -> Vec<RuleViolation> {
        if !self.applies_to(file) {
            return Vec::new();
        }
        file.nodes()
            .filter(|node| self.matches(node))
            .map(|node| self.violation(node, file))
            .collect()
    }
}

/// Fluent constructor for [`AstRule`]. Patterns are compiled in [`RuleBuilder::build`].
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    id: String,
    name: Option<String>,
    description: String,
    category: RuleCategory,
    severity: Severity,
    node_types: Vec<AstNodeType>,
    conditions: Vec<Condition>,
    patterns: Vec<(String, String)>,
    languages: Vec<Language>,
    file_pattern: Option<String>,
    message: Option<MessageSource>,
    suggestion: Option<MessageSource>,
    references: Vec<String>,
}

impl RuleBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: String::new(),
            category: RuleCategory::Quality,
            severity: Severity::Medium,
            node_types: Vec::new(),
            conditions: Vec::new(),
            patterns: Vec::new(),
            languages: Vec::new(),
            file_pattern: None,
            message: None,
            suggestion: None,
            references: Vec::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn category(mut self, category: RuleCategory) -> Self {
        self.category = category;
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn node_types(mut self, types: impl IntoIterator<Item = AstNodeType>) -> Self {
        self.node_types.extend(types);
        self
    }

    pub fn when(mut self, field: impl Into<String>, operator: Operator) -> Self {
        self.conditions.push(Condition::new(field, operator));
        self
    }

    /// Regex condition; the pattern is compiled at build time.
    pub fn when_matches(mut self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.patterns.push((field.into(), pattern.into()));
        self
    }

    pub fn languages(mut self, languages: impl IntoIterator<Item = Language>) -> Self {
        self.languages.extend(languages);
        self
    }

    pub fn file_pattern(mut self, glob: impl Into<String>) -> Self {
        self.file_pattern = Some(glob.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(MessageSource::Static(message.into()));
        self
    }

    pub fn message_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&MatchContext<'_>) -> String + Send + Sync + 'static,
    {
        self.message = Some(MessageSource::Dynamic(Arc::new(f)));
        self
    }

    pub fn suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(MessageSource::Static(suggestion.into()));
        self
    }

    pub fn suggestion_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&MatchContext<'_>) -> String + Send + Sync + 'static,
    {
        self.suggestion = Some(MessageSource::Dynamic(Arc::new(f)));
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.references.push(reference.into());
        self
    }

    pub fn build(self) -> Result<AstRule> {
        if self.id.trim().is_empty() {
            return Err(RuleError::Incomplete("rule id is empty".into()));
        }

        let mut conditions = self.conditions;
        for (field, pattern) in self.patterns {
            let re = Regex::new(&pattern).map_err(|e| RuleError::InvalidPattern {
                rule: self.id.clone(),
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            conditions.push(Condition::new(field, Operator::Matches(re)));
        }

        let file_pattern = match self.file_pattern {
            Some(pattern) => Some(
                Glob::new(&pattern)
                    .map_err(|e| RuleError::InvalidGlob {
                        rule: self.id.clone(),
                        pattern: pattern.clone(),
                        message: e.to_string(),
                    })?
                    .compile_matcher(),
            ),
            None => None,
        };

        let name = self.name.unwrap_or_else(|| self.id.clone());
        let message = self
            .message
            .unwrap_or_else(|| MessageSource::Static(format!("{} matched", name)));

        Ok(AstRule {
            id: self.id,
            name,
            description: self.description,
            category: self.category,
            severity: self.severity,
            node_types: self.node_types,
            conditions,
            languages: self.languages,
            file_pattern,
            message,
            suggestion: self.suggestion,
            references: self.references,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function(name: &str, lines: u32) -> AstNode {
        AstNode::named(
            AstNodeType::Function,
            name,
            Location::new("src/a.ts", 1, 1, lines, 1),
        )
        .with_meta("async", true)
        .with_meta("parameters", vec!["a".to_string(), "b".to_string()])
    }

    #[test]
    fn reads_derived_and_metadata_fields() {
        let node = function("load", 12);
        assert_eq!(field_value(&node, "lineCount"), Some(FieldValue::Number(12.0)));
        assert_eq!(field_value(&node, "paramCount"), Some(FieldValue::Number(2.0)));
        assert_eq!(field_value(&node, "async"), Some(FieldValue::Bool(true)));
        assert_eq!(field_value(&node, "metadata.async"), Some(FieldValue::Bool(true)));
        assert_eq!(field_value(&node, "type"), Some(FieldValue::Text("function".into())));
        assert_eq!(field_value(&node, "metadata.missing"), None);
        assert_eq!(field_value(&node, "parameters.length"), Some(FieldValue::Number(2.0)));
        assert_eq!(field_value(&node, "name.length"), Some(FieldValue::Number(4.0)));
    }

    #[test]
    fn operators_on_missing_fields() {
        assert!(Operator::NotExists.evaluate(None));
        assert!(Operator::not_equals("x").evaluate(None));
        assert!(!Operator::equals("x").evaluate(None));
        assert!(!Operator::GreaterThan(1.0).evaluate(None));
    }

    #[test]
    fn comparison_and_set_operators() {
        let n = FieldValue::Number(7.0);
        assert!(Operator::GreaterThan(5.0).evaluate(Some(&n)));
        assert!(Operator::LessOrEqual(7.0).evaluate(Some(&n)));
        assert!(Operator::one_of([5, 7]).evaluate(Some(&n)));
        assert!(Operator::none_of(["a", "b"]).evaluate(Some(&FieldValue::Text("c".into()))));
        let list = FieldValue::List(vec!["Base".into(), "Mixin".into()]);
        assert!(Operator::Contains("Mixin".into()).evaluate(Some(&list)));
        assert!(Operator::EndsWith("Service".into())
            .evaluate(Some(&FieldValue::Text("UserService".into()))));
    }

    #[test]
    fn empty_condition_list_never_matches() {
        let rule = RuleBuilder::new("inert")
            .node_types([AstNodeType::Function])
            .build()
            .unwrap();
        assert!(!rule.matches(&function("anything", 3)));
    }

    #[test]
    fn invalid_patterns_fail_the_build() {
        let err = RuleBuilder::new("bad")
            .when_matches("name", "(unclosed")
            .build()
            .unwrap_err();
        assert_eq!(err.rule_id(), Some("bad"));

        let err = RuleBuilder::new("bad-glob")
            .when("name", Operator::Exists)
            .file_pattern("src/[")
            .build()
            .unwrap_err();
        assert!(matches!(err, RuleError::InvalidGlob { .. }));
    }

    #[test]
    fn dynamic_messages_see_captures() {
        let rule = RuleBuilder::new("long")
            .node_types([AstNodeType::Function])
            .when("lineCount", Operator::GreaterThan(10.0))
            .message_fn(|ctx| {
                format!(
                    "{} spans {} lines",
                    ctx.name(),
                    ctx.capture("lineCount").map(|v| v.to_string()).unwrap_or_default()
                )
            })
            .build()
            .unwrap();

        let mut root = AstNode::named(
            AstNodeType::Module,
            "a",
            Location::new("src/a.ts", 1, 1, 20, 1),
        );
        root.add_child(function("load", 12));
        let file = AstFile::new(
            "src/a.ts",
            Language::TypeScript,
            root,
            Vec::new(),
            Vec::new(),
            "hash",
            codescan_core::ParseFidelity::Full,
        );
        let violations = rule.evaluate(&file);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].message, "load spans 12 lines");
        assert_eq!(violations[0].location.start_line, 1);
    }
}
