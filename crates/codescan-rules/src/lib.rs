pub mod builtin;
pub mod catalog;
pub mod dsl;
pub mod engine;
pub mod error;
pub mod lexical;
pub mod source;

pub use builtin::builtin_ast_rules;
pub use catalog::{CatalogEntry, RuleCatalog, RuleKind};
pub use dsl::{
    field_value, AstRule, Condition, FieldValue, MatchContext, MessageFn, MessageSource,
    Operator, RuleBuilder,
};
pub use engine::{RuleEngine, RuleRun};
pub use error::{Result, RuleError};
pub use lexical::{
    enabled_rule_sets, run_rule_sets, ArchitectureRules, LexicalRuleSet, LexicalRun,
    RuleDescriptor, SecurityRules, StyleRules, TestRules,
};
pub use source::{is_test_path, SourceFile};
