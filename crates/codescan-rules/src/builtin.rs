use crate::dsl::{AstRule, FieldValue, Operator, RuleBuilder};
use codescan_core::{AstNodeType, RuleCategory, Severity};
use tracing::warn;

/// The AST rules enabled by default.
pub fn builtin_ast_rules() -> Vec<AstRule> {
    let rules = [
        RuleBuilder::new("ast/too-many-parameters")
            .name("Too many parameters")
            .description("Functions taking more than five parameters")
            .category(RuleCategory::Style)
            .severity(Severity::Low)
            .node_types([AstNodeType::Function])
            .when("paramCount", Operator::GreaterThan(5.0))
            .message_fn(|ctx| {
                format!(
                    "Function '{}' takes {} parameters",
                    ctx.name(),
                    ctx.capture("paramCount")
                        .map(FieldValue::to_string)
                        .unwrap_or_default()
                )
            })
            .suggestion("Group related parameters into an options object or struct")
            .build(),
        RuleBuilder::new("ast/async-without-await")
            .name("Async function without await")
            .description("Async functions whose body never awaits")
            .category(RuleCategory::Quality)
            .severity(Severity::Low)
            .node_types([AstNodeType::Function])
            .when("async", Operator::equals(true))
            .when("hasAwait", Operator::equals(false))
            .when("bodyEmpty", Operator::not_equals(true))
            .message_fn(|ctx| format!("Async function '{}' never awaits", ctx.name()))
            .suggestion("Drop the async modifier or await the asynchronous work")
            .build(),
        RuleBuilder::new("ast/empty-function")
            .name("Empty function body")
            .description("Functions with an empty body")
            .category(RuleCategory::Quality)
            .severity(Severity::Info)
            .node_types([AstNodeType::Function])
            .when("bodyEmpty", Operator::equals(true))
            .when("name", Operator::none_of(["constructor", "__init__", "init"]))
            .message_fn(|ctx| format!("Function '{}' has an empty body", ctx.name()))
            .build(),
        RuleBuilder::new("ast/large-class")
            .name("Large class")
            .description("Classes spanning more than 500 lines")
            .category(RuleCategory::Architecture)
            .severity(Severity::Medium)
            .node_types([AstNodeType::Class])
            .when("lineCount", Operator::GreaterThan(500.0))
            .message_fn(|ctx| format!("Class '{}' spans more than 500 lines", ctx.name()))
            .suggestion("Split the class along its responsibilities")
            .build(),
        RuleBuilder::new("ast/wide-inheritance")
            .name("Wide interface implementation")
            .description("Classes implementing more than four interfaces")
            .category(RuleCategory::Architecture)
            .severity(Severity::Low)
            .node_types([AstNodeType::Class])
            .when("implements.length", Operator::GreaterThan(4.0))
            .message_fn(|ctx| {
                format!(
                    "Class '{}' implements {} interfaces",
                    ctx.name(),
                    ctx.capture("implements.length")
                        .map(FieldValue::to_string)
                        .unwrap_or_default()
                )
            })
            .suggestion("Prefer composition over accumulating interfaces")
            .build(),
    ];

    rules
        .into_iter()
        .filter_map(|rule| match rule {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!("built-in AST rule rejected: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_rules_all_build() {
        let rules = builtin_ast_rules();
        assert_eq!(rules.len(), 5);
        assert!(rules.iter().all(|r| !r.conditions.is_empty()));
    }
}
