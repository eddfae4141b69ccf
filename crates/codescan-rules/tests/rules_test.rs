use codescan_core::{AstFile, AstNodeType, Language, RuleCategory, RuleToggles, Severity};
use codescan_parser::AstParser;
use codescan_rules::{
    enabled_rule_sets, run_rule_sets, Operator, RuleBuilder, RuleEngine, RuleError, SourceFile,
};
use std::sync::Arc;

fn parse_python(path: &str, source: &str) -> Arc<AstFile> {
    AstParser::default().parse_content(path, source, Language::Python)
}

#[test]
fn test_builtin_ast_rules() {
    let source = "def configure(a, b, c, d, e, f):\n    return a\n\nasync def fetch(url):\n    return url\n\ndef noop():\n    pass\n\nasync def load(url):\n    return await get(url)\n";
    let ast = parse_python("app/service.py", source);
    let run = RuleEngine::with_builtin_rules().execute(&[ast]);

    let found: Vec<(&str, u32)> = run
        .violations
        .iter()
        .map(|v| (v.rule_id.as_str(), v.location.start_line))
        .collect();
    assert_eq!(
        found,
        vec![
            ("ast/too-many-parameters", 1),
            ("ast/async-without-await", 4),
            ("ast/empty-function", 7),
        ]
    );
    assert!(run.errors.is_empty());
    assert_eq!(run.files_checked, 1);
}

#[test]
fn test_custom_rule_with_dynamic_message() {
    let rule = RuleBuilder::new("custom/temp-names")
        .name("Temporary names")
        .category(RuleCategory::Custom("naming".into()))
        .severity(Severity::Low)
        .node_types([AstNodeType::Function])
        .when_matches("name", "^tmp")
        .message_fn(|ctx| format!("'{}' looks temporary", ctx.name()))
        .build()
        .unwrap();

    let mut engine = RuleEngine::new();
    engine.add_rule(rule);
    let ast = parse_python("app/util.py", "def tmp_helper():\n    return 1\n\ndef helper():\n    return 2\n");
    let run = engine.execute(&[ast]);

    assert_eq!(run.violations.len(), 1);
    assert_eq!(run.violations[0].message, "'tmp_helper' looks temporary");
    assert_eq!(run.violations[0].category, RuleCategory::Custom("naming".into()));
}

#[test]
fn test_rule_without_conditions_is_inert() {
    let mut engine = RuleEngine::new();
    engine.add_rule(
        RuleBuilder::new("custom/inert")
            .node_types([AstNodeType::Function])
            .build()
            .unwrap(),
    );
    let run = engine.execute(&[parse_python("app/a.py", "def f():\n    return 1\n")]);
    assert!(run.violations.is_empty());
}

#[test]
fn test_invalid_rule_definitions() {
    let err = RuleBuilder::new("custom/bad-regex")
        .when_matches("name", "(unclosed")
        .build()
        .unwrap_err();
    assert!(matches!(err, RuleError::InvalidPattern { .. }));
    assert_eq!(err.rule_id(), Some("custom/bad-regex"));

    let err = RuleBuilder::new("")
        .when("name", Operator::Exists)
        .build()
        .unwrap_err();
    assert!(matches!(err, RuleError::Incomplete(_)));
}

#[test]
fn test_failed_parses_are_skipped() {
    let failed = Arc::new(AstFile::failed("app/broken.py", Language::Python, "hash", "boom"));
    let run = RuleEngine::with_builtin_rules().execute(&[failed]);
    assert_eq!(run.files_checked, 0);
    assert!(run.violations.is_empty());
}

#[test]
fn test_lexical_rule_sets_follow_toggles() {
    let files = vec![
        SourceFile::new(
            "src/app.ts",
            Language::TypeScript,
            "const password = \"hunter2hunter2\";\nconsole.log(password);\n",
        ),
        SourceFile {
            path: "src/empty.ts".into(),
            language: Language::TypeScript,
            content: None,
        },
    ];

    let run = run_rule_sets(&enabled_rule_sets(&RuleToggles::default()), &files);
    let ids: Vec<&str> = run.violations.iter().map(|v| v.rule_id.as_str()).collect();
    assert!(ids.contains(&"security/hardcoded-secret"));
    assert!(ids.contains(&"style/debug-statement"));
    assert!(run.errors.is_empty());

    let toggles = RuleToggles {
        style: false,
        ..RuleToggles::default()
    };
    let run = run_rule_sets(&enabled_rule_sets(&toggles), &files);
    assert!(run
        .violations
        .iter()
        .all(|v| !v.rule_id.starts_with("style/")));
    assert!(run
        .violations
        .iter()
        .any(|v| v.rule_id == "security/hardcoded-secret"));
}
