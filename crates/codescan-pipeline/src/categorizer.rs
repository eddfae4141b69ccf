use codescan_core::{
    CategorizedResult, FindingSource, MainCategory, RuleCategory, RuleViolation, StaticFinding,
    StaticFindingKind, SubCategory,
};
use once_cell::sync::Lazy;
use std::collections::HashMap;

use MainCategory as M;
use SubCategory as S;

/// Known rule ids and static finding kinds.
const CATEGORY_TABLE: &[(&str, MainCategory, SubCategory)] = &[
    ("security/aws-secret-key", M::Security, S::Secret),
    ("security/aws-access-key-id", M::Security, S::Secret),
    ("security/private-key", M::Security, S::Secret),
    ("security/github-token", M::Security, S::Secret),
    ("security/slack-token", M::Security, S::Secret),
    ("security/stripe-key", M::Security, S::Secret),
    ("security/hardcoded-secret", M::Security, S::Secret),
    ("security/sql-injection", M::Security, S::Injection),
    ("security/command-injection", M::Security, S::Injection),
    ("security/xss", M::Security, S::Xss),
    ("security/unsafe-eval", M::Security, S::CodeExecution),
    ("security/weak-crypto", M::Security, S::Crypto),
    ("security/insecure-transport", M::Security, S::Transport),
    ("security/disabled-verification", M::Security, S::Authentication),
    ("security/unsafe-deserialization", M::Security, S::Deserialization),
    ("security/sensitive-logging", M::Security, S::DataExposure),
    ("style/naming-convention", M::Standards, S::Naming),
    ("style/magic-number", M::Standards, S::MagicValue),
    ("style/debug-statement", M::Operations, S::DebugCode),
    ("style/long-line", M::Standards, S::Formatting),
    ("style/long-function", M::Quality, S::FunctionSize),
    ("style/unsafe-type", M::Quality, S::TypeSafety),
    ("test/missing-test-file", M::Test, S::Coverage),
    ("test/skipped-test", M::Test, S::TestQuality),
    ("test/focused-test", M::Test, S::TestQuality),
    ("test/empty-test", M::Test, S::TestQuality),
    ("test/no-assertions", M::Test, S::TestQuality),
    ("architecture/index-self-import", M::Structure, S::CircularDependency),
    ("architecture/barrel-cycle", M::Structure, S::CircularDependency),
    ("architecture/lodash-full-import", M::Structure, S::ImportHygiene),
    ("architecture/require-in-typescript", M::Structure, S::ImportHygiene),
    ("architecture/deep-relative-import", M::Structure, S::ImportHygiene),
    ("architecture/cross-package-internals", M::Structure, S::ImportHygiene),
    ("ast/too-many-parameters", M::Quality, S::FunctionSize),
    ("ast/async-without-await", M::Quality, S::Other),
    ("ast/empty-function", M::Quality, S::DeadCode),
    ("ast/large-class", M::Structure, S::ModuleSize),
    ("ast/wide-inheritance", M::Structure, S::Coupling),
    ("high-complexity", M::Quality, S::Complexity),
    ("file-too-long", M::Quality, S::FileSize),
    ("layer-violation", M::Structure, S::Layering),
    ("deep-nesting", M::Structure, S::Nesting),
    ("fat-module", M::Structure, S::ModuleSize),
    ("circular-dependency", M::Structure, S::CircularDependency),
    ("high-coupling", M::Structure, S::Coupling),
    ("dead-code", M::Quality, S::DeadCode),
    ("deep-call-chain", M::Structure, S::CallDepth),
];

static LOOKUP: Lazy<HashMap<&'static str, (MainCategory, SubCategory)>> = Lazy::new(|| {
    CATEGORY_TABLE
        .iter()
        .map(|(id, main, sub)| (*id, (*main, *sub)))
        .collect()
});

/// Keywords in a rule name or id, checked in order.
const SUB_CATEGORY_KEYWORDS: &[(&[&str], SubCategory)] = &[
    (&["secret", "password", "credential", "token", "api key", "apikey"], S::Secret),
    (&["inject", "sql"], S::Injection),
    (&["xss", "innerhtml"], S::Xss),
    (&["eval", "exec"], S::CodeExecution),
    (&["crypto", "cipher", "md5", "sha1"], S::Crypto),
    (&["http", "tls", "ssl", "transport"], S::Transport),
    (&["auth", "verif"], S::Authentication),
    (&["deserial", "pickle"], S::Deserialization),
    (&["complex"], S::Complexity),
    (&["cycle", "circular"], S::CircularDependency),
    (&["layer"], S::Layering),
    (&["nest"], S::Nesting),
    (&["coupl", "fan-out", "fan out"], S::Coupling),
    (&["import", "require"], S::ImportHygiene),
    (&["dead", "unused", "unreachable"], S::DeadCode),
    (&["debug", "console", "print"], S::DebugCode),
    (&["log"], S::Logging),
    (&["magic"], S::MagicValue),
    (&["naming", "name", "case"], S::Naming),
    (&["line length", "long-line", "format", "indent"], S::Formatting),
    (&["param", "function length", "long function"], S::FunctionSize),
    (&["type"], S::TypeSafety),
    (&["coverage", "missing test"], S::Coverage),
    (&["test", "assert"], S::TestQuality),
    (&["size", "large", "long"], S::FileSize),
];

/// Assigns every finding exactly one (main, sub) category pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct Categorizer;

impl Categorizer {
    pub fn new() -> Self {
        Self
    }

    pub fn lookup(rule_id: &str) -> Option<(MainCategory, SubCategory)> {
        LOOKUP.get(rule_id).copied()
    }

    pub fn categorize_violation(&self, violation: &RuleViolation) -> CategorizedResult {
        let (main_category, sub_category) = Self::lookup(&violation.rule_id).unwrap_or_else(|| {
            let keywords = format!("{} {}", violation.rule_name, violation.rule_id);
            (
                infer_main_category(&violation.category),
                infer_sub_category(&keywords),
            )
        });
        CategorizedResult {
            main_category,
            sub_category,
            source: FindingSource::Violation(violation.clone()),
        }
    }

    pub fn categorize_finding(&self, finding: &StaticFinding) -> CategorizedResult {
        let (main_category, sub_category) =
            Self::lookup(finding.kind.as_str()).unwrap_or_else(|| static_fallback(finding.kind));
        CategorizedResult {
            main_category,
            sub_category,
            source: FindingSource::Static(finding.clone()),
        }
    }

    /// Violations first, then static findings, each in input order.
    pub fn categorize_all(
        &self,
        violations: &[RuleViolation],
        findings: &[StaticFinding],
    ) -> Vec<CategorizedResult> {
        violations
            .iter()
            .map(|v| self.categorize_violation(v))
            .chain(findings.iter().map(|f| self.categorize_finding(f)))
            .collect()
    }
}

fn static_fallback(kind: StaticFindingKind) -> (MainCategory, SubCategory) {
    (M::Quality, infer_sub_category(kind.as_str()))
}

pub fn infer_main_category(category: &RuleCategory) -> MainCategory {
    match category {
        RuleCategory::Security => M::Security,
        RuleCategory::Style => M::Standards,
        RuleCategory::Architecture => M::Structure,
        RuleCategory::Test => M::Test,
        RuleCategory::Quality => M::Quality,
        RuleCategory::Custom(name) => {
            let name = name.to_lowercase();
            if name.contains("secur") || name.contains("vuln") {
                M::Security
            } else if name.contains("test") {
                M::Test
            } else if name.contains("arch") || name.contains("struct") || name.contains("depend")
            {
                M::Structure
            } else if name.contains("log") || name.contains("ops") || name.contains("operation")
            {
                M::Operations
            } else if name.contains("style") || name.contains("naming") || name.contains("format")
            {
                M::Standards
            } else {
                M::Quality
            }
        }
    }
}

pub fn infer_sub_category(text: &str) -> SubCategory {
    let text = text.to_lowercase();
    SUB_CATEGORY_KEYWORDS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| text.contains(k)))
        .map(|(_, sub)| *sub)
        .unwrap_or(S::Other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codescan_core::{Location, Severity};

    fn violation(rule_id: &str, name: &str, category: RuleCategory) -> RuleViolation {
        RuleViolation {
            rule_id: rule_id.into(),
            rule_name: name.into(),
            category,
            severity: Severity::Medium,
            message: "m".into(),
            file_path: "a.ts".into(),
            location: Location::line("a.ts", 1),
            suggestion: None,
            references: Vec::new(),
        }
    }

    #[test]
    fn known_rules_use_the_table() {
        let c = Categorizer::new();
        let r = c.categorize_violation(&violation(
            "security/aws-secret-key",
            "AWS secret access key",
            RuleCategory::Security,
        ));
        assert_eq!((r.main_category, r.sub_category), (M::Security, S::Secret));

        let finding = StaticFinding::new(
            StaticFindingKind::CircularDependency,
            "cycle",
            Severity::High,
            Location::file("a.ts"),
        );
        let r = c.categorize_finding(&finding);
        assert_eq!(
            (r.main_category, r.sub_category),
            (M::Structure, S::CircularDependency)
        );
    }

    #[test]
    fn every_static_kind_is_in_the_table() {
        for kind in [
            StaticFindingKind::HighComplexity,
            StaticFindingKind::FileTooLong,
            StaticFindingKind::LayerViolation,
            StaticFindingKind::DeepNesting,
            StaticFindingKind::FatModule,
            StaticFindingKind::CircularDependency,
            StaticFindingKind::HighCoupling,
            StaticFindingKind::DeadCode,
            StaticFindingKind::DeepCallChain,
        ] {
            assert!(Categorizer::lookup(kind.as_str()).is_some(), "{}", kind);
        }
    }

    #[test]
    fn unknown_rules_fall_back_to_inference() {
        let c = Categorizer::new();
        let r = c.categorize_violation(&violation(
            "custom/no-plaintext-password",
            "Plaintext password",
            RuleCategory::Security,
        ));
        assert_eq!((r.main_category, r.sub_category), (M::Security, S::Secret));

        let r = c.categorize_violation(&violation(
            "custom/x",
            "Something new",
            RuleCategory::Custom("operations".into()),
        ));
        assert_eq!((r.main_category, r.sub_category), (M::Operations, S::Other));

        let r = c.categorize_violation(&violation("", "", RuleCategory::Custom(String::new())));
        assert_eq!((r.main_category, r.sub_category), (M::Quality, S::Other));
    }

    #[test]
    fn categorize_all_keeps_order() {
        let c = Categorizer::new();
        let violations = vec![violation("style/long-line", "Long line", RuleCategory::Style)];
        let findings = vec![StaticFinding::new(
            StaticFindingKind::DeadCode,
            "unused",
            Severity::Low,
            Location::line("b.ts", 3),
        )];
        let all = c.categorize_all(&violations, &findings);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].source.rule_id(), "style/long-line");
        assert_eq!(all[1].sub_category, S::DeadCode);
    }
}
