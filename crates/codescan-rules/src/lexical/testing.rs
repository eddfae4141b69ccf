// ABOUTME: Test hygiene rules: skipped, focused and empty tests, test files without
// ABOUTME: assertions, and significant source files that have no matching test file.
use super::{run_line_rules, LexicalRuleSet, LineRule, Lines, RuleDescriptor};
use crate::error::{Result, RuleError};
use crate::source::SourceFile;
use codescan_core::{Language, RuleCategory, RuleViolation, Severity};
use codescan_parser::lexical::{code_line_count, indent_block_end, is_blank, Pattern};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use tracing::debug;

const MISSING_TEST_FILE: usize = 0;
const SKIPPED_TEST: usize = 1;
const FOCUSED_TEST: usize = 2;
const EMPTY_TEST: usize = 3;
const NO_ASSERTIONS: usize = 4;

/// Code lines a source file needs before it is expected to have tests.
pub const SIGNIFICANT_CODE_LINES: usize = 30;

pub static TEST_RULES: [RuleDescriptor; 5] = [
    RuleDescriptor {
        id: "test/missing-test-file",
        name: "Missing test file",
        category: RuleCategory::Test,
        severity: Severity::Medium,
        description: "Significant source file without a corresponding test file",
    },
    RuleDescriptor {
        id: "test/skipped-test",
        name: "Skipped test",
        category: RuleCategory::Test,
        severity: Severity::Low,
        description: "Test disabled with a skip marker",
    },
    RuleDescriptor {
        id: "test/focused-test",
        name: "Focused test",
        category: RuleCategory::Test,
        severity: Severity::Medium,
        description: "Focused test silently excludes the rest of the suite",
    },
    RuleDescriptor {
        id: "test/empty-test",
        name: "Empty test",
        category: RuleCategory::Test,
        severity: Severity::Low,
        description: "Test with an empty body",
    },
    RuleDescriptor {
        id: "test/no-assertions",
        name: "Test without assertions",
        category: RuleCategory::Test,
        severity: Severity::Medium,
        description: "Test file that never asserts anything",
    },
];

const TESTED_LANGUAGES: &[Language] = &[
    Language::TypeScript,
    Language::JavaScript,
    Language::Python,
    Language::Java,
    Language::Kotlin,
    Language::Go,
];

/// Entry points and package markers that are not expected to have their own tests.
const UNTESTED_FILE_STEMS: &[&str] = &["index", "__init__", "__main__", "main", "setup", "conftest"];

static TEST_LINE_RULES: Lazy<Vec<LineRule>> = Lazy::new(|| {
    vec![
        LineRule::new(
            &TEST_RULES[SKIPPED_TEST],
            &[
                r"\b(?:it|test|describe|context)\.skip\s*\(",
                r"(?:^|[^\w.])x(?:it|test|describe)\s*\(",
                r"@pytest\.mark\.skip\w*",
                r"@unittest\.skip\w*",
                r"@(?:Disabled|Ignore)\b",
                r"\bt\.Skip(?:f|Now)?\s*\(",
            ],
        )
        .message("Test is skipped")
        .suggestion("Fix or delete the test instead of skipping it"),
        LineRule::new(
            &TEST_RULES[FOCUSED_TEST],
            &[
                r"\b(?:it|test|describe|context)\.only\s*\(",
                r"(?:^|[^\w.])f(?:it|describe)\s*\(",
            ],
        )
        .message("Focused test excludes the rest of the suite")
        .suggestion("Remove .only before committing"),
        LineRule::new(
            &TEST_RULES[EMPTY_TEST],
            &[r#"\b(?:it|test)\s*\(\s*['"`][^'"`]*['"`]\s*,\s*(?:async\s+)?(?:\(\s*\)\s*=>|function\s*\(\s*\))\s*\{\s*\}"#],
        )
        .message("Test body is empty")
        .suggestion("Implement the test or remove it"),
        LineRule::new(
            &TEST_RULES[EMPTY_TEST],
            &[r"\bfunc\s+Test\w*\s*\(\s*\w+\s+\*testing\.T\s*\)\s*\{\s*\}"],
        )
        .only(&[Language::Go])
        .message("Test body is empty")
        .suggestion("Implement the test or remove it"),
        LineRule::new(
            &TEST_RULES[EMPTY_TEST],
            &[r"@Test\s+(?:public\s+)?void\s+\w+\s*\(\s*\)\s*(?:throws\s+[\w.,\s]+)?\{\s*\}"],
        )
        .only(&[Language::Java, Language::Kotlin])
        .message("Test body is empty")
        .suggestion("Implement the test or remove it"),
    ]
});

static PYTHON_TEST_DEF: Lazy<Pattern> =
    Lazy::new(|| Pattern::new(r"^\s*(?:async\s+)?def\s+(test\w*)\s*\("));

static TEST_DEFINITION: Lazy<Pattern> = Lazy::new(|| {
    Pattern::new(
        r"(?:^|[^\w.])(?:it|test)\s*\(|^\s*(?:async\s+)?def\s+test|\bfunc\s+Test\w*\s*\(|@Test\b",
    )
});

static ASSERTION: Lazy<Pattern> = Lazy::new(|| {
    Pattern::new(
        r"\bexpect\s*\(|\bassert\w*|\.should\b|\bt\.(?:Error|Errorf|Fatal|Fatalf|Fail|FailNow)\s*\(|\bverify\s*\(|\bpytest\.raises\b|\brequire\.\w+\s*\(|\.to(?:Be|Equal|Have|Throw|Match|Contain)\w*\s*\(",
    )
});

static DECLARATION: Lazy<Pattern> =
    Lazy::new(|| Pattern::new(r"\b(?:function|class|def|func|interface)\b"));

/// Skipped, focused and empty tests, missing assertions and untested sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestRules;

impl TestRules {
    fn empty_python_tests(file: &SourceFile, lines: &Lines<'_>) -> Vec<RuleViolation> {
        let masked: Vec<&str> = lines.masked.iter().map(String::as_str).collect();
        let descriptor = &TEST_RULES[EMPTY_TEST];
        let mut violations = Vec::new();

        for (idx, line) in masked.iter().enumerate() {
            let Some(caps) = PYTHON_TEST_DEF.captures(line) else {
                continue;
            };
            let end = indent_block_end(&masked, idx);
            let empty = if end == idx {
                line.rsplit(':')
                    .next()
                    .map(|rest| is_placeholder_body(rest.trim()))
                    .unwrap_or(false)
            } else {
                masked[idx + 1..=end]
                    .iter()
                    .filter(|l| !is_blank(l))
                    .all(|l| is_placeholder_body(l.trim()))
            };
            if empty {
                let name = caps.get(1).map(|m| m.as_str()).unwrap_or("test");
                violations.push(descriptor.violation(
                    file,
                    idx + 1,
                    1,
                    format!("Test '{}' has an empty body", name),
                    Some("Implement the test or remove it"),
                ));
            }
        }
        violations
    }

    fn missing_assertions(file: &SourceFile, lines: &Lines<'_>) -> Option<RuleViolation> {
        let first_test = lines
            .masked
            .iter()
            .position(|line| TEST_DEFINITION.is_match(line))?;
        if lines.masked.iter().any(|line| ASSERTION.is_match(line)) {
            return None;
        }
        Some(TEST_RULES[NO_ASSERTIONS].violation(
            file,
            first_test + 1,
            1,
            "Test file contains tests but no assertions",
            Some("Assert on the behaviour under test"),
        ))
    }

    fn missing_test_files(files: &[SourceFile]) -> Vec<RuleViolation> {
        let tested: HashSet<String> = files
            .iter()
            .filter(|f| f.is_test())
            .map(|f| tested_subject(f.file_name()))
            .collect();

        let mut violations = Vec::new();
        for file in files {
            let Ok(content) = file.content() else {
                continue;
            };
            if !is_significant(file, content) {
                continue;
            }
            let stem = file_stem(file.file_name());
            if tested.contains(&stem.to_ascii_lowercase()) {
                continue;
            }
            debug!(file = %file.path, "no test file found");
            let suggestion = format!("Add a test file such as {}", suggested_test_name(file));
            violations.push(TEST_RULES[MISSING_TEST_FILE].violation(
                file,
                1,
                1,
                format!("No test file found for {}", file.path),
                Some(suggestion.as_str()),
            ));
        }
        violations
    }
}

impl LexicalRuleSet for TestRules {
    fn id(&self) -> &'static str {
        "test"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Test
    }

    fn rules(&self) -> &'static [RuleDescriptor] {
        &TEST_RULES
    }

    fn check(&self, file: &SourceFile) -> Result<Vec<RuleViolation>> {
        let content = file.content()?;
        if !file.is_test() {
            return Ok(Vec::new());
        }
        let lines = Lines::new(content, file.language);

        let mut violations = run_line_rules(&TEST_LINE_RULES, file, &lines);
        if file.language == Language::Python {
            violations.extend(Self::empty_python_tests(file, &lines));
        }
        violations.extend(Self::missing_assertions(file, &lines));
        violations.sort_by(|a, b| {
            (a.location.start_line, &a.rule_id).cmp(&(b.location.start_line, &b.rule_id))
        });
        Ok(violations)
    }

    fn check_project(&self, files: &[SourceFile]) -> Result<Vec<RuleViolation>> {
        let mut violations = Vec::new();
        for file in files {
            match self.check(file) {
                Ok(found) => violations.extend(found),
                Err(RuleError::MissingContent(path)) => {
                    debug!(rule_set = self.id(), file = %path, "skipping file without content");
                }
                Err(e) => return Err(e),
            }
        }
        violations.extend(Self::missing_test_files(files));
        violations.sort_by(|a, b| {
            (&a.file_path, a.location.start_line, &a.rule_id).cmp(&(
                &b.file_path,
                b.location.start_line,
                &b.rule_id,
            ))
        });
        Ok(violations)
    }
}

fn is_placeholder_body(line: &str) -> bool {
    line.is_empty() || line == "pass" || line == "..." || line.chars().all(|c| c == '"' || c == '\'')
}

/// A non-test source file with enough code and at least one declaration.
fn is_significant(file: &SourceFile, content: &str) -> bool {
    if file.is_test() || !TESTED_LANGUAGES.contains(&file.language) {
        return false;
    }
    let name = file.file_name();
    if name.ends_with(".d.ts") || UNTESTED_FILE_STEMS.contains(&file_stem(name)) {
        return false;
    }
    let masked = codescan_parser::lexical::mask(content, file.language);
    code_line_count(&masked) >= SIGNIFICANT_CODE_LINES && DECLARATION.is_match(&masked)
}

fn file_stem(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// Lowercased name of the unit a test file covers.
fn tested_subject(name: &str) -> String {
    let base = [".test.", ".spec."]
        .iter()
        .find_map(|marker| name.find(marker).map(|i| &name[..i]))
        .unwrap_or_else(|| file_stem(name));
    let base = base.strip_prefix("test_").unwrap_or(base);
    let base = base
        .strip_suffix("_test")
        .or_else(|| base.strip_suffix("Tests"))
        .or_else(|| base.strip_suffix("Test"))
        .unwrap_or(base);
    base.to_ascii_lowercase()
}

fn suggested_test_name(file: &SourceFile) -> String {
    let stem = file_stem(file.file_name());
    let ext = file.file_name().rsplit('.').next().unwrap_or("");
    match file.language {
        Language::TypeScript | Language::JavaScript => format!("{}.test.{}", stem, ext),
        Language::Python => format!("test_{}.py", stem),
        Language::Go => format!("{}_test.go", stem),
        Language::Java | Language::Kotlin => format!("{}Test.{}", stem, ext),
        _ => format!("tests for {}", stem),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines_for(path: &str, language: Language, source: &str, rule: &str) -> Vec<u32> {
        TestRules
            .check(&SourceFile::new(path, language, source))
            .unwrap()
            .into_iter()
            .filter(|v| v.rule_id == rule)
            .map(|v| v.location.start_line)
            .collect()
    }

    #[test]
    fn skipped_and_focused_tests() {
        let source = "describe.only('cart', () => {\n  it.skip('adds', () => { expect(add()).toBe(1); });\n  xit('removes', () => {});\n});\n";
        let path = "src/cart.test.ts";
        assert_eq!(lines_for(path, Language::TypeScript, source, "test/focused-test"), vec![1]);
        assert_eq!(lines_for(path, Language::TypeScript, source, "test/skipped-test"), vec![2, 3]);
        assert!(lines_for(path, Language::TypeScript, source, "test/no-assertions").is_empty());
        assert!(lines_for(path, Language::TypeScript, source, "test/empty-test").is_empty());
    }

    #[test]
    fn empty_python_test_without_assertions() {
        let source = "def test_one():\n    pass\n\ndef test_two():\n    result = run()\n";
        let path = "tests/test_run.py";
        assert_eq!(lines_for(path, Language::Python, source, "test/empty-test"), vec![1]);
        assert_eq!(lines_for(path, Language::Python, source, "test/no-assertions"), vec![1]);
    }

    #[test]
    fn empty_go_test() {
        let source = "package store\n\nfunc TestNothing(t *testing.T) {}\n";
        let path = "store/store_test.go";
        assert_eq!(lines_for(path, Language::Go, source, "test/empty-test"), vec![3]);
        assert_eq!(lines_for(path, Language::Go, source, "test/no-assertions"), vec![3]);
    }

    #[test]
    fn source_files_are_not_checked_per_file() {
        let found = TestRules
            .check(&SourceFile::new("src/a.ts", Language::TypeScript, "it.only('x', () => {});\n"))
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn tested_subjects() {
        assert_eq!(tested_subject("user.test.ts"), "user");
        assert_eq!(tested_subject("user.spec.tsx"), "user");
        assert_eq!(tested_subject("test_user.py"), "user");
        assert_eq!(tested_subject("user_test.go"), "user");
        assert_eq!(tested_subject("UserServiceTest.java"), "userservice");
        assert_eq!(tested_subject("UserServiceTests.java"), "userservice");
    }

    #[test]
    fn missing_test_file_for_significant_sources() {
        let mut body = String::from("export function compute(value: number) {\n");
        for _ in 0..33 {
            body.push_str("  total += value;\n");
        }
        body.push_str("}\n");

        let files = vec![
            SourceFile::new("src/user.ts", Language::TypeScript, body.as_str()),
            SourceFile::new("src/order.ts", Language::TypeScript, body.as_str()),
            SourceFile::new("src/index.ts", Language::TypeScript, body.as_str()),
            SourceFile::new("src/small.ts", Language::TypeScript, "export const x = 1;\n"),
            SourceFile::new(
                "src/order.test.ts",
                Language::TypeScript,
                "it('works', () => { expect(order()).toBe(1); });\n",
            ),
        ];
        let found = TestRules.check_project(&files).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rule_id, "test/missing-test-file");
        assert_eq!(found[0].file_path, "src/user.ts");
        assert_eq!(
            found[0].suggestion.as_deref(),
            Some("Add a test file such as user.test.ts")
        );
    }
}
