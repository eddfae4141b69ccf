use super::{run_line_rules, LexicalRuleSet, LineRule, Lines, RuleDescriptor};
use crate::error::Result;
use crate::source::SourceFile;
use codescan_core::{Language, RuleCategory, RuleViolation, Severity};
use codescan_parser::lexical::{brace_block_end, indent_block_end, Pattern};
use once_cell::sync::Lazy;

const NAMING_CONVENTION: usize = 0;
const MAGIC_NUMBER: usize = 1;
const DEBUG_STATEMENT: usize = 2;
const LONG_LINE: usize = 3;
const LONG_FUNCTION: usize = 4;
const UNSAFE_TYPE: usize = 5;

pub const MAX_LINE_LENGTH: usize = 120;
pub const MAX_FUNCTION_LINES: usize = 50;

pub static STYLE_RULES: [RuleDescriptor; 6] = [
    RuleDescriptor {
        id: "style/naming-convention",
        name: "Naming convention",
        category: RuleCategory::Style,
        severity: Severity::Low,
        description: "Declaration name does not follow the language's naming convention",
    },
    RuleDescriptor {
        id: "style/magic-number",
        name: "Magic number",
        category: RuleCategory::Style,
        severity: Severity::Info,
        description: "Unnamed numeric literal in logic",
    },
    RuleDescriptor {
        id: "style/debug-statement",
        name: "Debug statement",
        category: RuleCategory::Style,
        severity: Severity::Low,
        description: "Debug output or breakpoint left in production code",
    },
    RuleDescriptor {
        id: "style/long-line",
        name: "Long line",
        category: RuleCategory::Style,
        severity: Severity::Info,
        description: "Line longer than 120 characters",
    },
    RuleDescriptor {
        id: "style/long-function",
        name: "Long function",
        category: RuleCategory::Style,
        severity: Severity::Low,
        description: "Function body longer than 50 lines",
    },
    RuleDescriptor {
        id: "style/unsafe-type",
        name: "Type safety escape",
        category: RuleCategory::Style,
        severity: Severity::Medium,
        description: "Type checking is bypassed",
    },
];

const TS_FAMILY: &[Language] = &[Language::TypeScript, Language::JavaScript];
const PYTHON: &[Language] = &[Language::Python];
const JVM_FAMILY: &[Language] = &[Language::Java, Language::Kotlin, Language::CSharp];
const GO: &[Language] = &[Language::Go];

/// A declaration whose captured name must match a convention.
struct NamingCheck {
    languages: &'static [Language],
    declaration: Pattern,
    convention: Pattern,
    kind: &'static str,
    convention_name: &'static str,
    allowed: &'static [&'static str],
}

impl NamingCheck {
    fn new(
        languages: &'static [Language],
        declaration: &str,
        kind: &'static str,
        convention: &str,
        convention_name: &'static str,
    ) -> Self {
        Self {
            languages,
            declaration: Pattern::new(declaration),
            convention: Pattern::new(convention),
            kind,
            convention_name,
            allowed: &[],
        }
    }

    fn allowing(mut self, names: &'static [&'static str]) -> Self {
        self.allowed = names;
        self
    }

    /// First offending name on the line with its 1-based column.
    fn offender<'t>(&self, masked: &'t str) -> Option<(&'t str, usize)> {
        self.declaration
            .captures_all(masked)
            .into_iter()
            .filter_map(|caps| caps.get(1))
            .find(|m| !self.allowed.contains(&m.as_str()) && !self.convention.is_match(m.as_str()))
            .map(|m| (m.as_str(), m.start() + 1))
    }
}

const PASCAL_CASE: &str = r"^_?[A-Z][A-Za-z0-9]*$";
const CAMEL_OR_PASCAL: &str = r"^[_$]*[A-Za-z][A-Za-z0-9$]*$";
const MIXED_CAPS: &str = r"^(?:[A-Za-z][A-Za-z0-9]*|(?:Test|Benchmark|Example|Fuzz)\w*)$";

static NAMING_CHECKS: Lazy<Vec<NamingCheck>> = Lazy::new(|| {
    vec![
        NamingCheck::new(TS_FAMILY, r"\bclass\s+([A-Za-z_$][\w$]*)", "Class", PASCAL_CASE, "PascalCase"),
        NamingCheck::new(
            &[Language::TypeScript],
            r"\b(?:interface|enum)\s+([A-Za-z_$][\w$]*)",
            "Type",
            PASCAL_CASE,
            "PascalCase",
        ),
        NamingCheck::new(
            TS_FAMILY,
            r"\bfunction\s*\*?\s*([A-Za-z_$][\w$]*)\s*[(<]",
            "Function",
            CAMEL_OR_PASCAL,
            "camelCase",
        ),
        NamingCheck::new(
            TS_FAMILY,
            r"\b(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*[=:;]",
            "Variable",
            r"^(?:[_$]*[A-Za-z][A-Za-z0-9$]*|[A-Z][A-Z0-9]*(?:_[A-Z0-9]+)*)$",
            "camelCase or UPPER_SNAKE_CASE",
        ),
        NamingCheck::new(
            PYTHON,
            r"^\s*(?:async\s+)?def\s+(\w+)",
            "Function",
            r"^_{0,2}[a-z][a-z0-9_]*$",
            "snake_case",
        )
        .allowing(&[
            "setUp",
            "tearDown",
            "setUpClass",
            "tearDownClass",
            "setUpModule",
            "tearDownModule",
            "asyncSetUp",
            "asyncTearDown",
        ]),
        NamingCheck::new(PYTHON, r"^\s*class\s+(\w+)", "Class", PASCAL_CASE, "PascalCase"),
        NamingCheck::new(
            JVM_FAMILY,
            r"\b(?:class|interface|enum|record)\s+(\w+)",
            "Type",
            PASCAL_CASE,
            "PascalCase",
        ),
        NamingCheck::new(
            GO,
            r"^\s*func\s+(?:\([^)]*\)\s*)?(\w+)",
            "Function",
            MIXED_CAPS,
            "MixedCaps",
        ),
        NamingCheck::new(
            GO,
            r"^\s*type\s+(\w+)\s+(?:struct|interface)\b",
            "Type",
            MIXED_CAPS,
            "MixedCaps",
        ),
    ]
});

static NUMBER: Lazy<Pattern> = Lazy::new(|| Pattern::new(r"(?:^|[^\w.$])(-?\d+(?:\.\d+)?)\b"));

/// Constant declarations, imports and enum-like lines where literals are expected.
static NUMBER_EXEMPT_LINE: Lazy<Pattern> = Lazy::new(|| {
    Pattern::new(
        r"^\s*(?:(?:export\s+)?const\s+[A-Z_][A-Z0-9_]*\s*[=:]|[A-Z_][A-Z0-9_]*\s*[:=]|.*\bstatic\s+final\b|import\b|from\b|#\s*define\b|@\w+)",
    )
});

const ALLOWED_NUMBERS: &[&str] = &["0", "1", "2", "-1", "10", "100", "0.5", "1.0", "0.0"];

static STYLE_LINE_RULES: Lazy<Vec<LineRule>> = Lazy::new(|| {
    vec![
        LineRule::new(
            &STYLE_RULES[DEBUG_STATEMENT],
            &[r"\bconsole\.(?:log|debug|trace|dir|table)\s*\(", r"(?:^|[^\w.])debugger\s*;?\s*$"],
        )
        .only(TS_FAMILY)
        .message("Debug output left in code")
        .suggestion("Remove the statement or use the project logger"),
        LineRule::new(
            &STYLE_RULES[DEBUG_STATEMENT],
            &[
                r"^\s*print\s*\(",
                r"\bpdb\.set_trace\s*\(",
                r"(?:^|[^\w.])breakpoint\s*\(\s*\)",
            ],
        )
        .only(PYTHON)
        .message("Debug output or breakpoint left in code")
        .suggestion("Remove the statement or use the logging module"),
        LineRule::new(
            &STYLE_RULES[DEBUG_STATEMENT],
            &[r"\bSystem\.(?:out|err)\.print(?:ln|f)?\s*\(", r"\.printStackTrace\s*\(\s*\)"],
        )
        .only(&[Language::Java, Language::Kotlin])
        .message("Console output left in code")
        .suggestion("Use a logger instead of System.out"),
        LineRule::new(&STYLE_RULES[DEBUG_STATEMENT], &[r"\bfmt\.Print(?:ln|f)?\s*\(", r"^\s*println\s*\("])
            .only(GO)
            .message("Console output left in code")
            .suggestion("Use the log package or return the value"),
        LineRule::new(
            &STYLE_RULES[UNSAFE_TYPE],
            &[r":\s*any\b", r"\bas\s+any\b", r"<any>"],
        )
        .only(&[Language::TypeScript])
        .message("Value typed as any")
        .suggestion("Use unknown or a precise type"),
        LineRule::new(&STYLE_RULES[UNSAFE_TYPE], &[r"//\s*@ts-(?:ignore|nocheck)\b"])
            .raw()
            .only(TS_FAMILY)
            .message("Type checking suppressed with a ts directive")
            .suggestion("Fix the type error or use @ts-expect-error with a reason"),
        LineRule::new(&STYLE_RULES[UNSAFE_TYPE], &[r"#\s*type:\s*ignore\b"])
            .raw()
            .only(PYTHON)
            .message("Type checking suppressed with type: ignore")
            .suggestion("Fix the type error or narrow the ignore to a specific code"),
        LineRule::new(&STYLE_RULES[UNSAFE_TYPE], &[r"\binterface\s*\{\s*\}"])
            .only(GO)
            .message("Empty interface discards static typing")
            .suggestion("Use a concrete type, a generic parameter or a narrow interface"),
        LineRule::new(&STYLE_RULES[UNSAFE_TYPE], &[r#"@SuppressWarnings\(\s*"(?:unchecked|rawtypes)""#])
            .raw()
            .only(&[Language::Java])
            .message("Unchecked type warnings suppressed")
            .suggestion("Add type parameters instead of suppressing the warning"),
    ]
});

/// Function headers whose body length is measured.
static FUNCTION_HEADERS: Lazy<Vec<(&'static [Language], Pattern)>> = Lazy::new(|| {
    vec![
        (
            TS_FAMILY,
            Pattern::new(r"\bfunction\s*\*?\s*([A-Za-z_$][\w$]*)?\s*[(<]"),
        ),
        (
            TS_FAMILY,
            Pattern::new(
                r"\b(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*(?::[^=]+)?=>",
            ),
        ),
        (
            TS_FAMILY,
            Pattern::new(
                r"^\s*(?:(?:public|private|protected|static|async|readonly|override|get|set)\s+)*([A-Za-z_$][\w$]*)\s*\([^;]*\)\s*(?::[^{;]+)?\{\s*$",
            ),
        ),
        (PYTHON, Pattern::new(r"^\s*(?:async\s+)?def\s+(\w+)")),
        (
            JVM_FAMILY,
            Pattern::new(
                r"^\s*(?:(?:public|private|protected|internal|static|final|abstract|synchronized|override|virtual|async)\s+)+[\w<>\[\]?,.\s]*?(\w+)\s*\(",
            ),
        ),
        (GO, Pattern::new(r"^\s*func\s+(?:\([^)]*\)\s*)?(\w+)\s*[(\[]")),
    ]
});

const CONTROL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "function", "else", "do", "try", "new",
];

/// Naming, magic numbers, debug output, line and function length and type escapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StyleRules;

impl StyleRules {
    fn naming(file: &SourceFile, lines: &Lines<'_>) -> Vec<RuleViolation> {
        let checks: Vec<&NamingCheck> = NAMING_CHECKS
            .iter()
            .filter(|c| c.languages.contains(&file.language))
            .collect();
        if checks.is_empty() {
            return Vec::new();
        }

        let descriptor = &STYLE_RULES[NAMING_CONVENTION];
        let mut violations = Vec::new();
        for idx in 0..lines.len() {
            let masked = lines.masked(idx);
            if let Some((check, name, column)) = checks
                .iter()
                .find_map(|c| c.offender(masked).map(|(name, col)| (c, name, col)))
            {
                violations.push(descriptor.violation(
                    file,
                    idx + 1,
                    column,
                    format!("{} name '{}' should be {}", check.kind, name, check.convention_name),
                    Some("Rename the declaration"),
                ));
            }
        }
        violations
    }

    fn magic_numbers(file: &SourceFile, lines: &Lines<'_>) -> Vec<RuleViolation> {
        let descriptor = &STYLE_RULES[MAGIC_NUMBER];
        let mut violations = Vec::new();
        for idx in 0..lines.len() {
            let masked = lines.masked(idx);
            if NUMBER_EXEMPT_LINE.is_match(masked) {
                continue;
            }
            let magic = NUMBER
                .captures_all(masked)
                .into_iter()
                .filter_map(|caps| caps.get(1))
                .find(|m| !ALLOWED_NUMBERS.contains(&m.as_str()));
            if let Some(m) = magic {
                violations.push(descriptor.violation(
                    file,
                    idx + 1,
                    m.start() + 1,
                    format!("Magic number {} should be a named constant", m.as_str()),
                    Some("Extract the value into a descriptive constant"),
                ));
            }
        }
        violations
    }

    fn long_lines(file: &SourceFile, lines: &Lines<'_>) -> Vec<RuleViolation> {
        let descriptor = &STYLE_RULES[LONG_LINE];
        lines
            .raw
            .iter()
            .enumerate()
            .filter(|(_, line)| line.chars().count() > MAX_LINE_LENGTH)
            .filter(|(_, line)| !line.contains("http://") && !line.contains("https://"))
            .map(|(idx, line)| {
                descriptor.violation(
                    file,
                    idx + 1,
                    MAX_LINE_LENGTH + 1,
                    format!(
                        "Line is {} characters long (limit {})",
                        line.chars().count(),
                        MAX_LINE_LENGTH
                    ),
                    Some("Break the line up"),
                )
            })
            .collect()
    }

    fn long_functions(file: &SourceFile, lines: &Lines<'_>) -> Vec<RuleViolation> {
        let headers: Vec<&Pattern> = FUNCTION_HEADERS
            .iter()
            .filter(|(languages, _)| languages.contains(&file.language))
            .map(|(_, pattern)| pattern)
            .collect();
        if headers.is_empty() {
            return Vec::new();
        }

        let masked: Vec<&str> = lines.masked.iter().map(String::as_str).collect();
        let indented = file.language == Language::Python;
        let descriptor = &STYLE_RULES[LONG_FUNCTION];
        let mut violations = Vec::new();

        for (idx, line) in masked.iter().enumerate() {
            let Some(caps) = headers.iter().find_map(|p| p.captures(line)) else {
                continue;
            };
            let name = caps.get(1).map(|m| m.as_str()).unwrap_or("<anonymous>");
            if CONTROL_KEYWORDS.contains(&name) {
                continue;
            }

            let end = if indented {
                Some(indent_block_end(&masked, idx))
            } else {
                brace_block_end(&masked, idx)
            };
            let Some(end) = end else {
                continue;
            };
            let length = end - idx + 1;
            if length > MAX_FUNCTION_LINES {
                violations.push(descriptor.violation(
                    file,
                    idx + 1,
                    1,
                    format!(
                        "Function '{}' is {} lines long (limit {})",
                        name, length, MAX_FUNCTION_LINES
                    ),
                    Some("Extract parts of the body into smaller functions"),
                ));
            }
        }
        violations
    }
}

impl LexicalRuleSet for StyleRules {
    fn id(&self) -> &'static str {
        "style"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Style
    }

    fn rules(&self) -> &'static [RuleDescriptor] {
        &STYLE_RULES
    }

    fn check(&self, file: &SourceFile) -> Result<Vec<RuleViolation>> {
        let content = file.content()?;
        let lines = Lines::new(content, file.language);
        let is_test = file.is_test();

        let mut violations = Self::naming(file, &lines);
        if !is_test {
            violations.extend(Self::magic_numbers(file, &lines));
        }
        violations.extend(Self::long_lines(file, &lines));
        violations.extend(Self::long_functions(file, &lines));
        violations.extend(
            run_line_rules(&STYLE_LINE_RULES, file, &lines)
                .into_iter()
                .filter(|v| !(is_test && v.rule_id == STYLE_RULES[DEBUG_STATEMENT].id)),
        );
        violations.sort_by(|a, b| {
            (a.location.start_line, &a.rule_id).cmp(&(b.location.start_line, &b.rule_id))
        });
        Ok(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines_for(path: &str, language: Language, source: &str, rule: &str) -> Vec<usize> {
        StyleRules
            .check(&SourceFile::new(path, language, source))
            .unwrap()
            .into_iter()
            .filter(|v| v.rule_id == rule)
            .map(|v| v.location.start_line as usize)
            .collect()
    }

    #[test]
    fn naming_conventions_per_language() {
        let ts = "class user_service {}\nfunction do_thing() {}\nconst MAX_SIZE = 10;\nlet userName = 'x';\n";
        assert_eq!(
            lines_for("src/a.ts", Language::TypeScript, ts, "style/naming-convention"),
            vec![1, 2]
        );

        let py = "class HttpClient:\n    def fetchData(self):\n        pass\n    def setUp(self):\n        pass\n";
        assert_eq!(
            lines_for("app/client.py", Language::Python, py, "style/naming-convention"),
            vec![2]
        );

        let go = "type user_store struct {}\nfunc TestLoad_Empty(t *testing.T) {}\n";
        assert_eq!(
            lines_for("store.go", Language::Go, go, "style/naming-convention"),
            vec![1]
        );
    }

    #[test]
    fn magic_numbers_outside_constants() {
        let source = "const MAX_RETRIES = 5;\nconst timeout = delay * 3600;\nfor (let i = 0; i < 1; i++) {}\nconst label = \"room 42\";\n";
        let found = StyleRules
            .check(&SourceFile::new("src/a.ts", Language::TypeScript, source))
            .unwrap();
        let magic: Vec<_> = found
            .iter()
            .filter(|v| v.rule_id == "style/magic-number")
            .collect();
        assert_eq!(magic.len(), 1);
        assert_eq!(magic[0].location.start_line, 2);
        assert!(magic[0].message.contains("3600"));
    }

    #[test]
    fn debug_statements_skip_test_files() {
        let source = "console.log(user);\ndebugger;\n";
        assert_eq!(
            lines_for("src/app.ts", Language::TypeScript, source, "style/debug-statement"),
            vec![1, 2]
        );
        assert!(lines_for("src/app.test.ts", Language::TypeScript, source, "style/debug-statement")
            .is_empty());

        let py = "print(\"hi\")\nbreakpoint()\nlogger.info(\"ok\")\n";
        assert_eq!(
            lines_for("app/run.py", Language::Python, py, "style/debug-statement"),
            vec![1, 2]
        );
    }

    #[test]
    fn long_lines() {
        let source = format!("const s = \"{}\";\nconst t = \"short\";\n", "x".repeat(130));
        let found = StyleRules
            .check(&SourceFile::new("src/a.ts", Language::TypeScript, &source))
            .unwrap();
        let long: Vec<_> = found
            .iter()
            .filter(|v| v.rule_id == "style/long-line")
            .collect();
        assert_eq!(long.len(), 1);
        assert_eq!(long[0].severity, Severity::Info);
        assert_eq!(long[0].location.start_column, 121);
    }

    #[test]
    fn long_functions_by_braces_and_indentation() {
        let mut ts = String::from("function big() {\n");
        for _ in 0..55 {
            ts.push_str("  x++;\n");
        }
        ts.push_str("}\n\nfunction small() {\n  return x;\n}\n");
        assert_eq!(
            lines_for("src/a.ts", Language::TypeScript, &ts, "style/long-function"),
            vec![1]
        );

        let mut py = String::from("def big():\n");
        for _ in 0..60 {
            py.push_str("    x = y\n");
        }
        py.push_str("\ndef small():\n    return x\n");
        assert_eq!(
            lines_for("app/a.py", Language::Python, &py, "style/long-function"),
            vec![1]
        );
    }

    #[test]
    fn type_escapes() {
        let ts = "let v: any = read();\n// @ts-ignore\nlet w: unknown = v;\n";
        assert_eq!(
            lines_for("src/a.ts", Language::TypeScript, ts, "style/unsafe-type"),
            vec![1, 2]
        );
        assert!(lines_for("src/a.js", Language::JavaScript, "let any = 1;\n", "style/unsafe-type")
            .is_empty());
        assert_eq!(
            lines_for("app/a.py", Language::Python, "x = f()  # type: ignore\n", "style/unsafe-type"),
            vec![1]
        );
        assert_eq!(
            lines_for("a.go", Language::Go, "func f(v interface{}) {}\n", "style/unsafe-type"),
            vec![1]
        );
    }
}
