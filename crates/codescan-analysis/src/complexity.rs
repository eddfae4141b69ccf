// ABOUTME: Cyclomatic complexity per function, counted over the masked source span
// ABOUTME: so every parser fidelity is measured the same way; also flags overlong files.
use crate::analyzer::{AnalysisInput, AnalyzerOutput, StaticAnalyzer};
use codescan_core::{
    AstNode, AstNodeType, Language, Location, PipelineConfig, Severity, StaticFinding,
    StaticFindingKind,
};
use codescan_parser::lexical::{mask, Pattern};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

static BRANCH_WORDS: Lazy<Pattern> =
    Lazy::new(|| Pattern::new(r"\b(?:if|elif|for|while|case|catch|except)\b"));
static PYTHON_LOGICAL: Lazy<Pattern> = Lazy::new(|| Pattern::new(r"\b(?:and|or)\b"));
static LOGICAL_OPERATORS: Lazy<Pattern> = Lazy::new(|| Pattern::new(r"&&|\|\||\?\?"));

pub const DEFAULT_COMPLEXITY_THRESHOLD: u32 = 15;
pub const DEFAULT_MAX_FILE_LINES: usize = 300;

/// McCabe cyclomatic complexity: `1 + decision points` over masked source
/// text. `else` is the fallthrough edge of its `if`, not a new decision, so
/// it adds nothing; `else if` counts through its `if`.
pub fn cyclomatic_complexity(masked: &str, language: Language) -> u32 {
    let mut count = BRANCH_WORDS.find_all(masked).len() + LOGICAL_OPERATORS.find_all(masked).len();
    if language == Language::Python {
        count += PYTHON_LOGICAL.find_all(masked).len();
    } else {
        count += ternary_count(masked);
    }
    1 + count as u32
}

/// `?` used as a conditional operator, leaving out `?.`, `??`, optional
/// markers (`x?:`, `x?)`) and wildcard generics (`<?>`).
fn ternary_count(text: &str) -> usize {
    let chars: Vec<char> = text.chars().collect();
    let mut count = 0;
    for (i, c) in chars.iter().enumerate() {
        if *c != '?' {
            continue;
        }
        let next = chars.get(i + 1).copied();
        let prev = if i > 0 { chars.get(i - 1).copied() } else { None };
        if matches!(next, Some('.') | Some('?') | Some(':') | Some(')') | Some(',') | Some('>') | Some('='))
            || prev == Some('?')
        {
            continue;
        }
        let prev_code = chars[..i].iter().rev().find(|c| !c.is_whitespace()).copied();
        if matches!(prev_code, Some('<') | Some(',') | Some('(')) {
            continue;
        }
        count += 1;
    }
    count
}

/// HIGH above 30, MEDIUM above 20, else LOW. Non-decreasing in `complexity`.
pub fn complexity_severity(complexity: u32) -> Severity {
    if complexity > 30 {
        Severity::High
    } else if complexity > 20 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionComplexity {
    pub file_path: String,
    pub name: String,
    pub class_name: Option<String>,
    pub line: u32,
    pub line_count: u32,
    pub complexity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileComplexity {
    pub file_path: String,
    pub line_count: usize,
    pub function_count: usize,
    pub average_complexity: f64,
    pub max_complexity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComplexityReport {
    pub functions: Vec<FunctionComplexity>,
    pub files: Vec<FileComplexity>,
}

#[derive(Debug, Clone)]
pub struct ComplexityAnalyzer {
    threshold: u32,
    max_file_lines: usize,
}

impl Default for ComplexityAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_COMPLEXITY_THRESHOLD, DEFAULT_MAX_FILE_LINES)
    }
}

impl ComplexityAnalyzer {
    pub fn new(threshold: u32, max_file_lines: usize) -> Self {
        Self {
            threshold,
            max_file_lines,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.complexity_threshold, config.max_file_length_lines)
    }

    fn function_text(lines: &[&str], function: &AstNode) -> String {
        let start = function.location.start_line.max(1) as usize - 1;
        let end = (function.location.end_line as usize).min(lines.len());

        // nested functions are measured on their own
        let mut nested = HashSet::new();
        for inner in function.iter().skip(1) {
            if inner.node_type == AstNodeType::Function
                && inner.location.start_line > function.location.start_line
            {
                for line in inner.location.start_line..=inner.location.end_line {
                    nested.insert((line as usize).saturating_sub(1));
                }
            }
        }

        (start..end)
            .filter(|idx| !nested.contains(idx))
            .filter_map(|idx| lines.get(idx).copied())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl StaticAnalyzer for ComplexityAnalyzer {
    type Report = ComplexityReport;

    fn name(&self) -> &'static str {
        "complexity"
    }

    fn analyze(&self, input: &AnalysisInput) -> AnalyzerOutput<ComplexityReport> {
        let contents = input.contents();
        let mut report = ComplexityReport::default();
        let mut findings = Vec::new();

        for ast in input.ast_files.iter() {
            let Some(content) = contents.get(ast.file_path.as_str()) else {
                continue;
            };
            let line_count = content.lines().count();

            if line_count > self.max_file_lines {
                let severity = if line_count > self.max_file_lines * 2 {
                    Severity::Medium
                } else {
                    Severity::Low
                };
                findings.push(
                    StaticFinding::new(
                        StaticFindingKind::FileTooLong,
                        format!(
                            "File has {} lines (limit {})",
                            line_count, self.max_file_lines
                        ),
                        severity,
                        Location::new(&ast.file_path, 1, 1, line_count as u32, 1),
                    )
                    .with_metadata("lineCount", line_count)
                    .with_metadata("limit", self.max_file_lines),
                );
            }

            if ast.has_error() {
                continue;
            }

            let masked = mask(content, ast.language);
            let lines: Vec<&str> = masked.lines().collect();
            let mut file_scores = Vec::new();

            for function in ast.functions() {
                let text = Self::function_text(&lines, function);
                let complexity = cyclomatic_complexity(&text, ast.language);
                let name = function.name.clone().unwrap_or_else(|| "<anonymous>".into());
                file_scores.push(complexity);

                if complexity > self.threshold {
                    let display = match function.class_name() {
                        Some(class) => format!("{}.{}", class, name),
                        None => name.clone(),
                    };
                    findings.push(
                        StaticFinding::new(
                            StaticFindingKind::HighComplexity,
                            format!(
                                "Function '{}' has cyclomatic complexity {} (threshold {})",
                                display, complexity, self.threshold
                            ),
                            complexity_severity(complexity),
                            function.location.clone(),
                        )
                        .with_metadata("complexity", complexity)
                        .with_metadata("threshold", self.threshold)
                        .with_metadata("function", display),
                    );
                }

                report.functions.push(FunctionComplexity {
                    file_path: ast.file_path.clone(),
                    name,
                    class_name: function.class_name().map(str::to_string),
                    line: function.location.start_line,
                    line_count: function.line_count(),
                    complexity,
                });
            }

            let max_complexity = file_scores.iter().copied().max().unwrap_or(0);
            let average_complexity = if file_scores.is_empty() {
                0.0
            } else {
                file_scores.iter().map(|c| *c as f64).sum::<f64>() / file_scores.len() as f64
            };
            report.files.push(FileComplexity {
                file_path: ast.file_path.clone(),
                line_count,
                function_count: file_scores.len(),
                average_complexity,
                max_complexity,
            });
        }

        debug!(
            functions = report.functions.len(),
            findings = findings.len(),
            "complexity analysis finished"
        );
        AnalyzerOutput { report, findings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(src: &str, language: Language) -> u32 {
        cyclomatic_complexity(&mask(src, language), language)
    }

    #[test]
    fn straight_line_code_is_one() {
        assert_eq!(score("const a = b + c;\nreturn a;", Language::TypeScript), 1);
    }

    #[test]
    fn counts_branches_and_logical_operators() {
        let src = "if (a && b) {\n} else if (c || d) {\n} else {\n}\nfor (;;) {}\nconst x = y ? 1 : 2;";
        // if, if, for, &&, ||, ?
        assert_eq!(score(src, Language::TypeScript), 7);
    }

    #[test]
    fn else_is_not_a_decision_point() {
        let with_else = "if (a) {\n  x();\n} else {\n  y();\n}";
        let without_else = "if (a) {\n  x();\n}";
        assert_eq!(score(with_else, Language::TypeScript), 2);
        assert_eq!(score(with_else, Language::TypeScript), score(without_else, Language::TypeScript));
        assert_eq!(score("if a:\n    x()\nelse:\n    y()\n", Language::Python), 2);
    }

    #[test]
    fn ignores_optional_chaining_and_keywords_in_strings() {
        let src = "const v = a?.b ?? c;\nfunction f(x?: number) {}\nlog('if while for');";
        // only ??
        assert_eq!(score(src, Language::TypeScript), 2);
    }

    #[test]
    fn python_boolean_words() {
        let src = "if a and b:\n    pass\nelif c or d:\n    pass\nelse:\n    pass\n";
        // if, elif, and, or
        assert_eq!(score(src, Language::Python), 5);
    }

    #[test]
    fn java_wildcards_are_not_ternaries() {
        assert_eq!(score("List<?> xs = load(); Map<String, ?> m;", Language::Java), 1);
    }

    #[test]
    fn severity_is_monotonic() {
        let mut previous = Severity::Info;
        for c in 10..=35 {
            let s = complexity_severity(c);
            assert!(s >= previous);
            previous = s;
        }
        assert_eq!(complexity_severity(10), Severity::Low);
        assert_eq!(complexity_severity(21), Severity::Medium);
        assert_eq!(complexity_severity(35), Severity::High);
    }
}
