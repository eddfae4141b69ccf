// ABOUTME: Line-oriented rule sets that work on raw or masked source text,
// ABOUTME: no AST required. Shared descriptor, line-rule and violation helpers.
pub mod architecture;
pub mod security;
pub mod style;
pub mod testing;

pub use architecture::ArchitectureRules;
pub use security::SecurityRules;
pub use style::StyleRules;
pub use testing::TestRules;

use crate::error::{Result, RuleError};
use crate::source::SourceFile;
use codescan_core::{Language, Location, RuleCategory, RuleToggles, RuleViolation, Severity};
use codescan_parser::lexical::Pattern;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};
use std::sync::Arc;

/// Static description of a built-in rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub category: RuleCategory,
    pub severity: Severity,
    pub description: &'static str,
}

impl RuleDescriptor {
    pub(crate) fn violation(
        &self,
        file: &SourceFile,
        line: usize,
        column: usize,
        message: impl Into<String>,
        suggestion: Option<&str>,
    ) -> RuleViolation {
        RuleViolation {
            rule_id: self.id.to_string(),
            rule_name: self.name.to_string(),
            category: self.category.clone(),
            severity: self.severity,
            message: message.into(),
            file_path: file.path.clone(),
            location: Location::new(
                file.path.clone(),
                line as u32,
                column as u32,
                line as u32,
                column as u32,
            ),
            suggestion: suggestion.map(str::to_string),
            references: Vec::new(),
        }
    }
}

/// A set of lexical rules checked one file at a time, plus optional
/// checks that need the whole project.
pub trait LexicalRuleSet: Send + Sync {
    fn id(&self) -> &'static str;

    fn category(&self) -> RuleCategory;

    fn rules(&self) -> &'static [RuleDescriptor];

    fn check(&self, file: &SourceFile) -> Result<Vec<RuleViolation>>;

    /// Runs [`LexicalRuleSet::check`] on every file. Files without content are skipped.
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
        Ok(violations)
    }
}

/// The lexical rule sets switched on in `toggles`.
pub fn enabled_rule_sets(toggles: &RuleToggles) -> Vec<Arc<dyn LexicalRuleSet>> {
    let mut sets: Vec<Arc<dyn LexicalRuleSet>> = Vec::new();
    if toggles.security {
        sets.push(Arc::new(SecurityRules));
    }
    if toggles.style {
        sets.push(Arc::new(StyleRules));
    }
    if toggles.test {
        sets.push(Arc::new(TestRules));
    }
    if toggles.architecture {
        sets.push(Arc::new(ArchitectureRules));
    }
    sets
}

/// Outcome of running several lexical rule sets over a project.
#[derive(Debug, Default)]
pub struct LexicalRun {
    pub violations: Vec<RuleViolation>,
    pub errors: Vec<RuleError>,
}

/// Runs every set over `files` in parallel. A failing set is recorded and
/// the others still report. Violations are ordered by file, line and rule id.
pub fn run_rule_sets(sets: &[Arc<dyn LexicalRuleSet>], files: &[SourceFile]) -> LexicalRun {
    let results: Vec<(&'static str, Result<Vec<RuleViolation>>)> = sets
        .par_iter()
        .map(|set| (set.id(), set.check_project(files)))
        .collect();

    let mut run = LexicalRun::default();
    for (id, result) in results {
        match result {
            Ok(found) => {
                debug!(rule_set = id, violations = found.len(), "lexical rules executed");
                run.violations.extend(found);
            }
            Err(e) => {
                warn!(rule_set = id, "lexical rule set failed: {}", e);
                run.errors.push(e);
            }
        }
    }
    run.violations.sort_by(|a, b| {
        (&a.file_path, a.location.start_line, &a.rule_id)
            .cmp(&(&b.file_path, b.location.start_line, &b.rule_id))
    });
    run
}

/// One regex-driven line check. Several line rules may report under the
/// same descriptor.
pub(crate) struct LineRule {
    pub descriptor: &'static RuleDescriptor,
    pub patterns: Vec<Pattern>,
    /// Lines that match here are never reported.
    pub exclude: Option<Pattern>,
    /// Match against raw text instead of the masked line.
    pub raw: bool,
    pub languages: &'static [Language],
    pub message: &'static str,
    pub suggestion: &'static str,
}

impl LineRule {
    pub fn new<S: AsRef<str>>(descriptor: &'static RuleDescriptor, patterns: &[S]) -> Self {
        Self {
            descriptor,
            patterns: patterns.iter().map(|p| Pattern::new(p.as_ref())).collect(),
            exclude: None,
            raw: false,
            languages: &[],
            message: descriptor.description,
            suggestion: "",
        }
    }

    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    pub fn excluding(mut self, pattern: &str) -> Self {
        self.exclude = Some(Pattern::new(pattern));
        self
    }

    pub fn only(mut self, languages: &'static [Language]) -> Self {
        self.languages = languages;
        self
    }

    pub fn message(mut self, message: &'static str) -> Self {
        self.message = message;
        self
    }

    pub fn suggestion(mut self, suggestion: &'static str) -> Self {
        self.suggestion = suggestion;
        self
    }

    pub fn applies_to(&self, language: Language) -> bool {
        self.languages.is_empty() || self.languages.contains(&language)
    }

    /// 1-based column of the first match, if the line is reported.
    pub fn match_column(&self, raw: &str, masked: &str) -> Option<usize> {
        let text = if self.raw { raw } else { masked };
        if self.exclude.as_ref().is_some_and(|e| e.is_match(raw)) {
            return None;
        }
        self.patterns
            .iter()
            .find_map(|p| p.find(text))
            .map(|m| m.start() + 1)
    }

    pub fn violation(&self, file: &SourceFile, line: usize, column: usize) -> RuleViolation {
        let suggestion = (!self.suggestion.is_empty()).then_some(self.suggestion);
        self.descriptor
            .violation(file, line, column, self.message, suggestion)
    }
}

/// Raw and masked lines of a file, paired by index.
pub(crate) struct Lines<'a> {
    pub raw: Vec<&'a str>,
    pub masked: Vec<String>,
}

impl<'a> Lines<'a> {
    pub fn new(content: &'a str, language: Language) -> Self {
        let masked = codescan_parser::lexical::mask(content, language);
        Self {
            raw: content.lines().collect(),
            masked: masked.lines().map(str::to_string).collect(),
        }
    }

    pub fn masked(&self, idx: usize) -> &str {
        self.masked.get(idx).map(String::as_str).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }
}

/// Runs line rules over every line; each rule reports at most once per line.
pub(crate) fn run_line_rules(
    rules: &[LineRule],
    file: &SourceFile,
    lines: &Lines<'_>,
) -> Vec<RuleViolation> {
    let mut violations = Vec::new();
    let active: Vec<&LineRule> = rules.iter().filter(|r| r.applies_to(file.language)).collect();
    for (idx, raw) in lines.raw.iter().enumerate() {
        let mut reported: Vec<&str> = Vec::new();
        for rule in &active {
            if reported.contains(&rule.descriptor.id) {
                continue;
            }
            if let Some(column) = rule.match_column(raw, lines.masked(idx)) {
                violations.push(rule.violation(file, idx + 1, column));
                reported.push(rule.descriptor.id);
            }
        }
    }
    violations
}
