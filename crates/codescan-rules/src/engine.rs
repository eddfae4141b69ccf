use crate::builtin::builtin_ast_rules;
use crate::dsl::AstRule;
use crate::error::RuleError;
use codescan_core::{AstFile, RuleViolation};
use rayon::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of running the AST rules over a set of files.
#[derive(Debug, Default)]
pub struct RuleRun {
    pub violations: Vec<RuleViolation>,
    pub errors: Vec<RuleError>,
    pub files_checked: usize,
}

/// Executes [`AstRule`]s against parsed files.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: Vec<AstRule>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_rules() -> Self {
        Self {
            rules: builtin_ast_rules(),
        }
    }

    /// Replaces a rule with the same id.
    pub fn add_rule(&mut self, rule: AstRule) {
        self.rules.retain(|r| r.id != rule.id);
        self.rules.push(rule);
    }

    pub fn remove_rule(&mut self, id: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.id != id);
        before != self.rules.len()
    }

    pub fn rules(&self) -> &[AstRule] {
        &self.rules
    }

    fn run_rule(rule: &AstRule, file: &AstFile) -> Result<Vec<RuleViolation>, RuleError> {
        // custom message functions are user code
        catch_unwind(AssertUnwindSafe(|| rule.evaluate(file))).map_err(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "rule panicked".to_string());
            RuleError::Execution {
                rule: rule.id.clone(),
                file: file.file_path.clone(),
                message,
            }
        })
    }

    /// Files with a recorded parse error are skipped. Output is ordered by
    /// file, line, then rule id.
    pub fn execute(&self, files: &[Arc<AstFile>]) -> RuleRun {
        let per_file: Vec<(Vec<RuleViolation>, Vec<RuleError>)> = files
            .par_iter()
            .filter(|file| !file.has_error())
            .map(|file| {
                let mut violations = Vec::new();
                let mut errors = Vec::new();
                for rule in &self.rules {
                    match Self::run_rule(rule, file) {
                        Ok(found) => violations.extend(found),
                        Err(e) => {
                            warn!(rule = %rule.id, file = %file.file_path, "rule failed: {}", e);
                            errors.push(e);
                        }
                    }
                }
                (violations, errors)
            })
            .collect();

        let mut run = RuleRun {
            files_checked: per_file.len(),
            ..RuleRun::default()
        };
        for (violations, errors) in per_file {
            run.violations.extend(violations);
            run.errors.extend(errors);
        }
        run.violations.sort_by(|a, b| {
            (&a.file_path, a.location.start_line, &a.rule_id)
                .cmp(&(&b.file_path, b.location.start_line, &b.rule_id))
        });
        debug!(
            rules = self.rules.len(),
            files = run.files_checked,
            violations = run.violations.len(),
            "AST rules executed"
        );
        run
    }
}
