use super::{run_line_rules, LexicalRuleSet, LineRule, Lines, RuleDescriptor};
use crate::error::{Result, RuleError};
use crate::source::SourceFile;
use codescan_core::{Language, RuleCategory, RuleViolation, Severity};
use codescan_parser::lexical::Pattern;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use tracing::debug;

const INDEX_SELF_IMPORT: usize = 0;
const BARREL_CYCLE: usize = 1;
const LODASH_FULL_IMPORT: usize = 2;
const REQUIRE_IN_TYPESCRIPT: usize = 3;
const DEEP_RELATIVE_IMPORT: usize = 4;
const CROSS_PACKAGE_INTERNALS: usize = 5;

pub static ARCHITECTURE_RULES: [RuleDescriptor; 6] = [
    RuleDescriptor {
        id: "architecture/index-self-import",
        name: "Index file imports itself",
        category: RuleCategory::Architecture,
        severity: Severity::High,
        description: "Index file importing from its own directory entry point",
    },
    RuleDescriptor {
        id: "architecture/barrel-cycle",
        name: "Barrel import cycle",
        category: RuleCategory::Architecture,
        severity: Severity::Medium,
        description: "Module imports the index file that re-exports it",
    },
    RuleDescriptor {
        id: "architecture/lodash-full-import",
        name: "Whole lodash import",
        category: RuleCategory::Architecture,
        severity: Severity::Low,
        description: "Importing all of lodash instead of individual functions",
    },
    RuleDescriptor {
        id: "architecture/require-in-typescript",
        name: "require in TypeScript",
        category: RuleCategory::Architecture,
        severity: Severity::Low,
        description: "CommonJS require used in a TypeScript module",
    },
    RuleDescriptor {
        id: "architecture/deep-relative-import",
        name: "Deep relative import",
        category: RuleCategory::Architecture,
        severity: Severity::Low,
        description: "Relative import climbing four or more directories",
    },
    RuleDescriptor {
        id: "architecture/cross-package-internals",
        name: "Import of package internals",
        category: RuleCategory::Architecture,
        severity: Severity::Medium,
        description: "Import reaching into another package's src or internal directory",
    },
];

const SCRIPT_LANGUAGES: &[Language] = &[Language::TypeScript, Language::JavaScript];

const COMMENT_LINE: &str = r"^\s*(?://|/?\*|#)";

const IMPORT_PREFIX: &str = r"(?:\bfrom\s+|\bimport\s+|\brequire\s*\(\s*|\bimport\s*\(\s*)";

static SELF_IMPORT: Lazy<LineRule> = Lazy::new(|| {
    LineRule::new(
        &ARCHITECTURE_RULES[INDEX_SELF_IMPORT],
        &[format!(r#"{}['"]\.(?:/(?:index(?:\.[jt]sx?)?)?)?['"]"#, IMPORT_PREFIX)],
    )
    .raw()
    .excluding(COMMENT_LINE)
    .message("Index file imports from itself")
    .suggestion("Import the concrete module instead of the directory entry point")
});

static BARREL_IMPORT: Lazy<Pattern> = Lazy::new(|| {
    Pattern::new(&format!(
        r#"{}['"]\.(?:/(?:index(?:\.[jt]sx?)?)?)?['"]"#,
        IMPORT_PREFIX
    ))
});

static RE_EXPORT: Lazy<Pattern> = Lazy::new(|| {
    Pattern::new(r#"\bexport\s+(?:\*(?:\s+as\s+\w+)?|type\s+\{[^}]*\}|\{[^}]*\})\s+from\s+['"](\./[^'"]+)['"]"#)
});

static ARCHITECTURE_LINE_RULES: Lazy<Vec<LineRule>> = Lazy::new(|| {
    vec![
        LineRule::new(
            &ARCHITECTURE_RULES[LODASH_FULL_IMPORT],
            &[
                r#"(?:\bfrom\s+|\brequire\s*\(\s*)['"]lodash['"]"#,
                r#"\bimport\s+['"]lodash['"]"#,
            ],
        )
        .raw()
        .excluding(COMMENT_LINE)
        .only(SCRIPT_LANGUAGES)
        .message("Whole lodash library is imported")
        .suggestion("Import individual functions such as lodash/debounce"),
        LineRule::new(&ARCHITECTURE_RULES[REQUIRE_IN_TYPESCRIPT], &[r"(?:^|[^\w.])require\s*\("])
            .excluding(r"\bimport\s+\w+\s*=\s*require\b")
            .only(&[Language::TypeScript])
            .message("require() used in a TypeScript module")
            .suggestion("Use an ES import statement"),
        LineRule::new(
            &ARCHITECTURE_RULES[DEEP_RELATIVE_IMPORT],
            &[format!(r#"{}['"](?:\.\./){{4,}}"#, IMPORT_PREFIX)],
        )
        .raw()
        .excluding(COMMENT_LINE)
        .only(SCRIPT_LANGUAGES)
        .message("Relative import climbs four or more directories")
        .suggestion("Use a path alias or move the shared code closer"),
        LineRule::new(&ARCHITECTURE_RULES[DEEP_RELATIVE_IMPORT], &[r"^\s*from\s+\.{5,}"])
            .only(&[Language::Python])
            .message("Relative import climbs four or more packages")
            .suggestion("Use an absolute import"),
        LineRule::new(
            &ARCHITECTURE_RULES[CROSS_PACKAGE_INTERNALS],
            &[
                format!(
                    r#"{}['"](?:@[\w.-]+/)?[A-Za-z][\w.-]*/(?:src|internal|lib/internal)/"#,
                    IMPORT_PREFIX
                ),
                format!(
                    r#"{}['"](?:\.\./)+packages/[\w.-]+/(?:src|internal)/"#,
                    IMPORT_PREFIX
                ),
            ],
        )
        .raw()
        .excluding(COMMENT_LINE)
        .only(SCRIPT_LANGUAGES)
        .message("Import reaches into another package's internals")
        .suggestion("Import from the package's public entry point"),
    ]
});

/// Import hygiene and index-file cycles for JavaScript-family and Python sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchitectureRules;

impl ArchitectureRules {
    /// Modules in the same directory that import the barrel re-exporting them.
    fn barrel_cycles(files: &[SourceFile]) -> Vec<RuleViolation> {
        let mut exported: HashMap<&str, HashSet<String>> = HashMap::new();
        for file in files.iter().filter(|f| is_index(f)) {
            let Ok(content) = file.content() else {
                continue;
            };
            let members = exported.entry(parent_dir(&file.path)).or_default();
            for caps in RE_EXPORT.captures_all(content) {
                if let Some(spec) = caps.get(1) {
                    members.insert(module_name(spec.as_str()).to_string());
                }
            }
        }
        if exported.is_empty() {
            return Vec::new();
        }

        let descriptor = &ARCHITECTURE_RULES[BARREL_CYCLE];
        let mut violations = Vec::new();
        for file in files {
            if is_index(file) || !SCRIPT_LANGUAGES.contains(&file.language) {
                continue;
            }
            let Some(members) = exported.get(parent_dir(&file.path)) else {
                continue;
            };
            if !members.contains(module_name(file.file_name())) {
                continue;
            }
            let Ok(content) = file.content() else {
                continue;
            };
            let lines = Lines::new(content, file.language);
            for (idx, raw) in lines.raw.iter().enumerate() {
                if lines.masked(idx).trim().is_empty() {
                    continue;
                }
                if let Some(m) = BARREL_IMPORT.find(raw) {
                    violations.push(descriptor.violation(
                        file,
                        idx + 1,
                        m.start() + 1,
                        format!(
                            "{} imports its own barrel, which re-exports it",
                            file.file_name()
                        ),
                        Some("Import sibling modules directly instead of through the index"),
                    ));
                }
            }
        }
        violations
    }
}

impl LexicalRuleSet for ArchitectureRules {
    fn id(&self) -> &'static str {
        "architecture"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Architecture
    }

    fn rules(&self) -> &'static [RuleDescriptor] {
        &ARCHITECTURE_RULES
    }

    fn check(&self, file: &SourceFile) -> Result<Vec<RuleViolation>> {
        let content = file.content()?;
        let lines = Lines::new(content, file.language);

        let mut violations = run_line_rules(&ARCHITECTURE_LINE_RULES, file, &lines);
        if is_index(file) {
            violations.extend(run_line_rules(std::slice::from_ref(&*SELF_IMPORT), file, &lines));
        }
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
        violations.extend(Self::barrel_cycles(files));
        Ok(violations)
    }
}

fn is_index(file: &SourceFile) -> bool {
    SCRIPT_LANGUAGES.contains(&file.language) && module_name(file.file_name()) == "index"
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// `./user.ts`, `./user` and `user.ts` all name the module `user`.
fn module_name(spec: &str) -> &str {
    let name = spec.strip_prefix("./").unwrap_or(spec);
    let name = name.strip_suffix("/index").unwrap_or(name);
    name.split('.').next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(found: &[RuleViolation]) -> Vec<&str> {
        found.iter().map(|v| v.rule_id.as_str()).collect()
    }

    #[test]
    fn index_importing_itself() {
        let file = SourceFile::new(
            "src/users/index.ts",
            Language::TypeScript,
            "export * from './service';\nimport { helper } from './index';\n",
        );
        let found = ArchitectureRules.check(&file).unwrap();
        assert_eq!(ids(&found), vec!["architecture/index-self-import"]);
        assert_eq!(found[0].location.start_line, 2);
        assert_eq!(found[0].severity, Severity::High);
    }

    #[test]
    fn banned_import_idioms() {
        let source = "import _ from 'lodash';\nimport debounce from 'lodash/debounce';\nconst fs = require('fs');\nimport { x } from '../../../../shared/x';\nimport { y } from '@acme/billing/src/internal';\n// import _ from 'lodash';\n";
        let found = ArchitectureRules
            .check(&SourceFile::new("src/app/main.ts", Language::TypeScript, source))
            .unwrap();
        assert_eq!(
            ids(&found),
            vec![
                "architecture/lodash-full-import",
                "architecture/require-in-typescript",
                "architecture/deep-relative-import",
                "architecture/cross-package-internals"
            ]
        );
    }

    #[test]
    fn require_is_fine_in_javascript() {
        let found = ArchitectureRules
            .check(&SourceFile::new("src/a.js", Language::JavaScript, "const fs = require('fs');\n"))
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn deep_python_relative_import() {
        let found = ArchitectureRules
            .check(&SourceFile::new("a/b/c/d/e/mod.py", Language::Python, "from .....core import x\n"))
            .unwrap();
        assert_eq!(ids(&found), vec!["architecture/deep-relative-import"]);
    }

    #[test]
    fn barrel_cycle_across_files() {
        let files = vec![
            SourceFile::new(
                "src/users/index.ts",
                Language::TypeScript,
                "export * from './service';\nexport { User } from './model';\n",
            ),
            SourceFile::new(
                "src/users/service.ts",
                Language::TypeScript,
                "import { User } from '.';\nexport const load = () => new User();\n",
            ),
            SourceFile::new("src/users/model.ts", Language::TypeScript, "export class User {}\n"),
            SourceFile::new(
                "src/users/helper.ts",
                Language::TypeScript,
                "import { User } from './index';\n",
            ),
        ];
        let found = ArchitectureRules.check_project(&files).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rule_id, "architecture/barrel-cycle");
        assert_eq!(found[0].file_path, "src/users/service.ts");
        assert_eq!(found[0].location.start_line, 1);
    }

    #[test]
    fn module_names() {
        assert_eq!(module_name("./user"), "user");
        assert_eq!(module_name("./user.ts"), "user");
        assert_eq!(module_name("./user/index"), "user");
        assert_eq!(module_name("index.tsx"), "index");
    }
}
